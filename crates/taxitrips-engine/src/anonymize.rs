//! Surrogate identifiers for medallions and chauffeurs
//!
//! Each anonymized column has its own mapping table in the store: one row
//! per raw value with an integer id assigned on first sight. Ids are never
//! reused or reassigned, so a public extract stays joinable across runs.

use crate::error::{ConvertError, StoreError};
use crate::fields::FieldDefinition;
use crate::schema::AnonymizeSpec;
use crate::sink::{BackingStore, SurrogateKeyStore};
use crate::table::{Record, Table, TransformOptions, Value};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info};

/// Register every unseen raw value of each spec's column in `trips_table`.
///
/// Returns the number of new ids per mapping table, in spec order. All specs
/// are committed together.
pub fn update_anonymization<S>(
    store: &mut S,
    trips_table: &str,
    specs: &[AnonymizeSpec],
) -> Result<Vec<(String, usize)>, StoreError>
where
    S: SurrogateKeyStore + BackingStore + ?Sized,
{
    let mut added = Vec::with_capacity(specs.len());
    for spec in specs {
        store.ensure_mapping_table(&spec.ids_table, &spec.column)?;
        let n = store.register_unseen(trips_table, &spec.column, &spec.ids_table)?;
        added.push((spec.ids_table.clone(), n));
    }
    store.commit()?;
    info!(trips_table, tables = specs.len(), "Anonymization tables up to date");
    Ok(added)
}

/// Raw value → surrogate id lookups, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct Anonymizer {
    columns: Vec<(AnonymizeSpec, Rc<HashMap<String, i64>>)>,
}

impl Anonymizer {
    pub fn load<S>(store: &mut S, specs: &[AnonymizeSpec]) -> Result<Self, StoreError>
    where
        S: SurrogateKeyStore + ?Sized,
    {
        let mut columns = Vec::with_capacity(specs.len());
        for spec in specs {
            store.ensure_mapping_table(&spec.ids_table, &spec.column)?;
            let mapping = store.load_mapping(&spec.ids_table, &spec.column)?;
            debug!(field = %spec.field, entries = mapping.len(), "Loaded mapping");
            columns.push((spec.clone(), Rc::new(mapping)));
        }
        Ok(Self { columns })
    }

    pub fn from_mappings(columns: Vec<(AnonymizeSpec, HashMap<String, i64>)>) -> Self {
        Self {
            columns: columns.into_iter().map(|(s, m)| (s, Rc::new(m))).collect(),
        }
    }

    pub fn lookup(&self, field: &str, raw: &str) -> Option<i64> {
        self.columns
            .iter()
            .find(|(spec, _)| spec.field == field)
            .and_then(|(_, mapping)| mapping.get(raw).copied())
    }

    /// Append an `Anonymized <field>` column per spec.
    ///
    /// Missing raw values map to `Null`. A raw value with no id is a
    /// computation failure, handled by `options.policy`: `Null` and a count
    /// in `options.stats`, or a row-scoped error.
    pub fn apply(&self, table: &Table, options: TransformOptions) -> Table {
        let fields = self
            .columns
            .iter()
            .map(|(spec, mapping)| {
                let field = spec.field.clone();
                let mapping = Rc::clone(mapping);
                FieldDefinition::computed(spec.output_field(), move |record: &Record<'_>| {
                    let raw = record.field(&field)?;
                    if raw.is_missing() {
                        return Ok(Value::Null);
                    }
                    mapping
                        .get(raw.to_text().trim())
                        .map(|&id| Value::Int(id))
                        .ok_or_else(|| ConvertError::new(format!("no anonymized id for this {field}")))
                })
            })
            .collect();
        table.add_fields_with(fields, options)
    }
}
