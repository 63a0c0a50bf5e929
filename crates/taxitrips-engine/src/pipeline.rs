//! Pipeline stages composed from the table engine
//!
//! Every stage except [`upload`], [`update_anonymization`] and
//! [`validate_trip_lengths`] returns a lazy [`Table`]; nothing is read until
//! the caller writes or uploads the result.

use crate::anonymize::Anonymizer;
use crate::concat::ConcatMode;
use crate::convert::{as_iso_datetime, as_money, normalize_payment_type, parse_datetime, rematch, truncate_chars};
use crate::error::{PipelineError, SchemaError, StoreError};
use crate::fields::FieldDefinition;
use crate::region::Resolver;
use crate::schema::{
    AnonymizeSpec, ColumnSet, DurationField, GeneralizeSettings, MomentFields, NormalizeSettings, PipelineSchema,
    ValidateSettings, VendorLayout,
};
use crate::sink::{BackingStore, ChunkedUpsertSink, SurrogateKeyStore, UpsertSummary, UpsertTarget};
use crate::stats::{self, ValidationReport};
use crate::table::{CsvOptions, HeaderMode, Record, Table, TransformOptions, Value};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

pub use crate::anonymize::update_anonymization;

/// Rows between progress log lines
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Input files for one vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorInput {
    pub vendor: String,
    /// Glob patterns, expanded in order
    pub patterns: Vec<String>,
}

impl VendorInput {
    pub fn new<I, S>(vendor: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vendor: vendor.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Read every vendor's files, clean them, merge them and derive the time
/// fields. Vendors with no patterns are left out.
#[instrument(skip_all, fields(schema = %schema.name, vendors = inputs.len()))]
pub fn normalize(
    schema: &PipelineSchema,
    inputs: &[VendorInput],
    options: &TransformOptions,
) -> Result<Table, PipelineError> {
    let mut tables = Vec::new();
    for input in inputs.iter().filter(|i| !i.patterns.is_empty()) {
        let layout = schema
            .vendor(&input.vendor)
            .ok_or_else(|| SchemaError::invalid(format!("unknown vendor {}", input.vendor)))?;
        let raw = read_vendor(layout, &input.patterns, options)?;
        tables.push(clean_vendor(&raw, layout, &schema.normalize, options));
    }
    if tables.is_empty() {
        return Err(SchemaError::invalid("no vendor input files given").into());
    }

    let merged = Table::concat(align(tables)?, ConcatMode::Strict);
    let merged_names = merged.fieldnames()?;
    let settings = &schema.normalize;

    let mut table = merged.cutout(settings.drop.iter().filter(|f| merged_names.contains(f)).cloned());
    for field in &settings.money {
        table = table.convert_with(field.as_str(), as_money, options.clone());
    }
    info!("Normalization chain built");
    Ok(derive_times(&table, settings, options))
}

/// Open one vendor's files with its header handling.
pub fn read_vendor(
    layout: &VendorLayout,
    patterns: &[String],
    options: &TransformOptions,
) -> Result<Table, PipelineError> {
    let header = match (&layout.fieldnames, layout.headerless) {
        (Some(names), true) => HeaderMode::Push(names.clone()),
        (Some(names), false) => HeaderMode::Replace(names.clone()),
        (None, _) => HeaderMode::FromFile,
    };
    let csv = CsvOptions::new().header(header).stats(options.stats.clone());
    debug!(vendor = %layout.name, ?patterns, "Reading vendor files");
    Ok(Table::from_csvs(patterns, csv)?)
}

/// Vendor-specific cleaning: data-source tag, payment types, datetimes.
pub fn clean_vendor(
    table: &Table,
    layout: &VendorLayout,
    settings: &NormalizeSettings,
    options: &TransformOptions,
) -> Table {
    let mut table = table.add_field(FieldDefinition::fixed(
        settings.data_source_field.as_str(),
        layout.data_source.as_str(),
    ));
    if layout.normalize_payment_type {
        table = table.convert_with(
            settings.payment_type_field.as_str(),
            normalize_payment_type,
            options.clone(),
        );
    }
    for field in &layout.datetime_fields {
        if let Some(n) = layout.datetime_truncate {
            table = table.convert_with(field.as_str(), truncate_chars(n), options.clone());
        } else if let Some(format) = &layout.datetime_input_format {
            table = table.convert_with(field.as_str(), as_iso_datetime(format), options.clone());
        }
    }
    table
}

/// Give every table the union of all headers (first-seen order), filling
/// fields a table lacks with `Null`.
pub fn align(tables: Vec<Table>) -> Result<Vec<Table>, PipelineError> {
    let mut headers = Vec::with_capacity(tables.len());
    let mut union: Vec<String> = Vec::new();
    for table in &tables {
        let names = table.fieldnames()?;
        for name in &names {
            if !union.contains(name) {
                union.push(name.clone());
            }
        }
        headers.push(names);
    }

    Ok(tables
        .into_iter()
        .zip(headers)
        .map(|(table, names)| {
            if names == union {
                return table;
            }
            let missing: Vec<FieldDefinition> = union
                .iter()
                .filter(|f| !names.contains(f))
                .map(|f| FieldDefinition::fixed(f.as_str(), Value::Null))
                .collect();
            debug!(missing = missing.len(), "Aligning table to merged header");
            table.add_fields(missing).cut(union.iter().cloned())
        })
        .collect())
}

/// Add the pickup/dropoff time breakdowns and the trip duration.
pub fn derive_times(table: &Table, settings: &NormalizeSettings, options: &TransformOptions) -> Table {
    let mut fields = Vec::new();
    let mut temporaries = Vec::new();
    for moment in &settings.moments {
        let temp = format!("_{}_dt", moment.prefix.to_lowercase());
        fields.extend(moment_fields(moment, &temp, &settings.datetime_format));
        temporaries.push(temp);
    }
    if let Some(duration) = &settings.duration {
        fields.push(duration_field(duration, &settings.datetime_format));
    }
    if fields.is_empty() {
        return table.clone();
    }
    table
        .add_fields_with(fields, options.clone())
        .cutout(temporaries)
}

fn moment_fields(moment: &MomentFields, temp: &str, pattern: &str) -> Vec<FieldDefinition> {
    let prefix = moment.prefix.as_str();
    vec![
        FieldDefinition::computed(temp, parse_datetime(&moment.source, pattern)),
        time_part(prefix, temp, "Year", |dt| Value::Int(dt.year().into())),
        time_part(prefix, temp, "Month", |dt| Value::Int(dt.month().into())),
        time_part(prefix, temp, "Day", |dt| Value::Int(dt.day().into())),
        time_part(prefix, temp, "Hour", |dt| Value::Int(dt.hour().into())),
        time_part(prefix, temp, "DOW", |dt| {
            Value::Int(dt.weekday().num_days_from_sunday().into())
        }),
        time_part(prefix, temp, "Day of Week", |dt| Value::from(dt.format("%A").to_string())),
        time_part(prefix, temp, "General Time", |dt| {
            dt.date().and_hms_opt(dt.hour(), 0, 0).into()
        }),
    ]
}

fn time_part(prefix: &str, temp: &str, suffix: &str, part: fn(NaiveDateTime) -> Value) -> FieldDefinition {
    let temp = temp.to_string();
    FieldDefinition::computed(format!("{prefix} {suffix}"), move |record: &Record<'_>| {
        Ok(record.field(&temp)?.as_datetime().map(part).unwrap_or_default())
    })
}

fn duration_field(duration: &DurationField, pattern: &str) -> FieldDefinition {
    let start = parse_datetime(&duration.start, pattern);
    let end = parse_datetime(&duration.end, pattern);
    FieldDefinition::computed(duration.name.as_str(), move |record: &Record<'_>| {
        match (start(record)?.as_datetime(), end(record)?.as_datetime()) {
            (Some(start), Some(end)) => Ok(Value::Int((end - start).num_seconds() / 60)),
            _ => Ok(Value::Null),
        }
    })
    .at(duration.index)
}

/// Replace precise coordinates with the containing region's zip code,
/// centroid and ID, tagged with the region map version.
#[instrument(skip_all, fields(version = %resolver.index().version()))]
pub fn generalize(
    table: &Table,
    resolver: &Resolver,
    settings: &GeneralizeSettings,
    options: &TransformOptions,
) -> Result<Table, PipelineError> {
    let mut fields = Vec::new();
    let mut dropped = Vec::new();

    for point in &settings.points {
        let temp = format!("_{}_region", point.prefix.to_lowercase());
        let resolver = resolver.clone();
        let (lat, lng) = (point.latitude.clone(), point.longitude.clone());
        fields.push(FieldDefinition::computed(temp.as_str(), move |record: &Record<'_>| {
            match (record.field(&lat)?.as_f64(), record.field(&lng)?.as_f64()) {
                (Some(lat), Some(lng)) => Ok(resolver.resolve(lat, lng).into()),
                _ => Ok(Value::Null),
            }
        }));
        dropped.push(temp);
    }

    for (point, temp) in settings.points.iter().zip(&dropped) {
        let prefix = &point.prefix;
        let zip = rematch(&settings.zip_pattern, &point.location, 1)
            .map_err(|e| SchemaError::invalid(format!("zip_pattern: {e}")))?;
        fields.push(FieldDefinition::computed(format!("{prefix} Zip Code"), zip));
        fields.push(region_part(prefix, temp, "Region Centroid Latitude", |r| {
            Value::Float(r.centroid.lat)
        }));
        fields.push(region_part(prefix, temp, "Region Centroid Longitude", |r| {
            Value::Float(r.centroid.lng)
        }));
        fields.push(region_part(prefix, temp, "Region ID", |r| Value::Int(r.id)));
    }
    fields.push(FieldDefinition::fixed(
        settings.version_field.as_str(),
        resolver.index().version(),
    ));

    for point in &settings.points {
        dropped.push(point.latitude.clone());
        dropped.push(point.longitude.clone());
    }
    Ok(table.add_fields_with(fields, options.clone()).cutout(dropped))
}

fn region_part(
    prefix: &str,
    temp: &str,
    suffix: &str,
    part: fn(&crate::region::Region) -> Value,
) -> FieldDefinition {
    let temp = temp.to_string();
    FieldDefinition::computed(format!("{prefix} {suffix}"), move |record: &Record<'_>| {
        Ok(record
            .field(&temp)?
            .as_region()
            .map(|r| part(r))
            .unwrap_or_default())
    })
}

/// Upsert target for `columns` in `trips_table`
pub fn upload_target(trips_table: &str, columns: &ColumnSet) -> Result<UpsertTarget, StoreError> {
    UpsertTarget::new(trips_table, columns.db.iter().cloned(), columns.identity.iter().cloned())
}

/// Cut `table` to the CSV columns, rename them to their database names and
/// merge the rows into `trips_table`.
#[instrument(skip_all, fields(table = trips_table, chunk_size = sink.chunk_size()))]
pub fn upload<S>(
    table: &Table,
    store: &mut S,
    trips_table: &str,
    columns: &ColumnSet,
    sink: &ChunkedUpsertSink,
) -> Result<UpsertSummary, StoreError>
where
    S: BackingStore + ?Sized,
{
    let target = upload_target(trips_table, columns)?;
    let renamed = table
        .cut(columns.csv.iter().cloned())
        .set_header(columns.db.iter().cloned())
        .progress("upload", PROGRESS_INTERVAL);
    sink.run(&renamed, &target, store)
}

/// Append `Anonymized <field>` columns using the store's current mappings.
#[instrument(skip_all, fields(columns = specs.len()))]
pub fn anonymize<S>(
    table: &Table,
    store: &mut S,
    specs: &[AnonymizeSpec],
    options: &TransformOptions,
) -> Result<Table, StoreError>
where
    S: SurrogateKeyStore + ?Sized,
{
    let anonymizer = Anonymizer::load(store, specs)?;
    Ok(anonymizer.apply(table, options.clone()))
}

/// Compare trip-length distributions across data sources.
///
/// Lengths that do not parse as finite numbers are skipped and counted in
/// the report.
#[instrument(skip_all, fields(scale = settings.scale))]
pub fn validate_trip_lengths(table: &Table, settings: &ValidateSettings) -> Result<ValidationReport, PipelineError> {
    let stream = table
        .cut([settings.trip_length_field.as_str(), settings.data_source_field.as_str()])
        .open()?;

    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut skipped = 0;
    for row in stream {
        let row = row?;
        let length = row.first().and_then(Value::as_f64).filter(|v| v.is_finite());
        match (length, row.get(1)) {
            (Some(length), Some(source)) => groups.entry(source.to_text()).or_default().push(length),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "Skipped trip lengths that did not parse");
    }

    let mut report = stats::validate(&groups, settings.scale);
    report.skipped = skipped;
    info!(
        groups = report.stats.len(),
        violations = report.violations.len(),
        "Trip length validation complete"
    );
    Ok(report)
}
