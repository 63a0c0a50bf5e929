//! Declared pipeline schemas
//!
//! Column lists, vendor quirks, date formats and anonymization targets are
//! configuration, not code. A schema is a TOML document; the Philadelphia
//! layout ships embedded in the crate and is what [`PipelineSchema::builtin`]
//! returns.

use crate::error::SchemaError;
use crate::region::MAX_PRECISION;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const BUILTIN_SCHEMA: &str = include_str!("../schemas/philadelphia.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSchema {
    pub name: String,
    pub vendors: Vec<VendorLayout>,
    pub normalize: NormalizeSettings,
    pub generalize: GeneralizeSettings,
    pub upload: UploadSettings,
    #[serde(default)]
    pub anonymize: Vec<AnonymizeSpec>,
    pub validate: ValidateSettings,
}

/// How one vendor's raw export is read and cleaned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorLayout {
    pub name: String,
    /// Value written to the data-source field for this vendor's rows
    pub data_source: String,
    /// Logical header for this vendor's files
    #[serde(default)]
    pub fieldnames: Option<Vec<String>>,
    /// Files carry no header row, so `fieldnames` is pushed rather than
    /// replacing the first record
    #[serde(default)]
    pub headerless: bool,
    #[serde(default)]
    pub normalize_payment_type: bool,
    #[serde(default)]
    pub datetime_fields: Vec<String>,
    /// Keep only this many leading characters of each datetime field
    #[serde(default)]
    pub datetime_truncate: Option<usize>,
    /// Reformat datetime fields from this `strftime` pattern
    #[serde(default)]
    pub datetime_input_format: Option<String>,
}

/// Derived time columns for one datetime field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentFields {
    /// Column name prefix, e.g. `Pickup` gives `Pickup Year`
    pub prefix: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationField {
    pub name: String,
    pub index: usize,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeSettings {
    pub data_source_field: String,
    pub payment_type_field: String,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub money: Vec<String>,
    /// Pattern of datetime fields after vendor cleaning
    pub datetime_format: String,
    #[serde(default)]
    pub moments: Vec<MomentFields>,
    pub duration: Option<DurationField>,
}

/// Coordinate columns generalized to a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFields {
    pub prefix: String,
    pub latitude: String,
    pub longitude: String,
    /// Free-text location the zip code is pulled from
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralizeSettings {
    pub zip_pattern: String,
    pub id_property: String,
    pub precision: u32,
    pub version_field: String,
    pub points: Vec<PointFields>,
}

/// CSV columns, their database names, and the identity subset (database names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSet {
    pub csv: Vec<String>,
    pub db: Vec<String>,
    pub identity: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSettings {
    pub raw: ColumnSet,
    pub public: ColumnSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnSetKind {
    Raw,
    Public,
}

/// One anonymized column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizeSpec {
    /// CSV field holding the raw value; output is `Anonymized <field>`
    pub field: String,
    /// Database column of the trips table holding the raw value
    pub column: String,
    pub ids_table: String,
}

impl AnonymizeSpec {
    pub fn output_field(&self) -> String {
        format!("Anonymized {}", self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateSettings {
    pub trip_length_field: String,
    pub data_source_field: String,
    pub scale: f64,
}

impl PipelineSchema {
    /// The embedded Philadelphia schema
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_toml_str(BUILTIN_SCHEMA)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, SchemaError> {
        let schema: Self = toml::from_str(s)?;
        schema.check()?;
        Ok(schema)
    }

    pub fn vendor(&self, name: &str) -> Option<&VendorLayout> {
        self.vendors.iter().find(|v| v.name == name)
    }

    pub fn column_set(&self, kind: ColumnSetKind) -> &ColumnSet {
        match kind {
            ColumnSetKind::Raw => &self.upload.raw,
            ColumnSetKind::Public => &self.upload.public,
        }
    }

    /// Structural checks that TOML typing cannot express.
    pub fn check(&self) -> Result<(), SchemaError> {
        if self.vendors.is_empty() {
            return Err(SchemaError::invalid("at least one vendor is required"));
        }
        let mut names = HashSet::new();
        for vendor in &self.vendors {
            if !names.insert(vendor.name.as_str()) {
                return Err(SchemaError::invalid(format!("vendor {} declared twice", vendor.name)));
            }
            if vendor.headerless && vendor.fieldnames.is_none() {
                return Err(SchemaError::invalid(format!(
                    "vendor {}: headerless files need fieldnames",
                    vendor.name
                )));
            }
            if vendor.datetime_truncate.is_some() && vendor.datetime_input_format.is_some() {
                return Err(SchemaError::invalid(format!(
                    "vendor {}: datetime_truncate and datetime_input_format are exclusive",
                    vendor.name
                )));
            }
        }

        for (label, set) in [("raw", &self.upload.raw), ("public", &self.upload.public)] {
            if set.csv.len() != set.db.len() {
                return Err(SchemaError::invalid(format!(
                    "{label} columns: {} CSV names but {} database names",
                    set.csv.len(),
                    set.db.len()
                )));
            }
            if let Some(id) = set.identity.iter().find(|id| !set.db.contains(id)) {
                return Err(SchemaError::invalid(format!(
                    "{label} identity column {id} is not a database column"
                )));
            }
        }

        if self.generalize.precision > MAX_PRECISION {
            return Err(SchemaError::invalid(format!(
                "generalize.precision must be at most {MAX_PRECISION}, got {}",
                self.generalize.precision
            )));
        }
        Regex::new(&self.generalize.zip_pattern)
            .map_err(|e| SchemaError::invalid(format!("zip_pattern: {e}")))?;

        if !(self.validate.scale.is_finite() && self.validate.scale > 0.0) {
            return Err(SchemaError::invalid("validate.scale must be positive"));
        }
        Ok(())
    }
}
