//! Taxi Trips CLI Library
//!
//! Command-line interface for the taxi trip data pipeline.
//!
//! # Overview
//!
//! - **Normalization**: merge raw vendor exports into one clean CSV (`taxitrips normalize`)
//! - **Generalization**: replace coordinates with map regions (`taxitrips generalize`)
//! - **Upload**: upsert a CSV into the trips database (`taxitrips upload`)
//! - **Anonymization**: maintain surrogate ids and apply them (`taxitrips update-anon`, `taxitrips anonymize`)
//! - **Validation**: compare trip lengths across vendors (`taxitrips validate`)

pub mod commands;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::{CliError, Result};

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use taxitrips_engine::schema::ColumnSetKind;

/// Taxi Trips - clean, anonymize and publish taxi trip records
#[derive(Parser, Debug)]
#[command(name = "taxitrips")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// SQLite database path
    #[arg(long, env = "TAXITRIPS_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Pipeline schema (TOML); defaults to the built-in Philadelphia schema
    #[arg(long, env = "TAXITRIPS_SCHEMA", global = true)]
    pub schema: Option<PathBuf>,

    /// Stop at the first value that fails to convert instead of writing null
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Print the CLI reference as Markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge and clean raw vendor exports
    Normalize {
        /// Verifone files (glob patterns)
        #[arg(long, num_args = 1..)]
        verifone: Vec<String>,

        /// CMT files (glob patterns)
        #[arg(long, num_args = 1..)]
        cmt: Vec<String>,

        /// Files for any vendor declared in the schema, as VENDOR=GLOB
        #[arg(long = "input", value_name = "VENDOR=GLOB")]
        inputs: Vec<String>,

        /// Output CSV (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace pickup/dropoff coordinates with map regions
    Generalize {
        /// Normalized trips CSV
        input: PathBuf,

        /// Region map (GeoJSON FeatureCollection with a version tag)
        #[arg(long, env = "TAXITRIPS_REGIONS")]
        regions: PathBuf,

        /// Output CSV (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Insert or update trips in the database
    Upload {
        /// Trips CSV
        input: PathBuf,

        /// Rows merged per transaction
        #[arg(long, env = "TAXITRIPS_CHUNK_SIZE")]
        chunk_size: Option<usize>,

        /// Destination table
        #[arg(long, env = "TAXITRIPS_TRIPS_TABLE")]
        table: Option<String>,

        /// Column set to upload
        #[arg(long, value_enum, default_value_t = ColumnSet::Raw)]
        columns: ColumnSet,
    },

    /// Register unseen medallions and chauffeurs in the anonymization tables
    UpdateAnon {
        /// Table of uploaded raw trips
        #[arg(long, env = "TAXITRIPS_TRIPS_TABLE")]
        table: Option<String>,
    },

    /// Add anonymized medallion and chauffeur columns
    Anonymize {
        /// Trips CSV
        input: PathBuf,

        /// Output CSV (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare trip length distributions across vendors
    Validate {
        /// Trips CSV
        input: PathBuf,

        /// Outlier cutoff in median absolute deviations
        #[arg(long)]
        scale: Option<f64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Column sets declared by the pipeline schema
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSet {
    /// Full-precision trips
    Raw,
    /// Generalized, anonymized trips
    Public,
}

impl From<ColumnSet> for ColumnSetKind {
    fn from(set: ColumnSet) -> Self {
        match set {
            ColumnSet::Raw => ColumnSetKind::Raw,
            ColumnSet::Public => ColumnSetKind::Public,
        }
    }
}

impl Cli {
    /// Environment configuration with this invocation's flags applied.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_env()?;
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(schema) = &self.schema {
            config.schema = Some(schema.clone());
        }
        if self.fail_fast {
            config.fail_fast = true;
        }
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_normalize() {
        let cli = Cli::try_parse_from([
            "taxitrips",
            "normalize",
            "--verifone",
            "a/*.csv",
            "b/*.csv",
            "--cmt",
            "c/*.csv",
            "-o",
            "out.csv",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Normalize {
                verifone, cmt, output, ..
            }) => {
                assert_eq!(verifone, ["a/*.csv", "b/*.csv"]);
                assert_eq!(cmt, ["c/*.csv"]);
                assert_eq!(output, Some(PathBuf::from("out.csv")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_upload_columns() {
        let cli = Cli::try_parse_from(["taxitrips", "upload", "trips.csv", "--columns", "public", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Upload { columns, .. }) => {
                assert_eq!(ColumnSetKind::from(columns), ColumnSetKind::Public)
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
