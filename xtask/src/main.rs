//! Build automation tasks for taxitrips
//!
//! - Generating the CLI reference from the clap definitions
//! - Exporting the built-in pipeline schema as an editable starting point

use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use taxitrips_engine::schema::PipelineSchema;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for taxitrips", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },

    /// Write the built-in pipeline schema to a TOML file
    ExportSchema {
        /// Destination file
        #[arg(short, long, default_value = "docs/schema.toml")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
        Command::ExportSchema { output } => export_schema(&output)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<taxitrips_cli::Cli>();

    let content = format!(
        r#"# taxitrips CLI Reference

This documentation is auto-generated from the CLI source code. Last updated: {}.

## Overview

`taxitrips` turns monthly vendor exports of taxi trip records into a clean,
merged trips table and an anonymized, location-generalized public extract.

## Quick Start

```bash
# Merge this month's vendor exports
taxitrips normalize --verifone raw/verifone/*.csv --cmt raw/cmt/*.csv -o normalized.csv

# Load them into the trips table
taxitrips upload normalized.csv

# Give new medallions and chauffeurs their anonymized ids
taxitrips update-anon

# Build the public extract
taxitrips generalize normalized.csv --regions regions.geojson -o generalized.csv
taxitrips anonymize generalized.csv -o public.csv
taxitrips upload public.csv --columns public --table public_trips

# Check that vendors report comparable trip lengths
taxitrips validate normalized.csv
```

## Commands

{}

## Environment Variables

- `TAXITRIPS_DATABASE` - SQLite database path (default: `taxitrips.db`)
- `TAXITRIPS_SCHEMA` - Pipeline schema TOML (default: built-in)
- `TAXITRIPS_CHUNK_SIZE` - Rows merged per transaction (default: `100000`)
- `TAXITRIPS_TRIPS_TABLE` - Raw trips table (default: `taxi_trips`)
- `TAXITRIPS_FAIL_FAST` - Stop at the first conversion failure
- `TAXITRIPS_REGIONS` - Region map for `generalize`
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - Logging

Variables may also be set in a `.env` file in the working directory.

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());
    Ok(())
}

fn export_schema(output: &PathBuf) -> anyhow::Result<()> {
    let schema = PipelineSchema::builtin().context("built-in schema is invalid")?;
    let text = toml::to_string_pretty(&schema).context("failed to serialize schema")?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, text).with_context(|| format!("failed to write {}", output.display()))?;

    println!("Wrote schema '{}' to {}", schema.name, output.display());
    Ok(())
}
