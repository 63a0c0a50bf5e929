//! Taxi Trips Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streaming table transforms and the pipeline stages built from them.
//!
//! # Overview
//!
//! - **Tables**: [`table::Table`], a lazy header + rows view with
//!   composable transforms, CSV sources and sinks
//! - **Field insertion**: [`fields::FieldInjector`]
//! - **Concatenation**: [`concat::Concatenator`]
//! - **Regions**: [`region::RegionIndex`] point-in-polygon lookups with a
//!   memoizing [`region::LookupCache`]
//! - **Statistics**: median/MAD outlier filtering in [`stats`]
//! - **Upserts**: [`sink::ChunkedUpsertSink`] over a [`sink::BackingStore`]
//! - **Pipeline**: declared [`schema::PipelineSchema`]s and the stages in
//!   [`pipeline`]
//!
//! # Example
//!
//! ```no_run
//! use taxitrips_engine::pipeline::{self, VendorInput};
//! use taxitrips_engine::schema::PipelineSchema;
//! use taxitrips_engine::table::TransformOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = PipelineSchema::builtin()?;
//! let inputs = [
//!     VendorInput::new("verifone", ["raw/verifone/*.csv"]),
//!     VendorInput::new("cmt", ["raw/cmt/*.csv"]),
//! ];
//! let table = pipeline::normalize(&schema, &inputs, &TransformOptions::default())?;
//! table.to_csv(std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

pub mod anonymize;
pub mod concat;
pub mod convert;
pub mod error;
pub mod fields;
pub mod pipeline;
pub mod region;
pub mod schema;
pub mod sink;
pub mod stats;
pub mod table;

pub use error::{PipelineError, Result, TableError};
pub use table::{Table, Value};
