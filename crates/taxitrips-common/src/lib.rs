//! Taxi Trips Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Error and logging plumbing shared by the taxitrips workspace members.
//!
//! - **Error Handling**: [`TaxiError`] and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]

pub mod error;
pub mod logging;

pub use error::{Result, TaxiError};
