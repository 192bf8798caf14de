//! Galton Core - Fundamental types
//!
//! This crate provides the core types used throughout Galton:
//! - `Value`: Runtime values (numbers, text, objects, errors)
//! - `GaltonError`: Structured errors, `Diagnostic`: non-fatal events
//! - `Sample` / `CleanSample`: univariate observations
//! - `Table`: named columns for grouped data

mod error;
mod sample;
mod table;
mod value;

pub use error::{codes, Diagnostic, ErrorContext, GaltonError, Severity};
pub use sample::{CleanSample, Sample};
pub use table::{Column, Table, TableError};
pub use value::Value;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::codes;
    pub use crate::{CleanSample, Diagnostic, GaltonError, Sample, Severity, Table, Value};
}
