//! Reference data port: Trait for obtaining the slot and activity tables.
//!
//! The remote spreadsheet, a bundled file and the caching decorator all
//! sit behind this trait.

use std::sync::Arc;

use crate::domain::{LookupError, ReferenceTables};

/// Errors raised while obtaining reference data.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReferenceError {
    #[error("Reference data request failed: {0}")]
    Transport(String),

    #[error("Reference data request timed out")]
    Timeout,

    #[error("Not authorized to read reference data: {0}")]
    Unauthorized(String),

    #[error("Reference data service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected reference data response: {0}")]
    Decode(String),

    #[error("Failed to read reference data file {path}: {message}")]
    File { path: String, message: String },

    #[error(transparent)]
    Table(#[from] LookupError),
}

/// Trait for reference data sources.
pub trait ReferenceSource: Send + Sync {
    /// Fetch the current reference tables.
    ///
    /// # Errors
    /// Returns error if the source is unreachable, unauthorized or returns
    /// data that cannot be turned into tables.
    fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError>;

    /// Short name used in logs.
    fn describe(&self) -> String;
}

impl<T: ReferenceSource + ?Sized> ReferenceSource for Arc<T> {
    fn fetch(&self) -> Result<Arc<ReferenceTables>, ReferenceError> {
        (**self).fetch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
