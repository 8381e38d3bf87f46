//! Error types for geoband.

use geoband_types::{BoundsError, PeriodError, PolygonKeyError};
use thiserror::Error;

/// Errors surfaced by the store, configuration and run entry points.
///
/// Failures inside a traversal (service errors, depth exhaustion, a single
/// area failing to persist) are not errors at this level: they are recorded
/// in the error log and the run continues.
#[derive(Debug, Error)]
pub enum GeobandError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid log format at line {line}: {reason}")]
    InvalidFormat { line: usize, reason: String },

    #[error("Store is closed")]
    StoreClosed,

    #[error("Unknown area id: {0}")]
    UnknownArea(u64),

    #[error("Invalid land geometry: {0}")]
    InvalidGeometry(String),

    #[cfg(feature = "http")]
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl From<BoundsError> for GeobandError {
    fn from(e: BoundsError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<PeriodError> for GeobandError {
    fn from(e: PeriodError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<PolygonKeyError> for GeobandError {
    fn from(e: PolygonKeyError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeobandError>;
