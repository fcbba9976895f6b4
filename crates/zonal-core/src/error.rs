//! Error types for the zonal-core crate.

use thiserror::Error;

/// Errors raised while building, converting or decoding zonal tables.
#[derive(Debug, Error)]
pub enum ZonalError {
    /// Bin configuration does not describe a usable partition of the domain.
    #[error("Invalid bin configuration: {0}")]
    InvalidBins(String),

    /// A patch references a zone code outside the registry.
    #[error("Unknown zone code {code} in raw row {row}")]
    UnknownZoneCode {
        /// The offending code.
        code: i64,
        /// Zero-based data row index in the raw table.
        row: usize,
    },

    /// Pixel scale must be a positive, finite length in meters.
    #[error("Invalid pixel scale {0} (must be positive and finite)")]
    InvalidScale(f64),

    /// The table is already in the requested units.
    #[error("Table is already expressed in {0}")]
    AlreadyNormalized(&'static str),

    /// Table columns disagree with the bin sequence length.
    #[error("Column '{zone}' has {actual} cells, expected {expected}")]
    DimensionMismatch {
        zone: String,
        expected: usize,
        actual: usize,
    },

    /// Stats artifact could not be decoded.
    #[error("Invalid stats table: {0}")]
    InvalidTable(String),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
