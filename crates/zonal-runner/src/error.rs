//! Error types for the zonal-runner crate.

use thiserror::Error;
use zonal_core::ZonalError;
use zonal_remote::RemoteError;

/// Failure of the retry driver. Transient remote failures never appear here.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every resource multiplier was tried and none produced a result.
    #[error("AOI '{aoi}' is too large: no result after {attempts} attempts")]
    AreaTooLarge { aoi: String, attempts: u32 },

    /// Scratch file handling failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort the pipeline for one AOI.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("AOI '{aoi}' is too large: no result after {attempts} attempts")]
    AreaTooLarge { aoi: String, attempts: u32 },

    /// A raw row references a zone outside the registry.
    #[error("AOI '{aoi}': unknown zone code {code} in raw row {row}")]
    UnknownZoneCode { aoi: String, code: i64, row: usize },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Zonal(ZonalError),

    #[error("Remote client error: {0}")]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RetryError> for PipelineError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::AreaTooLarge { aoi, attempts } => PipelineError::AreaTooLarge { aoi, attempts },
            RetryError::Io(e) => PipelineError::Io(e),
        }
    }
}

impl From<ZonalError> for PipelineError {
    fn from(err: ZonalError) -> Self {
        match err {
            ZonalError::InvalidBins(msg) => PipelineError::Config(msg),
            ZonalError::InvalidScale(scale) => {
                PipelineError::Config(format!("scale_m must be positive and finite, got {}", scale))
            }
            other => PipelineError::Zonal(other),
        }
    }
}

impl PipelineError {
    /// Attach the AOI to an aggregation failure.
    pub(crate) fn for_aoi(err: ZonalError, aoi: &str) -> Self {
        match err {
            ZonalError::UnknownZoneCode { code, row } => PipelineError::UnknownZoneCode {
                aoi: aoi.to_string(),
                code,
                row,
            },
            other => other.into(),
        }
    }
}
