//! # zonal-remote
//!
//! Boundary to the remote raster statistics engine that turns a continuous
//! raster and a zone layer into per-patch fixed histograms.
//!
//! The engine itself is external. This crate describes a job
//! ([`StatsRequest`]), defines the [`StatsClient`] trait the retry driver calls,
//! and ships two implementations:
//!
//! - [`HttpStatsClient`] - posts the job to an HTTP service and stores the CSV body
//! - [`CommandStatsClient`] - runs an external program with templated arguments
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use zonal_core::BinConfig;
//! use zonal_remote::{DatasetRef, HttpStatsClient, StatsClient, StatsRequest};
//!
//! let client = HttpStatsClient::new("https://stats.example.org/api")?;
//! let request = StatsRequest::new("users/me/kenya", &DatasetRef::default(), &BinConfig::default(), 100.0)
//!     .with_multiplier(2);
//! client.request(&request, Path::new("results/kenya/.scratch/raw.csv"))?;
//! # Ok::<(), zonal_remote::RemoteError>(())
//! ```

mod command;
mod error;
mod http;
mod request;

pub use command::CommandStatsClient;
pub use error::RemoteError;
pub use http::{HttpStatsClient, RequestStats, DEFAULT_TIMEOUT};
pub use request::{
    DatasetRef, JobOutput, Reducer, StatsClient, StatsRequest, DEFAULT_PROJECTION, DEFAULT_RASTER,
    DEFAULT_ZONES,
};

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;
