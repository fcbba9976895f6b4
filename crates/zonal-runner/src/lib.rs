//! # zonal-runner
//!
//! Resumable pipeline that turns an AOI reference into a per-ecozone
//! tree-canopy-cover table:
//!
//! 1. **raw**: the [`RetryDriver`] asks the remote engine for per-patch
//!    histograms, escalating the resource multiplier when a job yields nothing
//! 2. **stats**: the raw table is aggregated, optionally converted to km²,
//!    and published
//!
//! Both stages are cached on disk under `<results_dir>/<aoi>/`
//! ([`FsStageCache`]), so a second run for the same AOI with the same units,
//! scale and bins reads the published table and makes no remote calls.
//!
//! ## Example
//!
//! ```no_run
//! use zonal_runner::{load_config, Pipeline};
//!
//! let config = load_config("zonal.yaml")?;
//! let pipeline = Pipeline::from_config(config)?
//!     .with_status(Box::new(|message| println!("{}", message)));
//! let output = pipeline.run("users/me/kenya")?;
//! println!("{} zones -> {}", output.table.columns().len(), output.stats_path.display());
//! # Ok::<(), zonal_runner::PipelineError>(())
//! ```

mod aoi;
mod cache;
mod config;
mod error;
mod pipeline;
mod retry;
mod status;

pub use aoi::AoiId;
pub use cache::{FsStageCache, Stage, StageCache, DEFAULT_STALE_TEMP_AGE};
pub use config::{
    load_config, parse_config, OutputConfig, PipelineConfig, RemoteConfig, RetryConfig, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_SCALE_M,
};
pub use error::{PipelineError, RetryError};
pub use pipeline::{Pipeline, PipelineOutput, StatsProvenance};
pub use retry::{AttemptPlan, BackoffPolicy, RawArtifact, RetryDriver, DEFAULT_COOLDOWN, MAX_ATTEMPTS};
pub use status::{emit, StatusCallback, StatusLevel, StatusMessage};
