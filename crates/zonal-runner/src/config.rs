//! YAML pipeline configuration.
//!
//! ```yaml
//! dataset:
//!   raster: NASA/MEASURES/GFCC/TC/v3
//!   zones: users/bornToBeAlive/gez_2010_wgs84
//!   projection: "ESRI:54009"
//! bins: { min: 0, max: 100, step: 2 }
//! scale_m: 100
//! output:
//!   units: area_km2        # or pixels
//!   results_dir: results
//! retry:
//!   cooldown_secs: 4
//! unknown_zones: fail      # or drop
//! remote:
//!   kind: command
//!   program: python3
//!   args: [zonal_export.py, "--out={output}", "--tile-scale={tile_scale}"]
//! ```
//!
//! Every section is optional and falls back to its default.

use crate::error::PipelineError;
use crate::retry::{BackoffPolicy, DEFAULT_COOLDOWN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zonal_core::{pixel_area_km2, BinConfig, TableUnits, UnknownZonePolicy};
use zonal_remote::{CommandStatsClient, DatasetRef, HttpStatsClient, StatsClient};

/// Ground resolution the statistics are computed at, in meters.
pub const DEFAULT_SCALE_M: f64 = 100.0;

/// Default per-request timeout for the HTTP client.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600;

type Result<T> = std::result::Result<T, PipelineError>;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub dataset: DatasetRef,
    pub bins: BinConfig,
    /// Ground resolution in meters.
    pub scale_m: f64,
    pub output: OutputConfig,
    pub retry: RetryConfig,
    /// Remote engine. Required by `run` unless the AOI is already cached.
    pub remote: Option<RemoteConfig>,
    pub unknown_zones: UnknownZonePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetRef::default(),
            bins: BinConfig::default(),
            scale_m: DEFAULT_SCALE_M,
            output: OutputConfig::default(),
            retry: RetryConfig::default(),
            remote: None,
            unknown_zones: UnknownZonePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Units of the stats table.
    pub units: TableUnits,
    /// Root of the per-AOI result directories.
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            units: TableUnits::default(),
            results_dir: PathBuf::from("results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Pause between a failed attempt and the next, in seconds.
    pub cooldown_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN.as_secs_f64(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<BackoffPolicy> {
        let cooldown = Duration::try_from_secs_f64(self.cooldown_secs).map_err(|_| {
            PipelineError::Config(format!(
                "retry.cooldown_secs must be a non-negative number, got {}",
                self.cooldown_secs
            ))
        })?;
        Ok(BackoffPolicy::new(cooldown))
    }
}

/// Remote statistics engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteConfig {
    /// HTTP statistics service.
    Http {
        endpoint: String,
        #[serde(default = "default_http_timeout")]
        timeout_secs: u64,
    },
    /// External program; `args` may contain placeholders such as `{output}`.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl RemoteConfig {
    pub fn build_client(&self) -> Result<Box<dyn StatsClient>> {
        match self {
            RemoteConfig::Http { endpoint, timeout_secs } => Ok(Box::new(HttpStatsClient::with_timeout(
                endpoint.as_str(),
                Duration::from_secs(*timeout_secs),
            )?)),
            RemoteConfig::Command { program, args } => {
                Ok(Box::new(CommandStatsClient::new(program.as_str()).args(args.iter().cloned())))
            }
        }
    }
}

impl PipelineConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.bins.validate()?;
        pixel_area_km2(self.scale_m)?;
        self.retry.policy()?;
        if let Some(RemoteConfig::Command { program, .. }) = &self.remote {
            if program.trim().is_empty() {
                return Err(PipelineError::Config("remote.program must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Parse and validate a configuration document.
pub fn parse_config(yaml: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let text = fs::read_to_string(path)?;
    parse_config(&text)
}
