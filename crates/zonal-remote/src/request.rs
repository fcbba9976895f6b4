//! Zonal histogram job description and the client trait.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zonal_core::BinConfig;

/// Default continuous raster: GFCC tree canopy cover, 2010 collection.
pub const DEFAULT_RASTER: &str = "NASA/MEASURES/GFCC/TC/v3";

/// Default zone raster: Global Ecological Zones 2010.
pub const DEFAULT_ZONES: &str = "users/bornToBeAlive/gez_2010_wgs84";

/// Default equal-area projection (World Mollweide).
pub const DEFAULT_PROJECTION: &str = "ESRI:54009";

/// Reducer applied per zone polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reducer {
    /// Fixed-width histogram over `[bin_min, bin_max)`.
    #[default]
    FixedHistogram,
}

/// Identity of the input datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetRef {
    /// Continuous raster asset.
    pub raster: String,
    /// Zone raster or vector asset.
    pub zones: String,
    /// Projection the statistics are computed in.
    pub projection: String,
}

impl Default for DatasetRef {
    fn default() -> Self {
        Self {
            raster: DEFAULT_RASTER.to_string(),
            zones: DEFAULT_ZONES.to_string(),
            projection: DEFAULT_PROJECTION.to_string(),
        }
    }
}

/// One zonal histogram job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRequest {
    /// AOI asset or feature collection reference.
    pub aoi: String,
    pub raster: String,
    pub zones: String,
    pub reducer: Reducer,
    pub bin_min: u32,
    pub bin_max: u32,
    pub bin_step: u32,
    /// Number of bins, `(bin_max - bin_min) / bin_step`.
    pub hist_steps: usize,
    /// Ground resolution in meters.
    pub scale: f64,
    pub projection: String,
    /// Tiling multiplier (`tile_scale`); larger values split the job into
    /// smaller pieces at the cost of throughput.
    pub resource_multiplier: u32,
}

impl StatsRequest {
    /// Build a request at resource multiplier 1.
    pub fn new(aoi: impl Into<String>, dataset: &DatasetRef, bins: &BinConfig, scale: f64) -> Self {
        Self {
            aoi: aoi.into(),
            raster: dataset.raster.clone(),
            zones: dataset.zones.clone(),
            reducer: Reducer::FixedHistogram,
            bin_min: bins.min,
            bin_max: bins.max,
            bin_step: bins.step,
            hist_steps: bins.bin_count(),
            scale,
            projection: dataset.projection.clone(),
            resource_multiplier: 1,
        }
    }

    /// Same job at another resource multiplier.
    pub fn with_multiplier(&self, multiplier: u32) -> Self {
        Self {
            resource_multiplier: multiplier,
            ..self.clone()
        }
    }
}

/// What a client reports back from one job submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    /// Console or service messages produced by the job, for the status channel.
    pub messages: Vec<String>,
}

/// A remote zonal statistics engine.
///
/// `request` submits one job and, when the engine finishes, leaves the raw
/// per-patch CSV at `output`. Large jobs can fail without reporting an error,
/// so callers decide success by checking for the file, not by the return
/// value. Implementations must tolerate repeated calls with growing
/// `resource_multiplier`.
pub trait StatsClient {
    fn request(&self, request: &StatsRequest, output: &Path) -> Result<JobOutput>;
}

impl<T: StatsClient + ?Sized> StatsClient for &T {
    fn request(&self, request: &StatsRequest, output: &Path) -> Result<JobOutput> {
        (**self).request(request, output)
    }
}

impl<T: StatsClient + ?Sized> StatsClient for Box<T> {
    fn request(&self, request: &StatsRequest, output: &Path) -> Result<JobOutput> {
        (**self).request(request, output)
    }
}
