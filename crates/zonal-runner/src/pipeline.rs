//! Resumable per-AOI pipeline:
//! raw retrieval -> aggregation -> normalization -> stats publication.
//!
//! Each stage is guarded by the stage cache. A cached stats table ends the
//! run immediately when it was computed with the same units, scale and bins,
//! and a cached raw table skips the remote engine. Nothing is published for a
//! stage that failed.

use crate::aoi::AoiId;
use crate::cache::{FsStageCache, Stage, StageCache};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::retry::RetryDriver;
use crate::status::{emit, StatusCallback, StatusLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::warn;
use zonal_core::{
    normalize, read_raw_table, AggregationReport, Aggregator, BinConfig, BinSequence, CanonicalTable,
    TableUnits, ZoneRegistry,
};
use zonal_metrics::{metric_defs, AoiLabels};
use zonal_remote::{StatsClient, StatsRequest};

type Result<T> = std::result::Result<T, PipelineError>;

/// Settings a stats table depends on, stored next to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsProvenance {
    pub units: TableUnits,
    pub scale_m: f64,
    pub bins: BinConfig,
}

impl StatsProvenance {
    pub fn of(config: &PipelineConfig) -> Self {
        Self {
            units: config.output.units,
            scale_m: config.scale_m,
            bins: config.bins,
        }
    }

    /// Whether a raw table fetched for `other` also serves `self`.
    ///
    /// The remote request depends on scale and bins; units only change
    /// post-processing.
    pub fn shares_raw(&self, other: &StatsProvenance) -> bool {
        self.scale_m == other.scale_m && self.bins == other.bins
    }
}

impl fmt::Display for StatsProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} m, bins [{}, {}) step {}",
            self.units.as_str(),
            self.scale_m,
            self.bins.min,
            self.bins.max,
            self.bins.step
        )
    }
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub aoi: AoiId,
    /// The published stats table, in the configured units.
    pub table: CanonicalTable,
    pub stats_path: PathBuf,
    /// The remote engine was not called.
    pub raw_from_cache: bool,
    /// The stats table was read back instead of recomputed.
    pub stats_from_cache: bool,
    /// Aggregation bookkeeping; `None` when the stats table was cached.
    pub report: Option<AggregationReport>,
    /// Remote attempts made during this run.
    pub attempts: u32,
}

/// Zonal canopy-cover pipeline over a filesystem stage cache.
pub struct Pipeline {
    config: PipelineConfig,
    cache: FsStageCache,
    client: Option<Box<dyn StatsClient>>,
    status: Option<StatusCallback>,
    registry: ZoneRegistry,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Pipeline without a remote client; only cached raw tables can be processed.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let cache = FsStageCache::new(config.output.results_dir.clone());
        Ok(Self {
            config,
            cache,
            client: None,
            status: None,
            registry: ZoneRegistry::default(),
        })
    }

    /// Pipeline with the remote client described by `config.remote`, if any.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let client = config.remote.as_ref().map(|remote| remote.build_client()).transpose()?;
        let mut pipeline = Self::new(config)?;
        pipeline.client = client;
        Ok(pipeline)
    }

    pub fn with_client(mut self, client: Box<dyn StatsClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_status(mut self, status: StatusCallback) -> Self {
        self.status = Some(status);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &FsStageCache {
        &self.cache
    }

    fn bins(&self) -> Result<BinSequence> {
        Ok(self.config.bins.sequence()?)
    }

    fn emit(&self, level: StatusLevel, text: impl Into<String>) {
        emit(self.status.as_ref(), level, text);
    }

    fn record_cache(&self, labels: &AoiLabels, metric: &zonal_metrics::Metric, stage: Stage) {
        let labels = labels.with(&[("stage", stage.as_str().to_string())]);
        metrics::counter!(metric.name, &labels[..]).increment(1);
    }

    /// Run every stage not already cached for `aoi`.
    pub fn run(&self, aoi: &str) -> Result<PipelineOutput> {
        let aoi = AoiId::new(aoi);
        let labels = AoiLabels::new(aoi.as_str());
        let bins = self.bins()?;
        let provenance = StatsProvenance::of(&self.config);
        let units = provenance.units;
        let stats_path = self.cache.artifact_path(&aoi, Stage::Stats);

        if self.cache.has(&aoi, Stage::Stats) {
            match self.cached_provenance(&aoi)? {
                Some(cached) if cached == provenance => {
                    self.record_cache(&labels, &metric_defs::CACHE_HITS, Stage::Stats);
                    let bytes = self.cache.read(&aoi, Stage::Stats)?;
                    let table = CanonicalTable::read_csv(bytes.as_slice(), bins, units, &self.registry)?;
                    self.emit(
                        StatusLevel::Success,
                        format!("Stats for {} already computed: {}", aoi, stats_path.display()),
                    );
                    return Ok(PipelineOutput {
                        aoi,
                        table,
                        stats_path,
                        raw_from_cache: true,
                        stats_from_cache: true,
                        report: None,
                        attempts: 0,
                    });
                }
                Some(cached) => {
                    self.emit(
                        StatusLevel::Warning,
                        format!(
                            "Cached stats for {} were computed as {}, recomputing as {}",
                            aoi, cached, provenance
                        ),
                    );
                    if !cached.shares_raw(&provenance) && self.cache.invalidate(&aoi, Stage::Raw)? {
                        self.emit(
                            StatusLevel::Info,
                            format!("Discarded raw table for {} fetched at other scale or bins", aoi),
                        );
                    }
                }
                None => self.emit(
                    StatusLevel::Warning,
                    format!("Cached stats for {} have no provenance, recomputing", aoi),
                ),
            }
        }

        let (raw, raw_from_cache, attempts) = if self.cache.has(&aoi, Stage::Raw) {
            self.record_cache(&labels, &metric_defs::CACHE_HITS, Stage::Raw);
            self.emit(StatusLevel::Info, format!("Using cached raw table for {}", aoi));
            (self.cache.read(&aoi, Stage::Raw)?, true, 0)
        } else {
            let (bytes, attempts) = self.compute_raw(&aoi)?;
            self.cache.write(&aoi, Stage::Raw, &bytes)?;
            self.record_cache(&labels, &metric_defs::CACHE_WRITES, Stage::Raw);
            (bytes, false, attempts)
        };

        self.emit(StatusLevel::Info, "Read and merge the raw table");
        let records = read_raw_table(raw.as_slice())?;
        let aggregator = Aggregator::new(bins, self.registry).with_policy(self.config.unknown_zones);
        let aggregation = match aggregator.aggregate(&records) {
            Ok(aggregation) => aggregation,
            Err(e) => {
                let err = PipelineError::for_aoi(e, aoi.reference());
                self.emit(StatusLevel::Error, err.to_string());
                return Err(err);
            }
        };

        let report = aggregation.report;
        self.record_report(&labels, &report, aggregation.table.columns().len());

        let table = match units {
            TableUnits::Pixels => aggregation.table,
            TableUnits::AreaKm2 => normalize(&aggregation.table, self.config.scale_m)?,
        };

        self.publish_stats(&aoi, &table, &provenance)?;
        self.record_cache(&labels, &metric_defs::CACHE_WRITES, Stage::Stats);
        self.emit(
            StatusLevel::Success,
            format!(
                "Stats for {} written to {} ({} zones, {})",
                aoi,
                stats_path.display(),
                table.columns().len(),
                units.as_str()
            ),
        );

        Ok(PipelineOutput {
            aoi,
            table,
            stats_path,
            raw_from_cache,
            stats_from_cache: false,
            report: Some(report),
            attempts,
        })
    }

    /// Run the retry driver and return the raw bytes and attempt count.
    fn compute_raw(&self, aoi: &AoiId) -> Result<(Vec<u8>, u32)> {
        let client = self.client.as_deref().ok_or_else(|| {
            PipelineError::Config(format!(
                "no remote engine configured and no cached raw table for {}",
                aoi
            ))
        })?;

        let request = StatsRequest::new(aoi.reference(), &self.config.dataset, &self.config.bins, self.config.scale_m);
        let scratch_dir = self.cache.scratch_dir(aoi);
        let scratch = scratch_dir.join(format!("{}_raw.csv", aoi));

        self.emit(StatusLevel::Info, "Compute the zonal analysis");
        let driver = RetryDriver::new(client, self.config.retry.policy()?).with_status(self.status.as_ref());
        let result = driver.compute_histogram(aoi, &request, &scratch);
        // Only succeeds when empty.
        let _ = fs::remove_dir(&scratch_dir);

        let artifact = result?;
        Ok((artifact.bytes, artifact.attempts))
    }

    /// Replace the stats table and its provenance.
    ///
    /// The provenance goes last so a table is never paired with a stale one.
    fn publish_stats(&self, aoi: &AoiId, table: &CanonicalTable, provenance: &StatsProvenance) -> Result<()> {
        self.cache.invalidate(aoi, Stage::StatsMeta)?;
        self.cache.write(aoi, Stage::Stats, &table.to_csv_bytes()?)?;
        let meta = serde_yaml::to_string(provenance)?;
        self.cache.write(aoi, Stage::StatsMeta, meta.as_bytes())?;
        Ok(())
    }

    /// Provenance of the cached stats table; `None` when absent or unreadable.
    fn cached_provenance(&self, aoi: &AoiId) -> Result<Option<StatsProvenance>> {
        if !self.cache.has(aoi, Stage::StatsMeta) {
            return Ok(None);
        }
        let bytes = self.cache.read(aoi, Stage::StatsMeta)?;
        match serde_yaml::from_slice(&bytes) {
            Ok(provenance) => Ok(Some(provenance)),
            Err(e) => {
                warn!("Ignoring unreadable stats provenance for {}: {}", aoi, e);
                Ok(None)
            }
        }
    }

    fn record_report(&self, labels: &AoiLabels, report: &AggregationReport, zones: usize) {
        if !report.malformed.is_empty() {
            let dropped = labels.with(&[("reason", "malformed".to_string())]);
            metrics::counter!(metric_defs::AGGREGATE_ROWS_DROPPED.name, &dropped[..])
                .increment(report.malformed.len() as u64);
        }
        if !report.unknown_zones.is_empty() {
            let dropped = labels.with(&[("reason", "unknown_zone".to_string())]);
            metrics::counter!(metric_defs::AGGREGATE_ROWS_DROPPED.name, &dropped[..])
                .increment(report.unknown_zones.len() as u64);
        }
        metrics::gauge!(metric_defs::AGGREGATE_ZONES_OBSERVED.name, &labels.to_labels()[..]).set(zones as f64);

        if report.rows_dropped() > 0 {
            self.emit(
                StatusLevel::Warning,
                format!(
                    "Dropped {} of {} raw rows ({} malformed, {} unknown zone)",
                    report.rows_dropped(),
                    report.rows_read,
                    report.malformed.len(),
                    report.unknown_zones.len()
                ),
            );
        }
    }

    /// Cached stats table for `aoi`, if one exists.
    ///
    /// Units and bins come from the table's provenance, falling back to the
    /// configuration when it has none.
    pub fn cached_table(&self, aoi: &str) -> Result<Option<CanonicalTable>> {
        let aoi = AoiId::new(aoi);
        if !self.cache.has(&aoi, Stage::Stats) {
            return Ok(None);
        }
        let provenance = self
            .cached_provenance(&aoi)?
            .unwrap_or_else(|| StatsProvenance::of(&self.config));
        let bytes = self.cache.read(&aoi, Stage::Stats)?;
        let table = CanonicalTable::read_csv(
            bytes.as_slice(),
            provenance.bins.sequence()?,
            provenance.units,
            &self.registry,
        )?;
        Ok(Some(table))
    }

    /// Remove every cached artifact of `aoi`. Returns whether anything existed.
    pub fn clean(&self, aoi: &str) -> Result<bool> {
        let aoi = AoiId::new(aoi);
        let removed = self.cache.clean(&aoi)?;
        if removed {
            self.emit(StatusLevel::Info, format!("Removed cached artifacts for {}", aoi));
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use zonal_core::{BinConfig, Ecozone};

    fn config(dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.bins = BinConfig { min: 0, max: 4, step: 1 };
        config.output.results_dir = dir.to_path_buf();
        config.retry.cooldown_secs = 0.0;
        config
    }

    #[test]
    fn test_cached_raw_without_client() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path())).unwrap();
        let aoi = AoiId::new("KEN");
        pipeline
            .cache()
            .write(&aoi, Stage::Raw, b"label,total,histogram\n41,8,\"[[0, 5], [1, 3]]\"\n")
            .unwrap();

        let output = pipeline.run("KEN").unwrap();
        assert!(output.raw_from_cache);
        assert!(!output.stats_from_cache);
        assert_eq!(output.attempts, 0);
        let boreal = output.table.column(Ecozone::BorealConiferousForest).unwrap();
        assert_relative_eq!(boreal[0], 0.05);
        assert_relative_eq!(boreal[1], 0.03);
        assert_eq!(boreal[3], 0.0);
        assert_eq!(output.stats_path, dir.path().join("KEN").join("KEN_stats.csv"));
    }

    #[test]
    fn test_no_client_and_no_cache() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path())).unwrap();
        assert!(matches!(pipeline.run("KEN"), Err(PipelineError::Config(_))));
        assert!(!pipeline.cache().has(&AoiId::new("KEN"), Stage::Stats));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = config(dir.path());
        bad.scale_m = -1.0;
        assert!(matches!(Pipeline::new(bad), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_clean_and_cached_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.output.units = TableUnits::Pixels;
        let pipeline = Pipeline::new(cfg).unwrap();
        pipeline
            .cache()
            .write(&AoiId::new("KEN"), Stage::Raw, b"label,histogram\n90,\"[[2, 4]]\"\n")
            .unwrap();

        assert!(pipeline.cached_table("KEN").unwrap().is_none());
        pipeline.run("KEN").unwrap();
        let table = pipeline.cached_table("KEN").unwrap().unwrap();
        assert_eq!(table.column(Ecozone::Water), Some(&[0.0, 0.0, 4.0, 0.0][..]));

        assert!(pipeline.clean("KEN").unwrap());
        assert!(!pipeline.clean("KEN").unwrap());
        assert!(pipeline.cached_table("KEN").unwrap().is_none());
    }

    #[test]
    fn test_stats_without_provenance_are_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path())).unwrap();
        let aoi = AoiId::new("KEN");
        pipeline
            .cache()
            .write(&aoi, Stage::Raw, b"label,histogram\n41,\"[[0, 500]]\"\n")
            .unwrap();
        // A pixel table left by a run that did not record provenance.
        pipeline
            .cache()
            .write(&aoi, Stage::Stats, b"treecover,Boreal coniferous forest\n0,500\n1,0\n2,0\n3,0\n")
            .unwrap();

        let output = pipeline.run("KEN").unwrap();
        assert!(!output.stats_from_cache);
        assert!(output.raw_from_cache);
        assert_relative_eq!(output.table.column(Ecozone::BorealConiferousForest).unwrap()[0], 5.0);

        let meta = pipeline.cache().read(&aoi, Stage::StatsMeta).unwrap();
        let provenance: StatsProvenance = serde_yaml::from_slice(&meta).unwrap();
        assert_eq!(provenance, StatsProvenance::of(pipeline.config()));
    }
}
