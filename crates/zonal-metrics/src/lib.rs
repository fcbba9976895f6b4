//! Metrics for the zonal canopy pipeline.
//!
//! Every metric the pipeline records is declared here as a [`Metric`]
//! constant so names are never typed twice. The `metrics` crate is
//! re-exported; without an installed recorder all recording is a no-op.
//!
//! # Example
//!
//! ```rust
//! use zonal_metrics::{metric_defs, AoiLabels};
//!
//! let labels = AoiLabels::new("Kenya");
//! metrics::counter!(metric_defs::REMOTE_ATTEMPTS.name, &labels.to_labels()[..]).increment(1);
//! ```
//!
//! Custom metrics use the same const builder:
//!
//! ```rust
//! use zonal_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const EXPORTS: Metric = Metric::counter("zonal.export.files")
//!     .with_description("Files exported")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["aoi"]);
//!
//! assert_eq!(EXPORTS.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, e.g. `zonal.remote.attempts`.
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys this metric is recorded with.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => describe_histogram!(self.name, unit, self.description),
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// All pipeline metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label key carrying the sanitized AOI identifier.
    pub const AOI_LABEL: &str = "aoi";

    /// Labels on every AOI-scoped metric.
    pub const AOI_LABELS: &[&str] = &[AOI_LABEL];

    // ------------------------------------------------------------------
    // Remote statistics
    // ------------------------------------------------------------------

    /// Remote job submissions, labelled by resource multiplier.
    pub const REMOTE_ATTEMPTS: Metric = Metric::counter("zonal.remote.attempts")
        .with_description("Remote zonal histogram job submissions")
        .with_unit(Unit::Count)
        .with_labels(&["aoi", "multiplier"]);

    /// Attempts that produced no artifact and were retried at a larger multiplier.
    pub const REMOTE_ESCALATIONS: Metric = Metric::counter("zonal.remote.escalations")
        .with_description("Attempts escalated to a larger resource multiplier")
        .with_unit(Unit::Count)
        .with_labels(AOI_LABELS);

    pub const REMOTE_AREA_TOO_LARGE: Metric = Metric::counter("zonal.remote.area_too_large")
        .with_description("AOIs abandoned after exhausting all attempts")
        .with_unit(Unit::Count)
        .with_labels(AOI_LABELS);

    pub const REMOTE_ATTEMPT_DURATION: Metric = Metric::histogram("zonal.remote.attempt_duration_ms")
        .with_description("Wall-clock time of one remote attempt")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["aoi", "multiplier"]);

    // ------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------

    /// Raw rows dropped as malformed or for an unknown zone.
    pub const AGGREGATE_ROWS_DROPPED: Metric = Metric::counter("zonal.aggregate.rows_dropped")
        .with_description("Raw patch rows excluded from aggregation")
        .with_unit(Unit::Count)
        .with_labels(&["aoi", "reason"]);

    pub const AGGREGATE_ZONES_OBSERVED: Metric = Metric::gauge("zonal.aggregate.zones_observed")
        .with_description("Ecozones present in the aggregated table")
        .with_unit(Unit::Count)
        .with_labels(AOI_LABELS);

    // ------------------------------------------------------------------
    // Stage cache
    // ------------------------------------------------------------------

    pub const CACHE_HITS: Metric = Metric::counter("zonal.cache.hits")
        .with_description("Pipeline stages served from the stage cache")
        .with_unit(Unit::Count)
        .with_labels(&["aoi", "stage"]);

    pub const CACHE_WRITES: Metric = Metric::counter("zonal.cache.writes")
        .with_description("Artifacts published to the stage cache")
        .with_unit(Unit::Count)
        .with_labels(&["aoi", "stage"]);

    pub const ALL: &[&Metric] = &[
        &REMOTE_ATTEMPTS,
        &REMOTE_ESCALATIONS,
        &REMOTE_AREA_TOO_LARGE,
        &REMOTE_ATTEMPT_DURATION,
        &AGGREGATE_ROWS_DROPPED,
        &AGGREGATE_ZONES_OBSERVED,
        &CACHE_HITS,
        &CACHE_WRITES,
    ];
}

/// Labels identifying the AOI a metric belongs to.
///
/// ```rust
/// use zonal_metrics::AoiLabels;
///
/// let labels = AoiLabels::new("Kenya");
/// let with_stage = labels.with(&[("stage", "raw".to_string())]);
/// assert_eq!(with_stage.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AoiLabels {
    /// Sanitized AOI identifier.
    pub aoi: String,
}

impl AoiLabels {
    pub fn new(aoi: impl Into<String>) -> Self {
        Self { aoi: aoi.into() }
    }

    /// Labels in the `metrics` crate format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![(metric_defs::AOI_LABEL, self.aoi.clone())]
    }

    /// Labels plus extra key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describe every pipeline metric. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
