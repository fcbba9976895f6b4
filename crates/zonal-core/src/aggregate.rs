//! Merge per-patch histograms into the canonical zone × bin table.
//!
//! Order of operations:
//! 1. drop every row that fails to parse, has non-finite values, or reports a
//!    bin outside the sequence (the whole row goes, nothing is partially
//!    ingested);
//! 2. resolve each remaining row's zone code against the registry;
//! 3. start every observed zone from an all-zero vector over the full bin
//!    sequence, so a right-truncated histogram only contributes zeros to the
//!    bins it omits;
//! 4. add every `(bin, count)` pair into its slot. Rows sharing a zone and
//!    overlapping bins are summed, never overwritten.

use crate::bins::BinSequence;
use crate::error::ZonalError;
use crate::patch::{MalformedPatchRow, PatchRow, RawPatchRecord};
use crate::table::{CanonicalTable, TableUnits, ZoneColumn};
use crate::zone::{Ecozone, ZoneRegistry, ZONE_COUNT};
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do with a row whose zone code is not in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownZonePolicy {
    /// Abort aggregation with [`ZonalError::UnknownZoneCode`].
    #[default]
    Fail,
    /// Drop the row with a warning.
    Drop,
}

/// Bookkeeping for one aggregation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationReport {
    /// Rows in the raw table.
    pub rows_read: usize,
    /// Rows that contributed to the table.
    pub rows_used: usize,
    /// Rows dropped as malformed.
    pub malformed: Vec<MalformedPatchRow>,
    /// `(row, code)` of rows dropped for an unknown zone code.
    pub unknown_zones: Vec<(usize, i64)>,
}

impl AggregationReport {
    pub fn rows_dropped(&self) -> usize {
        self.malformed.len() + self.unknown_zones.len()
    }
}

/// Result of [`Aggregator::aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub table: CanonicalTable,
    pub report: AggregationReport,
}

/// Histogram aggregator for one run's bin sequence.
#[derive(Debug, Clone)]
pub struct Aggregator {
    bins: BinSequence,
    registry: ZoneRegistry,
    policy: UnknownZonePolicy,
}

impl Aggregator {
    pub fn new(bins: BinSequence, registry: ZoneRegistry) -> Self {
        Self {
            bins,
            registry,
            policy: UnknownZonePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UnknownZonePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn bins(&self) -> &BinSequence {
        &self.bins
    }

    /// Aggregate raw records into a pixel-count table.
    pub fn aggregate(&self, records: &[RawPatchRecord]) -> Result<Aggregation> {
        let mut report = AggregationReport {
            rows_read: records.len(),
            ..AggregationReport::default()
        };

        // Step 1: validate every row before anything is summed.
        let mut valid: Vec<(PatchRow, Vec<(usize, f64)>)> = Vec::with_capacity(records.len());
        for record in records {
            match PatchRow::parse(record).and_then(|row| row.slotted(&self.bins).map(|s| (row, s))) {
                Ok(entry) => valid.push(entry),
                Err(malformed) => {
                    warn!("Dropping {}", malformed);
                    report.malformed.push(malformed);
                }
            }
        }

        // Steps 2-4: partition by zone into zero-initialized vectors.
        let mut sums: [Option<Vec<f64>>; ZONE_COUNT] = std::array::from_fn(|_| None);
        for (row, slots) in &valid {
            let Some(info) = self.registry.by_code(row.code) else {
                match self.policy {
                    UnknownZonePolicy::Fail => {
                        return Err(ZonalError::UnknownZoneCode {
                            code: row.code,
                            row: row.row,
                        });
                    }
                    UnknownZonePolicy::Drop => {
                        warn!("Dropping raw row {}: unknown zone code {}", row.row, row.code);
                        report.unknown_zones.push((row.row, row.code));
                        continue;
                    }
                }
            };

            let column = sums[info.zone.index()].get_or_insert_with(|| vec![0.0; self.bins.len()]);
            for &(slot, count) in slots {
                column[slot] += count;
            }
            report.rows_used += 1;
        }

        let columns: Vec<ZoneColumn> = sums
            .into_iter()
            .enumerate()
            .filter_map(|(i, values)| {
                values.map(|values| ZoneColumn {
                    zone: Ecozone::ALL[i],
                    values,
                })
            })
            .collect();

        debug!(
            "Aggregated {} of {} rows into {} zones",
            report.rows_used,
            report.rows_read,
            columns.len()
        );

        let table = CanonicalTable::from_columns(self.bins, TableUnits::Pixels, columns)?;
        Ok(Aggregation { table, report })
    }
}

/// Aggregate with the default (fail-fast) unknown-zone policy.
pub fn aggregate(records: &[RawPatchRecord], bins: BinSequence, registry: ZoneRegistry) -> Result<Aggregation> {
    Aggregator::new(bins, registry).aggregate(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinConfig;
    use crate::patch::MalformedReason;

    fn bins(max: u32) -> BinSequence {
        BinConfig { min: 0, max, step: 1 }.sequence().unwrap()
    }

    #[test]
    fn test_two_patches_same_zone() {
        let records = vec![
            RawPatchRecord::new(0, "41", "[[0, 5], [1, 3]]"),
            RawPatchRecord::new(1, "41", "[[1, 2], [2, 7]]"),
        ];
        let agg = aggregate(&records, bins(3), ZoneRegistry::default()).unwrap();
        assert_eq!(agg.table.zones(), vec![Ecozone::BorealConiferousForest]);
        assert_eq!(agg.table.column(Ecozone::BorealConiferousForest).unwrap(), &[5.0, 5.0, 7.0]);
        assert_eq!(agg.report.rows_used, 2);
        assert_eq!(agg.report.rows_dropped(), 0);
    }

    #[test]
    fn test_truncated_histogram_is_zero_padded() {
        let records = vec![RawPatchRecord::new(0, "12", "[[0, 4]]")];
        let agg = aggregate(&records, bins(5), ZoneRegistry::default()).unwrap();
        assert_eq!(
            agg.table.column(Ecozone::TropicalMoistForest).unwrap(),
            &[4.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_unobserved_zones_absent() {
        let records = vec![RawPatchRecord::new(0, "90", "[[1, 1]]")];
        let agg = aggregate(&records, bins(3), ZoneRegistry::default()).unwrap();
        assert_eq!(agg.table.columns().len(), 1);
        assert!(agg.table.column(Ecozone::Polar).is_none());
    }

    #[test]
    fn test_malformed_row_dropped_entirely() {
        let records = vec![
            RawPatchRecord::new(0, "41", "[[0, 5]]"),
            RawPatchRecord::new(1, "41", "[[0, 100], [1, NaN]]"),
            RawPatchRecord::new(2, "41", "[[0, 1], [7, 1]]"),
        ];
        let agg = aggregate(&records, bins(3), ZoneRegistry::default()).unwrap();
        assert_eq!(agg.table.column(Ecozone::BorealConiferousForest).unwrap(), &[5.0, 0.0, 0.0]);
        assert_eq!(agg.report.malformed.len(), 2);
        assert_eq!(agg.report.malformed[1].reason, MalformedReason::OffGridBin(7.0));
    }

    #[test]
    fn test_unknown_zone_fails_by_default() {
        let records = vec![
            RawPatchRecord::new(0, "41", "[[0, 5]]"),
            RawPatchRecord::new(1, "77", "[[0, 5]]"),
        ];
        let err = aggregate(&records, bins(3), ZoneRegistry::default()).unwrap_err();
        assert!(matches!(err, ZonalError::UnknownZoneCode { code: 77, row: 1 }));
    }

    #[test]
    fn test_unknown_zone_drop_policy() {
        let records = vec![
            RawPatchRecord::new(0, "41", "[[0, 5]]"),
            RawPatchRecord::new(1, "77", "[[0, 5]]"),
        ];
        let agg = Aggregator::new(bins(3), ZoneRegistry::default())
            .with_policy(UnknownZonePolicy::Drop)
            .aggregate(&records)
            .unwrap();
        assert_eq!(agg.report.unknown_zones, vec![(1, 77)]);
        assert_eq!(agg.table.zones(), vec![Ecozone::BorealConiferousForest]);
    }

    #[test]
    fn test_empty_input() {
        let agg = aggregate(&[], bins(3), ZoneRegistry::default()).unwrap();
        assert!(agg.table.is_empty());
        assert_eq!(agg.report, AggregationReport::default());
    }
}
