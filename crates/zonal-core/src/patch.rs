//! Raw per-patch rows produced by the remote statistics engine.
//!
//! The raw artifact is a CSV table with one row per geometric patch. Each row
//! names the zone code of its patch (`label`), optionally a pixel `total`, and
//! a JSON-encoded fixed histogram of `[bin_value, count]` pairs. Several rows
//! may share a zone code. When the table has a `total` column, every row must
//! fill it.
//!
//! Parsing is split in two steps: [`read_raw_table`] decodes the CSV into
//! [`RawPatchRecord`]s without judging them, and [`PatchRow::parse`] turns one
//! record into a validated row or a [`MalformedPatchRow`].

use crate::bins::BinSequence;
use crate::error::ZonalError;
use crate::Result;
use serde::Deserialize;
use std::io::Read;
use thiserror::Error;

/// Column holding the zone code.
pub const LABEL_COLUMN: &str = "label";
/// Column holding the JSON histogram.
pub const HISTOGRAM_COLUMN: &str = "histogram";
/// Optional column holding the patch pixel total.
pub const TOTAL_COLUMN: &str = "total";

/// One undecoded row of the raw table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPatchRecord {
    /// Zero-based data row index (header excluded).
    pub row: usize,
    pub label: Option<String>,
    /// `Some("")` when the table has a `total` column but this cell is blank.
    pub total: Option<String>,
    pub histogram: Option<String>,
    /// Set when the CSV record itself could not be decoded.
    pub unreadable: Option<String>,
}

impl RawPatchRecord {
    /// Convenience constructor for a well-formed record.
    pub fn new(row: usize, label: impl Into<String>, histogram: impl Into<String>) -> Self {
        Self {
            row,
            label: Some(label.into()),
            histogram: Some(histogram.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    total: Option<String>,
    #[serde(default)]
    histogram: Option<String>,
}

/// Decode a raw per-patch CSV table.
///
/// The header must contain the `label` and `histogram` columns; anything else
/// is ignored. Records that fail to decode are kept (flagged `unreadable`) so
/// the aggregator can count them as dropped.
pub fn read_raw_table<R: Read>(reader: R) -> Result<Vec<RawPatchRecord>> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv.headers()?.clone();
    let has_total = headers.iter().any(|h| h == TOTAL_COLUMN);
    for required in [LABEL_COLUMN, HISTOGRAM_COLUMN] {
        if !headers.iter().any(|h| h == required) {
            return Err(ZonalError::InvalidTable(format!(
                "raw table has no '{}' column",
                required
            )));
        }
    }

    let mut records = Vec::new();
    for (row, result) in csv.deserialize::<CsvRow>().enumerate() {
        let record = match result {
            Ok(r) => RawPatchRecord {
                row,
                label: r.label.filter(|s| !s.is_empty()),
                total: if has_total { Some(r.total.unwrap_or_default()) } else { None },
                histogram: r.histogram.filter(|s| !s.is_empty()),
                unreadable: None,
            },
            Err(e) => RawPatchRecord {
                row,
                unreadable: Some(e.to_string()),
                ..RawPatchRecord::default()
            },
        };
        records.push(record);
    }
    Ok(records)
}

/// Why a raw row was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedReason {
    #[error("unreadable record: {0}")]
    Unreadable(String),
    #[error("missing label")]
    MissingLabel,
    #[error("missing histogram")]
    MissingHistogram,
    #[error("missing total")]
    MissingTotal,
    #[error("label '{0}' is not an integral zone code")]
    InvalidLabel(String),
    #[error("total '{0}' is not a number")]
    InvalidTotal(String),
    #[error("histogram is not a list of [bin, count] pairs: {0}")]
    InvalidHistogram(String),
    #[error("histogram contains a non-finite value")]
    NonFinite,
    #[error("histogram contains a negative count at bin {0}")]
    NegativeCount(f64),
    #[error("bin value {0} is not part of the bin sequence")]
    OffGridBin(f64),
}

/// A raw row that cannot be ingested.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed patch row {row}: {reason}")]
pub struct MalformedPatchRow {
    pub row: usize,
    pub reason: MalformedReason,
}

/// A validated patch histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRow {
    pub row: usize,
    /// Zone code as reported; may be outside the registry.
    pub code: i64,
    pub total: Option<f64>,
    /// `(bin_value, count)` pairs in reported order.
    pub histogram: Vec<(f64, f64)>,
}

impl PatchRow {
    /// Validate a raw record.
    pub fn parse(record: &RawPatchRecord) -> std::result::Result<Self, MalformedPatchRow> {
        let fail = |reason| MalformedPatchRow {
            row: record.row,
            reason,
        };

        if let Some(err) = &record.unreadable {
            return Err(fail(MalformedReason::Unreadable(err.clone())));
        }
        let label = record.label.as_deref().ok_or_else(|| fail(MalformedReason::MissingLabel))?;
        let histogram = record
            .histogram
            .as_deref()
            .ok_or_else(|| fail(MalformedReason::MissingHistogram))?;

        let code = parse_code(label).ok_or_else(|| fail(MalformedReason::InvalidLabel(label.to_string())))?;

        let total = match record.total.as_deref() {
            None => None,
            Some("") => return Err(fail(MalformedReason::MissingTotal)),
            Some(t) => match t.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                Ok(_) => return Err(fail(MalformedReason::NonFinite)),
                Err(_) => return Err(fail(MalformedReason::InvalidTotal(t.to_string()))),
            },
        };

        let pairs: Vec<(f64, f64)> = serde_json::from_str(histogram)
            .map_err(|e| fail(MalformedReason::InvalidHistogram(e.to_string())))?;
        for &(bin, count) in &pairs {
            if !bin.is_finite() || !count.is_finite() {
                return Err(fail(MalformedReason::NonFinite));
            }
            if count < 0.0 {
                return Err(fail(MalformedReason::NegativeCount(bin)));
            }
        }

        Ok(Self {
            row: record.row,
            code,
            total,
            histogram: pairs,
        })
    }

    /// Map every pair onto its slot in `bins`.
    ///
    /// Fails on the first bin value that is not a slot of the sequence; the
    /// row must then be dropped as a whole.
    pub fn slotted(&self, bins: &BinSequence) -> std::result::Result<Vec<(usize, f64)>, MalformedPatchRow> {
        self.histogram
            .iter()
            .map(|&(bin, count)| {
                bins.slot_of(bin).map(|slot| (slot, count)).ok_or(MalformedPatchRow {
                    row: self.row,
                    reason: MalformedReason::OffGridBin(bin),
                })
            })
            .collect()
    }
}

/// Parse a zone code rendered either as an integer or as an integral float.
fn parse_code(label: &str) -> Option<i64> {
    if let Ok(code) = label.parse::<i64>() {
        return Some(code);
    }
    let value = label.parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinConfig;

    #[test]
    fn test_parse_valid_row() {
        let rec = RawPatchRecord::new(0, "41", "[[0.0, 5], [1.0, 3]]");
        let row = PatchRow::parse(&rec).unwrap();
        assert_eq!(row.code, 41);
        assert_eq!(row.histogram, vec![(0.0, 5.0), (1.0, 3.0)]);
        assert_eq!(row.total, None);
    }

    #[test]
    fn test_float_label() {
        let rec = RawPatchRecord::new(3, "12.0", "[]");
        assert_eq!(PatchRow::parse(&rec).unwrap().code, 12);

        let rec = RawPatchRecord::new(3, "12.5", "[]");
        assert_eq!(
            PatchRow::parse(&rec).unwrap_err().reason,
            MalformedReason::InvalidLabel("12.5".into())
        );
    }

    #[test]
    fn test_missing_fields() {
        let rec = RawPatchRecord {
            row: 1,
            histogram: Some("[]".into()),
            ..Default::default()
        };
        assert_eq!(PatchRow::parse(&rec).unwrap_err().reason, MalformedReason::MissingLabel);

        let rec = RawPatchRecord {
            row: 1,
            label: Some("41".into()),
            ..Default::default()
        };
        assert_eq!(PatchRow::parse(&rec).unwrap_err().reason, MalformedReason::MissingHistogram);
    }

    #[test]
    fn test_bad_histogram_payloads() {
        for payload in ["not json", "[[0, NaN]]", "[[0, null]]", "{\"0\": 5}", "[[0]]"] {
            let rec = RawPatchRecord::new(0, "41", payload);
            let err = PatchRow::parse(&rec).unwrap_err();
            assert!(
                matches!(err.reason, MalformedReason::InvalidHistogram(_)),
                "payload {payload} gave {err}"
            );
        }

        let rec = RawPatchRecord::new(0, "41", "[[0, -2]]");
        assert_eq!(PatchRow::parse(&rec).unwrap_err().reason, MalformedReason::NegativeCount(0.0));
    }

    #[test]
    fn test_non_finite_total() {
        let mut rec = RawPatchRecord::new(0, "41", "[[0, 1]]");
        rec.total = Some("inf".into());
        assert_eq!(PatchRow::parse(&rec).unwrap_err().reason, MalformedReason::NonFinite);

        rec.total = Some("abc".into());
        assert!(matches!(
            PatchRow::parse(&rec).unwrap_err().reason,
            MalformedReason::InvalidTotal(_)
        ));

        rec.total = Some("17".into());
        assert_eq!(PatchRow::parse(&rec).unwrap().total, Some(17.0));
    }

    #[test]
    fn test_blank_total_cell_is_malformed() {
        let csv = "label,total,histogram\n41,3,\"[[0, 3]]\"\n41,,\"[[0, 100]]\"\n";
        let records = read_raw_table(csv.as_bytes()).unwrap();
        assert_eq!(PatchRow::parse(&records[0]).unwrap().total, Some(3.0));
        let err = PatchRow::parse(&records[1]).unwrap_err();
        assert_eq!(err.row, 1);
        assert_eq!(err.reason, MalformedReason::MissingTotal);
    }

    #[test]
    fn test_total_column_is_optional() {
        let csv = "label,histogram\n41,\"[[0, 3]]\"\n";
        let records = read_raw_table(csv.as_bytes()).unwrap();
        assert_eq!(records[0].total, None);
        assert_eq!(PatchRow::parse(&records[0]).unwrap().total, None);
    }

    #[test]
    fn test_slotted_rejects_off_grid() {
        let bins = BinConfig::with_step(2).sequence().unwrap();
        let row = PatchRow::parse(&RawPatchRecord::new(0, "41", "[[0, 1], [2, 4]]")).unwrap();
        assert_eq!(row.slotted(&bins).unwrap(), vec![(0, 1.0), (1, 4.0)]);

        let row = PatchRow::parse(&RawPatchRecord::new(0, "41", "[[0, 1], [3, 4]]")).unwrap();
        assert_eq!(row.slotted(&bins).unwrap_err().reason, MalformedReason::OffGridBin(3.0));
    }

    #[test]
    fn test_read_raw_table() {
        let csv = "system:index,label,total,histogram\n\
                   a,41,8,\"[[0.0, 5], [1.0, 3]]\"\n\
                   b,42,,\"[[1.0, 2]]\"\n\
                   c,,3,\"[[1.0, 3]]\"\n";
        let records = read_raw_table(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].label.as_deref(), Some("41"));
        assert_eq!(records[0].total.as_deref(), Some("8"));
        assert_eq!(records[1].total.as_deref(), Some(""));
        assert_eq!(records[2].label, None);
        assert_eq!(records[2].row, 2);
    }

    #[test]
    fn test_read_raw_table_requires_columns() {
        let csv = "label,count\n41,5\n";
        assert!(matches!(
            read_raw_table(csv.as_bytes()),
            Err(ZonalError::InvalidTable(_))
        ));
    }
}
