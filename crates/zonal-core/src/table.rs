//! The canonical bins × zones table and its CSV form.
//!
//! Rows follow the run's bin sequence; columns are the zones actually observed
//! in the raw data, in registry order. Zones that never appeared are absent,
//! not zero-filled.

use crate::bins::BinSequence;
use crate::error::ZonalError;
use crate::zone::{Ecozone, ZoneRegistry};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Header of the bin column in the stats CSV.
pub const BIN_COLUMN: &str = "treecover";

/// What the table cells measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableUnits {
    /// Raw pixel counts at the statistics scale.
    Pixels,
    /// Square kilometres.
    #[default]
    AreaKm2,
}

impl TableUnits {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableUnits::Pixels => "pixels",
            TableUnits::AreaKm2 => "km²",
        }
    }
}

/// One zone's values, indexed by bin slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneColumn {
    pub zone: Ecozone,
    pub values: Vec<f64>,
}

/// Dense bins × zones table.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    bins: BinSequence,
    units: TableUnits,
    columns: Vec<ZoneColumn>,
}

impl CanonicalTable {
    /// Assemble a table, checking dimensions and putting columns in registry order.
    pub fn from_columns(bins: BinSequence, units: TableUnits, mut columns: Vec<ZoneColumn>) -> Result<Self> {
        for column in &columns {
            if column.values.len() != bins.len() {
                return Err(ZonalError::DimensionMismatch {
                    zone: column.zone.name().to_string(),
                    expected: bins.len(),
                    actual: column.values.len(),
                });
            }
        }
        columns.sort_by_key(|c| c.zone.index());
        if columns.windows(2).any(|w| w[0].zone == w[1].zone) {
            return Err(ZonalError::InvalidTable("duplicate zone column".into()));
        }
        Ok(Self { bins, units, columns })
    }

    pub fn bins(&self) -> &BinSequence {
        &self.bins
    }

    pub fn units(&self) -> TableUnits {
        self.units
    }

    pub fn columns(&self) -> &[ZoneColumn] {
        &self.columns
    }

    /// Zones present in the table, in column order.
    pub fn zones(&self) -> Vec<Ecozone> {
        self.columns.iter().map(|c| c.zone).collect()
    }

    pub fn column(&self, zone: Ecozone) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.zone == zone)
            .map(|c| c.values.as_slice())
    }

    /// Sum of a zone's column.
    pub fn zone_total(&self, zone: Ecozone) -> Option<f64> {
        self.column(zone).map(|v| v.iter().sum())
    }

    /// Sum over every cell.
    pub fn grand_total(&self) -> f64 {
        self.columns.iter().flat_map(|c| c.values.iter()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Apply `f` to every cell, producing a table in `units`.
    pub fn map_cells(&self, units: TableUnits, f: impl Fn(f64) -> f64) -> Self {
        Self {
            bins: self.bins,
            units,
            columns: self
                .columns
                .iter()
                .map(|c| ZoneColumn {
                    zone: c.zone,
                    values: c.values.iter().map(|&v| f(v)).collect(),
                })
                .collect(),
        }
    }

    /// Write the stats CSV: one row per bin, one column per zone name.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(BIN_COLUMN.to_string());
        header.extend(self.columns.iter().map(|c| c.zone.name().to_string()));
        csv.write_record(&header)?;

        for slot in 0..self.bins.len() {
            let mut record = Vec::with_capacity(header.len());
            record.push(self.bins.value(slot).to_string());
            record.extend(self.columns.iter().map(|c| c.values[slot].to_string()));
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Encode as stats CSV bytes.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    /// Decode a stats CSV written by [`CanonicalTable::write_csv`].
    ///
    /// The bin column must match `bins` exactly; column names are resolved
    /// through `registry`.
    pub fn read_csv<R: Read>(
        reader: R,
        bins: BinSequence,
        units: TableUnits,
        registry: &ZoneRegistry,
    ) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();

        let mut fields = headers.iter();
        if fields.next() != Some(BIN_COLUMN) {
            return Err(ZonalError::InvalidTable(format!(
                "first column must be '{}'",
                BIN_COLUMN
            )));
        }
        let mut columns = Vec::new();
        for name in fields {
            let info = registry
                .by_name(name)
                .ok_or_else(|| ZonalError::InvalidTable(format!("unknown zone column '{}'", name)))?;
            columns.push(ZoneColumn {
                zone: info.zone,
                values: Vec::with_capacity(bins.len()),
            });
        }

        let mut slot = 0;
        for record in csv.records() {
            let record = record?;
            if slot >= bins.len() {
                return Err(ZonalError::InvalidTable(format!(
                    "more than {} bin rows",
                    bins.len()
                )));
            }
            let bin = record.get(0).and_then(|b| b.parse::<u32>().ok());
            if bin != Some(bins.value(slot)) {
                return Err(ZonalError::InvalidTable(format!(
                    "row {} has bin {:?}, expected {} (was the table built with another bin step?)",
                    slot,
                    record.get(0),
                    bins.value(slot)
                )));
            }
            for (i, column) in columns.iter_mut().enumerate() {
                let cell = record.get(i + 1).unwrap_or("");
                let value = cell
                    .parse::<f64>()
                    .map_err(|_| ZonalError::InvalidTable(format!("bad cell '{}' at row {}", cell, slot)))?;
                column.values.push(value);
            }
            slot += 1;
        }
        if slot != bins.len() {
            return Err(ZonalError::InvalidTable(format!(
                "expected {} bin rows, found {}",
                bins.len(),
                slot
            )));
        }

        Self::from_columns(bins, units, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinConfig;

    fn small_bins() -> BinSequence {
        BinConfig { min: 0, max: 3, step: 1 }.sequence().unwrap()
    }

    #[test]
    fn test_columns_sorted_by_registry() {
        let table = CanonicalTable::from_columns(
            small_bins(),
            TableUnits::Pixels,
            vec![
                ZoneColumn { zone: Ecozone::Water, values: vec![1.0, 0.0, 0.0] },
                ZoneColumn { zone: Ecozone::BorealConiferousForest, values: vec![5.0, 5.0, 7.0] },
            ],
        )
        .unwrap();
        assert_eq!(table.zones(), vec![Ecozone::BorealConiferousForest, Ecozone::Water]);
        assert_eq!(table.zone_total(Ecozone::BorealConiferousForest), Some(17.0));
        assert_eq!(table.column(Ecozone::Polar), None);
        assert_eq!(table.grand_total(), 18.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = CanonicalTable::from_columns(
            small_bins(),
            TableUnits::Pixels,
            vec![ZoneColumn { zone: Ecozone::Polar, values: vec![1.0] }],
        )
        .unwrap_err();
        assert!(matches!(err, ZonalError::DimensionMismatch { expected: 3, actual: 1, .. }));
    }

    #[test]
    fn test_csv_layout() {
        let table = CanonicalTable::from_columns(
            small_bins(),
            TableUnits::Pixels,
            vec![ZoneColumn { zone: Ecozone::BorealConiferousForest, values: vec![5.0, 5.5, 7.0] }],
        )
        .unwrap();
        let text = String::from_utf8(table.to_csv_bytes().unwrap()).unwrap();
        assert_eq!(text, "treecover,Boreal coniferous forest\n0,5\n1,5.5\n2,7\n");
    }

    #[test]
    fn test_csv_read_back() {
        let registry = ZoneRegistry::default();
        let table = CanonicalTable::from_columns(
            small_bins(),
            TableUnits::AreaKm2,
            vec![
                ZoneColumn { zone: Ecozone::TropicalRainforest, values: vec![0.01, 0.0, 0.3] },
                ZoneColumn { zone: Ecozone::Polar, values: vec![1.0, 2.0, 3.0] },
            ],
        )
        .unwrap();
        let bytes = table.to_csv_bytes().unwrap();
        let back = CanonicalTable::read_csv(bytes.as_slice(), small_bins(), TableUnits::AreaKm2, &registry).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_csv_rejects_other_step() {
        let registry = ZoneRegistry::default();
        let text = "treecover,Polar\n0,1\n2,1\n4,1\n";
        let err = CanonicalTable::read_csv(text.as_bytes(), small_bins(), TableUnits::Pixels, &registry).unwrap_err();
        assert!(matches!(err, ZonalError::InvalidTable(_)));
    }

    #[test]
    fn test_csv_rejects_unknown_zone() {
        let registry = ZoneRegistry::default();
        let text = "treecover,Lunar highlands\n0,1\n1,1\n2,1\n";
        assert!(CanonicalTable::read_csv(text.as_bytes(), small_bins(), TableUnits::Pixels, &registry).is_err());
    }
}
