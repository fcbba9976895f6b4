//! # zonal-core
//!
//! Domain logic for per-ecozone tree-canopy-cover histograms.
//!
//! The remote raster engine reports one fixed histogram per geometric patch of
//! each ecological zone inside an area of interest. This crate turns those
//! per-patch rows into a single table with one row per canopy-cover bin and one
//! column per observed zone:
//!
//! - [`Ecozone`] / [`ZoneRegistry`] - the closed set of 21 Global Ecological Zones
//! - [`BinConfig`] / [`BinSequence`] - the fixed partition of `[0, 100)`
//! - [`read_raw_table`] / [`PatchRow`] - decoding and validating raw rows
//! - [`Aggregator`] - merging rows into a [`CanonicalTable`]
//! - [`normalize`] - converting pixel counts to km²
//!
//! ## Example
//!
//! ```
//! use zonal_core::{normalize, read_raw_table, Aggregator, BinConfig, Ecozone, ZoneRegistry};
//!
//! let raw = "label,total,histogram\n\
//!            41,8,\"[[0, 5], [1, 3]]\"\n\
//!            41,9,\"[[1, 2], [2, 7]]\"\n";
//! let records = read_raw_table(raw.as_bytes())?;
//!
//! let bins = BinConfig { min: 0, max: 3, step: 1 }.sequence()?;
//! let aggregation = Aggregator::new(bins, ZoneRegistry::default()).aggregate(&records)?;
//! let pixels = aggregation.table;
//! assert_eq!(pixels.column(Ecozone::BorealConiferousForest), Some(&[5.0, 5.0, 7.0][..]));
//!
//! let area = normalize(&pixels, 100.0)?;
//! assert_eq!(area.column(Ecozone::BorealConiferousForest), Some(&[0.05, 0.05, 0.07][..]));
//! # Ok::<(), zonal_core::ZonalError>(())
//! ```

mod aggregate;
mod area;
mod bins;
mod error;
mod patch;
mod table;
mod zone;

pub use aggregate::{aggregate, Aggregation, AggregationReport, Aggregator, UnknownZonePolicy};
pub use area::{normalize, pixel_area_km2, to_pixels};
pub use bins::{BinConfig, BinSequence, DOMAIN_MAX};
pub use error::ZonalError;
pub use patch::{
    read_raw_table, MalformedPatchRow, MalformedReason, PatchRow, RawPatchRecord, HISTOGRAM_COLUMN,
    LABEL_COLUMN, TOTAL_COLUMN,
};
pub use table::{CanonicalTable, TableUnits, ZoneColumn, BIN_COLUMN};
pub use zone::{Ecozone, ZoneInfo, ZoneRegistry, ZONE_COUNT};

/// Result type for zonal table operations.
pub type Result<T> = std::result::Result<T, ZonalError>;
