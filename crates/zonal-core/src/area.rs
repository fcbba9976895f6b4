//! Pixel-count to area conversion.

use crate::error::ZonalError;
use crate::table::{CanonicalTable, TableUnits};
use crate::Result;

/// Square meters per square kilometre.
const M2_PER_KM2: f64 = 1e6;

/// Ground area of one pixel in km² at a linear resolution of `scale_m` meters.
pub fn pixel_area_km2(scale_m: f64) -> Result<f64> {
    if !scale_m.is_finite() || scale_m <= 0.0 {
        return Err(ZonalError::InvalidScale(scale_m));
    }
    Ok(scale_m * scale_m / M2_PER_KM2)
}

/// Convert a pixel-count table to km²: every cell becomes `c * scale² / 1e6`.
pub fn normalize(table: &CanonicalTable, scale_m: f64) -> Result<CanonicalTable> {
    if table.units() == TableUnits::AreaKm2 {
        return Err(ZonalError::AlreadyNormalized(TableUnits::AreaKm2.as_str()));
    }
    let factor = pixel_area_km2(scale_m)?;
    Ok(table.map_cells(TableUnits::AreaKm2, |c| c * factor))
}

/// Inverse of [`normalize`].
pub fn to_pixels(table: &CanonicalTable, scale_m: f64) -> Result<CanonicalTable> {
    if table.units() == TableUnits::Pixels {
        return Err(ZonalError::AlreadyNormalized(TableUnits::Pixels.as_str()));
    }
    let factor = pixel_area_km2(scale_m)?;
    Ok(table.map_cells(TableUnits::Pixels, |c| c / factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinConfig;
    use crate::table::ZoneColumn;
    use crate::zone::Ecozone;
    use approx::assert_relative_eq;

    fn pixel_table() -> CanonicalTable {
        let bins = BinConfig { min: 0, max: 4, step: 1 }.sequence().unwrap();
        CanonicalTable::from_columns(
            bins,
            TableUnits::Pixels,
            vec![
                ZoneColumn { zone: Ecozone::TropicalDryForest, values: vec![0.0, 1.0, 250.0, 1e7] },
                ZoneColumn { zone: Ecozone::TemperateSteppe, values: vec![3.0, 3.0, 0.5, 9.0] },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_hundred_meter_pixels() {
        // 100 m pixels are 0.01 km² each.
        assert_relative_eq!(pixel_area_km2(100.0).unwrap(), 0.01);
        let area = normalize(&pixel_table(), 100.0).unwrap();
        assert_eq!(area.units(), TableUnits::AreaKm2);
        assert_relative_eq!(area.column(Ecozone::TropicalDryForest).unwrap()[2], 2.5);
        assert_relative_eq!(area.column(Ecozone::TropicalDryForest).unwrap()[3], 1e5);
    }

    #[test]
    fn test_round_trip() {
        let pixels = pixel_table();
        for scale in [30.0, 100.0, 463.3127] {
            let back = to_pixels(&normalize(&pixels, scale).unwrap(), scale).unwrap();
            for (a, b) in pixels.columns().iter().zip(back.columns()) {
                assert_eq!(a.zone, b.zone);
                for (x, y) in a.values.iter().zip(&b.values) {
                    assert_relative_eq!(*x, *y, max_relative = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_invalid_scale() {
        for scale in [0.0, -30.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(normalize(&pixel_table(), scale), Err(ZonalError::InvalidScale(_))));
        }
    }

    #[test]
    fn test_double_normalization_rejected() {
        let area = normalize(&pixel_table(), 30.0).unwrap();
        assert!(matches!(normalize(&area, 30.0), Err(ZonalError::AlreadyNormalized(_))));
    }
}
