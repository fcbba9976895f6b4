//! Global Ecological Zone (GEZ) registry.
//!
//! The zone raster carries bare integer codes with no names attached, so the
//! mapping from code to name and display color lives here. The set is closed:
//! 21 zones, each with a unique code. Codes are arbitrary small integers and
//! carry no ordering meaning; the registry order below is the canonical column
//! order for stats tables and legends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of zones in the registry.
pub const ZONE_COUNT: usize = 21;

/// One of the fixed ecological zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ecozone {
    BorealConiferousForest,
    BorealMountainSystem,
    BorealTundraWoodland,
    Polar,
    SubtropicalDesert,
    SubtropicalDryForest,
    SubtropicalHumidForest,
    SubtropicalMountainSystem,
    SubtropicalSteppe,
    TemperateContinentalForest,
    TemperateDesert,
    TemperateMountainSystem,
    TemperateOceanicForest,
    TemperateSteppe,
    TropicalDesert,
    TropicalDryForest,
    TropicalMoistForest,
    TropicalMountainSystem,
    TropicalRainforest,
    TropicalShrubland,
    Water,
}

/// Static description of a zone: raster code, display name and legend color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneInfo {
    pub zone: Ecozone,
    pub code: i64,
    pub name: &'static str,
    pub color: &'static str,
}

const fn info(zone: Ecozone, code: i64, name: &'static str, color: &'static str) -> ZoneInfo {
    ZoneInfo { zone, code, name, color }
}

/// Registry entries, indexed by `Ecozone as usize`.
static ZONES: [ZoneInfo; ZONE_COUNT] = [
    info(Ecozone::BorealConiferousForest, 41, "Boreal coniferous forest", "#0266F2"),
    info(Ecozone::BorealMountainSystem, 43, "Boreal mountain system", "#C7ECFF"),
    info(Ecozone::BorealTundraWoodland, 42, "Boreal tundra woodland", "#6EDCFF"),
    info(Ecozone::Polar, 50, "Polar", "#BCD2FF"),
    info(Ecozone::SubtropicalDesert, 24, "Subtropical desert", "#FEF3CD"),
    info(Ecozone::SubtropicalDryForest, 22, "Subtropical dry forest", "#974000"),
    info(Ecozone::SubtropicalHumidForest, 21, "Subtropical humid forest", "#3F0D01"),
    info(Ecozone::SubtropicalMountainSystem, 25, "Subtropical mountain system", "#EC9664"),
    info(Ecozone::SubtropicalSteppe, 23, "Subtropical steppe", "#FDE499"),
    info(Ecozone::TemperateContinentalForest, 32, "Temperate continental forest", "#1FE62C"),
    info(Ecozone::TemperateDesert, 34, "Temperate desert", "#F1FFCD"),
    info(Ecozone::TemperateMountainSystem, 35, "Temperate mountain system", "#85FF41"),
    info(Ecozone::TemperateOceanicForest, 31, "Temperate oceanic forest", "#008C01"),
    info(Ecozone::TemperateSteppe, 33, "Temperate steppe", "#D9FF97"),
    info(Ecozone::TropicalDesert, 15, "Tropical desert", "#FEE6D9"),
    info(Ecozone::TropicalDryForest, 13, "Tropical dry forest", "#E31A32"),
    info(Ecozone::TropicalMoistForest, 12, "Tropical moist forest", "#BD014D"),
    info(Ecozone::TropicalMountainSystem, 16, "Tropical mountain system", "#FE8C4D"),
    info(Ecozone::TropicalRainforest, 11, "Tropical rainforest", "#7F004E"),
    info(Ecozone::TropicalShrubland, 14, "Tropical shrubland", "#FECCB3"),
    info(Ecozone::Water, 90, "Water", "#FEFFFF"),
];

impl Ecozone {
    /// All zones in registry order.
    pub const ALL: [Ecozone; ZONE_COUNT] = [
        Ecozone::BorealConiferousForest,
        Ecozone::BorealMountainSystem,
        Ecozone::BorealTundraWoodland,
        Ecozone::Polar,
        Ecozone::SubtropicalDesert,
        Ecozone::SubtropicalDryForest,
        Ecozone::SubtropicalHumidForest,
        Ecozone::SubtropicalMountainSystem,
        Ecozone::SubtropicalSteppe,
        Ecozone::TemperateContinentalForest,
        Ecozone::TemperateDesert,
        Ecozone::TemperateMountainSystem,
        Ecozone::TemperateOceanicForest,
        Ecozone::TemperateSteppe,
        Ecozone::TropicalDesert,
        Ecozone::TropicalDryForest,
        Ecozone::TropicalMoistForest,
        Ecozone::TropicalMountainSystem,
        Ecozone::TropicalRainforest,
        Ecozone::TropicalShrubland,
        Ecozone::Water,
    ];

    /// Position of this zone in the registry.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Registry entry for this zone.
    pub fn info(self) -> &'static ZoneInfo {
        &ZONES[self as usize]
    }

    /// Integer code used in the zone raster.
    pub fn code(self) -> i64 {
        self.info().code
    }

    /// Human-readable zone name (also the stats table column header).
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Legend color as a `#RRGGBB` string.
    pub fn color(self) -> &'static str {
        self.info().color
    }

    /// Look up a zone by its raster code.
    pub const fn from_code(code: i64) -> Option<Self> {
        let zone = match code {
            11 => Ecozone::TropicalRainforest,
            12 => Ecozone::TropicalMoistForest,
            13 => Ecozone::TropicalDryForest,
            14 => Ecozone::TropicalShrubland,
            15 => Ecozone::TropicalDesert,
            16 => Ecozone::TropicalMountainSystem,
            21 => Ecozone::SubtropicalHumidForest,
            22 => Ecozone::SubtropicalDryForest,
            23 => Ecozone::SubtropicalSteppe,
            24 => Ecozone::SubtropicalDesert,
            25 => Ecozone::SubtropicalMountainSystem,
            31 => Ecozone::TemperateOceanicForest,
            32 => Ecozone::TemperateContinentalForest,
            33 => Ecozone::TemperateSteppe,
            34 => Ecozone::TemperateDesert,
            35 => Ecozone::TemperateMountainSystem,
            41 => Ecozone::BorealConiferousForest,
            42 => Ecozone::BorealTundraWoodland,
            43 => Ecozone::BorealMountainSystem,
            50 => Ecozone::Polar,
            90 => Ecozone::Water,
            _ => return None,
        };
        Some(zone)
    }

    /// Look up a zone by its display name (exact match).
    pub fn from_name(name: &str) -> Option<Self> {
        ZONES.iter().find(|z| z.name == name).map(|z| z.zone)
    }
}

impl fmt::Display for Ecozone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of the zone registry, handed to the components that
/// resolve codes or names.
///
/// The registry is plain static data; this handle exists so callers receive
/// it explicitly instead of reaching for a global map.
#[derive(Debug, Clone, Copy)]
pub struct ZoneRegistry {
    entries: &'static [ZoneInfo; ZONE_COUNT],
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::gez_2010()
    }
}

impl ZoneRegistry {
    /// The 2010 Global Ecological Zones classification.
    pub fn gez_2010() -> Self {
        Self { entries: &ZONES }
    }

    /// Resolve a raster code.
    pub fn by_code(&self, code: i64) -> Option<&'static ZoneInfo> {
        Ecozone::from_code(code).map(|z| &self.entries[z.index()])
    }

    /// Resolve a display name.
    pub fn by_name(&self, name: &str) -> Option<&'static ZoneInfo> {
        self.entries.iter().find(|z| z.name == name)
    }

    /// Iterate entries in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &'static ZoneInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
