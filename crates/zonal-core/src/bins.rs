//! Fixed histogram bins over the percent tree-canopy-cover domain.
//!
//! A run uses one ordered partition of `[min, max)` into equal-width bins. Every
//! zone column in a table shares that partition; bins are identified by their
//! lower bound.

use crate::error::ZonalError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Upper limit of the canopy-cover domain (percent).
pub const DOMAIN_MAX: u32 = 100;

/// Tolerance when matching a reported bin value to a slot.
const SLOT_TOLERANCE: f64 = 1e-6;

/// Histogram bin configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinConfig {
    /// Inclusive lower bound of the first bin.
    pub min: u32,
    /// Exclusive upper bound of the last bin.
    pub max: u32,
    /// Bin width.
    pub step: u32,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: DOMAIN_MAX,
            step: 1,
        }
    }
}

impl BinConfig {
    /// Full `[0, 100)` domain with the given step.
    pub fn with_step(step: u32) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    /// Check that the configuration partitions the domain evenly.
    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(ZonalError::InvalidBins("step must be positive".into()));
        }
        if self.max > DOMAIN_MAX {
            return Err(ZonalError::InvalidBins(format!(
                "max {} exceeds domain limit {}",
                self.max, DOMAIN_MAX
            )));
        }
        if self.min >= self.max {
            return Err(ZonalError::InvalidBins(format!(
                "min {} must be below max {}",
                self.min, self.max
            )));
        }
        if (self.max - self.min) % self.step != 0 {
            return Err(ZonalError::InvalidBins(format!(
                "step {} does not evenly divide [{}, {})",
                self.step, self.min, self.max
            )));
        }
        Ok(())
    }

    /// Number of bins (`hist_steps` in the remote engine's terms).
    pub fn bin_count(&self) -> usize {
        if self.step == 0 || self.max <= self.min {
            return 0;
        }
        ((self.max - self.min) / self.step) as usize
    }

    /// Build the ordered bin sequence.
    pub fn sequence(&self) -> Result<BinSequence> {
        self.validate()?;
        Ok(BinSequence { config: *self })
    }
}

/// The ordered bins of a validated [`BinConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinSequence {
    config: BinConfig,
}

impl BinSequence {
    pub fn config(&self) -> &BinConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.config.bin_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lower bound of the bin at `slot`.
    pub fn value(&self, slot: usize) -> u32 {
        self.config.min + slot as u32 * self.config.step
    }

    /// Lower bounds of all bins, in order.
    pub fn values(&self) -> Vec<u32> {
        (0..self.len()).map(|slot| self.value(slot)).collect()
    }

    /// Slot of the bin whose lower bound is `value`.
    ///
    /// Returns `None` when the value is non-finite, outside the sequence, or
    /// not aligned to a bin boundary.
    pub fn slot_of(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        let offset = (value - self.config.min as f64) / self.config.step as f64;
        let slot = offset.round();
        if (offset - slot).abs() > SLOT_TOLERANCE || slot < 0.0 {
            return None;
        }
        let slot = slot as usize;
        (slot < self.len()).then_some(slot)
    }
}
