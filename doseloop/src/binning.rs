// src/binning.rs
//
// Discretisation of simulator readings into a finite state key.
//
// Thresholds are half-open: `value < threshold` selects the lower bin. The
// mapping is total (NaN fails every comparison and lands in the top bin) and
// monotone non-decreasing in its input.

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::simulator::Simulator;

pub const GLUCOSE_THRESHOLDS: [f64; 6] = [60.0, 80.0, 130.0, 200.0, 300.0, 400.0];
pub const RATE_THRESHOLDS: [f64; 6] = [-3.0, -1.5, -0.5, 0.5, 1.5, 3.0];
pub const INSULIN_ON_BOARD_THRESHOLDS: [f64; 6] = [0.0025, 0.005, 0.0075, 0.010, 0.0175, 0.025];
pub const FOOD_ON_BOARD_THRESHOLDS: [f64; 6] = [2.5, 5.0, 7.5, 10.0, 15.0, 20.0];

/// Index of the first threshold the value is below, or `thresholds.len()`.
fn bucket(value: f64, thresholds: &[f64; 6]) -> usize {
    thresholds
        .iter()
        .position(|&th| value < th)
        .unwrap_or(thresholds.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GlucoseBin {
    SevereLow,
    Low,
    InRange,
    Elevated,
    High,
    VeryHigh,
    Extreme,
}

impl GlucoseBin {
    const ALL: [GlucoseBin; 7] = [
        GlucoseBin::SevereLow,
        GlucoseBin::Low,
        GlucoseBin::InRange,
        GlucoseBin::Elevated,
        GlucoseBin::High,
        GlucoseBin::VeryHigh,
        GlucoseBin::Extreme,
    ];

    pub fn from_mgdl(g: f64) -> Self {
        Self::ALL[bucket(g, &GLUCOSE_THRESHOLDS)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RateBin {
    FallingFast,
    Falling,
    FallingSlow,
    Flat,
    RisingSlow,
    Rising,
    RisingFast,
}

impl RateBin {
    const ALL: [RateBin; 7] = [
        RateBin::FallingFast,
        RateBin::Falling,
        RateBin::FallingSlow,
        RateBin::Flat,
        RateBin::RisingSlow,
        RateBin::Rising,
        RateBin::RisingFast,
    ];

    pub fn from_rate(r: f64) -> Self {
        Self::ALL[bucket(r, &RATE_THRESHOLDS)]
    }
}

/// On-board level bin, shared by insulin and food.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LoadBin {
    L0,
    L1,
    L2,
    L3,
    L4,
    L5,
    L6,
}

impl LoadBin {
    const ALL: [LoadBin; 7] = [
        LoadBin::L0,
        LoadBin::L1,
        LoadBin::L2,
        LoadBin::L3,
        LoadBin::L4,
        LoadBin::L5,
        LoadBin::L6,
    ];

    pub fn insulin(iob: f64) -> Self {
        Self::ALL[bucket(iob, &INSULIN_ON_BOARD_THRESHOLDS)]
    }

    pub fn food(fob: f64) -> Self {
        Self::ALL[bucket(fob, &FOOD_ON_BOARD_THRESHOLDS)]
    }
}

/// Discrete physiological state used as the policy row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub glucose: GlucoseBin,
    pub rate: RateBin,
    pub insulin: LoadBin,
    pub food: LoadBin,
}

impl StateKey {
    pub fn from_readings(glucose: f64, rate: f64, iob: f64, fob: f64) -> Self {
        Self {
            glucose: GlucoseBin::from_mgdl(glucose),
            rate: RateBin::from_rate(rate),
            insulin: LoadBin::insulin(iob),
            food: LoadBin::food(fob),
        }
    }

    /// Read glucose, rate and on-board levels at minute `t`.
    pub fn observe(sim: &Simulator, t: usize) -> Result<Self, SimError> {
        Ok(Self::from_readings(
            sim.glucose_at(t)?,
            sim.rate_at(t)?,
            sim.insulin_on_board(t)?,
            sim.food_on_board(t)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_half_open() {
        assert_eq!(GlucoseBin::from_mgdl(59.999), GlucoseBin::SevereLow);
        assert_eq!(GlucoseBin::from_mgdl(60.0), GlucoseBin::Low);
        assert_eq!(GlucoseBin::from_mgdl(129.9), GlucoseBin::InRange);
        assert_eq!(GlucoseBin::from_mgdl(400.0), GlucoseBin::Extreme);
        assert_eq!(RateBin::from_rate(0.0), RateBin::Flat);
        assert_eq!(RateBin::from_rate(-0.5), RateBin::Flat);
        assert_eq!(RateBin::from_rate(-3.1), RateBin::FallingFast);
        assert_eq!(LoadBin::insulin(0.0), LoadBin::L0);
        assert_eq!(LoadBin::insulin(0.025), LoadBin::L6);
        assert_eq!(LoadBin::food(7.5), LoadBin::L3);
    }

    #[test]
    fn nan_lands_in_top_bin() {
        assert_eq!(GlucoseBin::from_mgdl(f64::NAN), GlucoseBin::Extreme);
        assert_eq!(RateBin::from_rate(f64::NAN), RateBin::RisingFast);
        assert_eq!(LoadBin::food(f64::NAN), LoadBin::L6);
    }

    #[test]
    fn infinities_are_total() {
        assert_eq!(GlucoseBin::from_mgdl(f64::NEG_INFINITY), GlucoseBin::SevereLow);
        assert_eq!(RateBin::from_rate(f64::INFINITY), RateBin::RisingFast);
    }

    #[test]
    fn state_keys_order_by_glucose_first() {
        let low = StateKey::from_readings(70.0, 5.0, 1.0, 100.0);
        let high = StateKey::from_readings(250.0, -5.0, 0.0, 0.0);
        assert!(low < high);
    }
}
