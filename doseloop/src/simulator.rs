// src/simulator.rs
//
// Physiological simulator: folds dose events into active-effect series via
// the absorption kernels and integrates the glucose balance equation with a
// forward-Euler step.
//
//   g[t] = g[t-1] + food[t-1]
//          - Δ · g[t-1] · S_I · ins[t-1]
//          - Δ · background
//          - Δ · kidney · max(0, g[t-1] - renal_threshold)
//
// Doses are append-only. Folding is additive, so two doses at the same minute
// produce the same series as one dose of the summed magnitude.

use serde::{Deserialize, Serialize};

use crate::config::{Config, KernelConfig, RateMode, SimConfig};
use crate::error::SimError;
use crate::kernel::AbsorptionKernel;
use crate::series::TimeSeries;
use crate::trend::series_slope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseKind {
    Insulin,
    Food,
}

impl DoseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoseKind::Insulin => "insulin",
            DoseKind::Food => "food",
        }
    }
}

/// One administered dose (units of insulin or calories of food).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    pub minute: usize,
    pub magnitude: f64,
    pub kind: DoseKind,
}

pub struct Simulator {
    cfg: SimConfig,
    insulin_kernel: AbsorptionKernel,
    // K(0..horizon) sampled once; folding only needs integer offsets.
    insulin_table: Vec<f64>,
    food_table: Vec<f64>,
    glucose: TimeSeries,
    glucose_rate: TimeSeries,
    active_insulin: TimeSeries,
    active_food: TimeSeries,
    insulin_doses: Vec<DoseEvent>,
    food_doses: Vec<DoseEvent>,
}

impl Simulator {
    /// Fresh simulator over `[0, horizon)` with `glucose[0] = initial_glucose`.
    pub fn new(cfg: SimConfig, kernels: KernelConfig, horizon: usize) -> Result<Self, SimError> {
        let mut glucose = TimeSeries::new(horizon);
        glucose.set(0, cfg.initial_glucose)?;
        Ok(Self {
            cfg,
            insulin_table: kernels.insulin.table(horizon),
            food_table: kernels.food.table(horizon),
            insulin_kernel: kernels.insulin,
            glucose,
            glucose_rate: TimeSeries::new(horizon),
            active_insulin: TimeSeries::new(horizon),
            active_food: TimeSeries::new(horizon),
            insulin_doses: Vec::new(),
            food_doses: Vec::new(),
        })
    }

    /// Horizon for a training episode: evaluated minutes plus the on-board
    /// lookahead, so every on-board read inside the episode stays in range.
    pub fn training_horizon(cfg: &Config) -> usize {
        cfg.training.episode_minutes + cfg.sim.onboard_lookahead_minutes
    }

    pub fn for_training(cfg: &Config) -> Result<Self, SimError> {
        Self::new(
            cfg.sim.clone(),
            cfg.kernels.clone(),
            Self::training_horizon(cfg),
        )
    }

    pub fn horizon(&self) -> usize {
        self.glucose.len()
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    fn check_minute(&self, t: usize) -> Result<(), SimError> {
        if t >= self.horizon() {
            return Err(SimError::IndexOutOfRange {
                index: t,
                horizon: self.horizon(),
            });
        }
        Ok(())
    }

    fn check_magnitude(kind: DoseKind, magnitude: f64) -> Result<(), SimError> {
        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(SimError::InvalidDose {
                kind: kind.as_str(),
                magnitude,
            });
        }
        Ok(())
    }

    /// Fold `units × K_ins(t − t0)` into `active_insulin[t0..]`.
    ///
    /// Returns the index of the new event in [`insulin_doses`](Self::insulin_doses).
    pub fn dose_insulin(&mut self, t0: usize, units: f64) -> Result<usize, SimError> {
        Self::check_magnitude(DoseKind::Insulin, units)?;
        self.check_minute(t0)?;
        let table = &self.insulin_table;
        self.active_insulin.fold_from(t0, units, |i| table[i])?;
        self.insulin_doses.push(DoseEvent {
            minute: t0,
            magnitude: units,
            kind: DoseKind::Insulin,
        });
        Ok(self.insulin_doses.len() - 1)
    }

    /// Fold `calories × food_sensitivity × K_food(t − t0)` into `active_food[t0..]`.
    pub fn dose_food(&mut self, t0: usize, calories: f64) -> Result<usize, SimError> {
        Self::check_magnitude(DoseKind::Food, calories)?;
        self.check_minute(t0)?;
        let table = &self.food_table;
        let scale = calories * self.cfg.food_sensitivity;
        self.active_food.fold_from(t0, scale, |i| table[i])?;
        self.food_doses.push(DoseEvent {
            minute: t0,
            magnitude: calories,
            kind: DoseKind::Food,
        });
        Ok(self.food_doses.len() - 1)
    }

    /// Advance glucose to minute `t` from `t - 1`. `step(0)` keeps the initial condition.
    pub fn step(&mut self, t: usize) -> Result<(), SimError> {
        self.check_minute(t)?;
        if t == 0 {
            return Ok(());
        }
        let dt = self.cfg.step_minutes;
        let g_prev = self.glucose.get(t - 1)?;
        let food = self.active_food.get(t - 1)?;
        let ins = self.active_insulin.get(t - 1)?;

        let uptake = dt * g_prev * self.cfg.insulin_sensitivity * ins;
        let background = dt * self.cfg.background_use_rate;
        let excess = (g_prev - self.cfg.renal_threshold).max(0.0);
        let renal = dt * self.cfg.kidney_clearance_rate * excess;
        let g = g_prev + food - uptake - background - renal;
        self.glucose.set(t, g)?;

        let rate = match self.cfg.rate_mode {
            RateMode::Difference => (g - g_prev) / dt,
            RateMode::Regression { window } => {
                let start = (t + 1).saturating_sub(window);
                series_slope(&self.glucose.as_slice()[start..=t], dt)
            }
        };
        self.glucose_rate.set(t, rate)
    }

    pub fn glucose_at(&self, t: usize) -> Result<f64, SimError> {
        self.glucose.get(t)
    }

    pub fn rate_at(&self, t: usize) -> Result<f64, SimError> {
        self.glucose_rate.get(t)
    }

    /// `active_insulin[t + lookahead]`: the forward read used as an on-board proxy.
    pub fn insulin_on_board(&self, t: usize) -> Result<f64, SimError> {
        self.active_insulin
            .get(t.saturating_add(self.cfg.onboard_lookahead_minutes))
    }

    /// `active_food[t + lookahead]`.
    pub fn food_on_board(&self, t: usize) -> Result<f64, SimError> {
        self.active_food
            .get(t.saturating_add(self.cfg.onboard_lookahead_minutes))
    }

    /// Unscaled kernel value of insulin event `event_idx` at minute `t`.
    pub fn insulin_contribution(&self, event_idx: usize, t: usize) -> Result<f64, SimError> {
        let event = self
            .insulin_doses
            .get(event_idx)
            .ok_or(SimError::UnknownDose(event_idx))?;
        Ok(self
            .insulin_kernel
            .eval(t as f64 - event.minute as f64))
    }

    /// Regenerate the scaled contribution curve of one insulin event over the horizon.
    pub fn insulin_curve(&self, event_idx: usize) -> Result<Vec<f64>, SimError> {
        let event = self
            .insulin_doses
            .get(event_idx)
            .ok_or(SimError::UnknownDose(event_idx))?;
        Ok((0..self.horizon())
            .map(|t| event.magnitude * self.insulin_kernel.eval(t as f64 - event.minute as f64))
            .collect())
    }

    pub fn glucose(&self) -> &[f64] {
        self.glucose.as_slice()
    }

    pub fn glucose_rate(&self) -> &[f64] {
        self.glucose_rate.as_slice()
    }

    pub fn active_insulin(&self) -> &[f64] {
        self.active_insulin.as_slice()
    }

    pub fn active_food(&self) -> &[f64] {
        self.active_food.as_slice()
    }

    pub fn insulin_doses(&self) -> &[DoseEvent] {
        &self.insulin_doses
    }

    pub fn food_doses(&self) -> &[DoseEvent] {
        &self.food_doses
    }

    pub fn insulin_kernel(&self) -> &AbsorptionKernel {
        &self.insulin_kernel
    }
}
