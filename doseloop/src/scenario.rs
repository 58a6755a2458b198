// src/scenario.rs
//
// Scripted open-loop scenarios: a fixed schedule of insulin and food doses
// run through the simulator without a policy.
//
// A scenario defines:
// - name + schema_version for tracking
// - initial glucose and horizon
// - insulin doses (units) and food doses (calories) at given minutes
// - optional physiology overrides on top of the base config
// - optional projection guard replayed over CGM-style samples of the trace

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Result, ScenarioError};
use crate::metrics::GlycemicSummary;
use crate::simulator::Simulator;
use crate::trend::{ProjectionAlert, ProjectionGuard, ProjectionGuardConfig, Reading};

/// Current scenario schema version.
pub const SCENARIO_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCENARIO_SCHEMA_VERSION
}

fn default_cgm_interval() -> usize {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoseSpec {
    pub minute: usize,
    pub amount: f64,
}

impl DoseSpec {
    pub fn new(minute: usize, amount: f64) -> Self {
        Self { minute, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub initial_glucose: f64,
    pub horizon_minutes: usize,
    #[serde(default)]
    pub insulin: Vec<DoseSpec>,
    #[serde(default)]
    pub food: Vec<DoseSpec>,
    /// Overrides `sim.insulin_sensitivity`.
    #[serde(default)]
    pub insulin_sensitivity: Option<f64>,
    /// Overrides `sim.food_sensitivity`.
    #[serde(default)]
    pub food_sensitivity: Option<f64>,
    #[serde(default)]
    pub guard: Option<ProjectionGuardConfig>,
    /// Minutes between simulated sensor readings fed to the guard.
    #[serde(default = "default_cgm_interval")]
    pub cgm_interval_minutes: usize,
}

/// Result of running a scenario to its horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub horizon_minutes: usize,
    pub glycemic: GlycemicSummary,
    pub final_glucose: f64,
    pub total_insulin_units: f64,
    pub total_calories: f64,
    pub alerts: Vec<ProjectionAlert>,
    pub glucose: Vec<f64>,
    pub glucose_rate: Vec<f64>,
    pub active_insulin: Vec<f64>,
    pub active_food: Vec<f64>,
}

impl Scenario {
    /// Three meals a day, each preceded by an insulin dose, starting high.
    ///
    /// Food sensitivity 3.2 mg/dL per calorie matches the hand-tuned day
    /// this schedule was written for.
    pub fn reference_day() -> Self {
        Self {
            schema_version: SCENARIO_SCHEMA_VERSION,
            name: "reference_day".to_string(),
            description: Some("three meals, three insulin doses, start at 370 mg/dL".to_string()),
            initial_glucose: 370.0,
            horizon_minutes: 24 * 60,
            insulin: vec![
                DoseSpec::new(1, 3.0),
                DoseSpec::new(8 * 60, 2.0),
                DoseSpec::new(16 * 60, 2.3),
            ],
            food: vec![
                DoseSpec::new(90, 130.0),
                DoseSpec::new(8 * 60 + 90, 130.0),
                DoseSpec::new(16 * 60 + 90, 130.0),
            ],
            insulin_sensitivity: None,
            food_sensitivity: Some(3.2),
            guard: Some(ProjectionGuardConfig::default()),
            cgm_interval_minutes: 5,
        }
    }

    /// No doses at all; glucose relaxes under renal clearance only.
    pub fn fasting(initial_glucose: f64, horizon_minutes: usize) -> Self {
        Self {
            schema_version: SCENARIO_SCHEMA_VERSION,
            name: "fasting".to_string(),
            description: None,
            initial_glucose,
            horizon_minutes,
            insulin: Vec::new(),
            food: Vec::new(),
            insulin_sensitivity: None,
            food_sensitivity: None,
            guard: None,
            cgm_interval_minutes: 5,
        }
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ScenarioError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| ScenarioError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> std::result::Result<(), ScenarioError> {
        let invalid = |field: &str, message: String| ScenarioError::Validation {
            field: field.to_string(),
            message,
        };
        if self.schema_version != SCENARIO_SCHEMA_VERSION {
            return Err(invalid(
                "schema_version",
                format!(
                    "unsupported schema version {} (expected {})",
                    self.schema_version, SCENARIO_SCHEMA_VERSION
                ),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty".to_string()));
        }
        if !self.initial_glucose.is_finite() || self.initial_glucose < 0.0 {
            return Err(invalid("initial_glucose", "must be finite and >= 0".to_string()));
        }
        if self.horizon_minutes == 0 {
            return Err(invalid("horizon_minutes", "must be > 0".to_string()));
        }
        if self.cgm_interval_minutes == 0 {
            return Err(invalid("cgm_interval_minutes", "must be > 0".to_string()));
        }
        for (field, doses) in [("insulin", &self.insulin), ("food", &self.food)] {
            for (i, d) in doses.iter().enumerate() {
                if d.minute >= self.horizon_minutes {
                    return Err(invalid(
                        field,
                        format!("dose {i} at minute {} is past the horizon", d.minute),
                    ));
                }
                if !d.amount.is_finite() || d.amount < 0.0 {
                    return Err(invalid(field, format!("dose {i} has invalid amount {}", d.amount)));
                }
            }
        }
        for (field, v) in [
            ("insulin_sensitivity", self.insulin_sensitivity),
            ("food_sensitivity", self.food_sensitivity),
        ] {
            if let Some(v) = v {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(field, "must be finite and >= 0".to_string()));
                }
            }
        }
        Ok(())
    }

    pub fn to_yaml_string(&self) -> std::result::Result<String, ScenarioError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Build a simulator with every scheduled dose already folded in.
    ///
    /// Folding is causal, so dosing up front and then stepping gives the same
    /// trace as dosing at each minute.
    pub fn build_simulator(&self, cfg: &Config) -> Result<Simulator> {
        let mut sim_cfg = cfg.sim.clone();
        sim_cfg.initial_glucose = self.initial_glucose;
        if let Some(v) = self.insulin_sensitivity {
            sim_cfg.insulin_sensitivity = v;
        }
        if let Some(v) = self.food_sensitivity {
            sim_cfg.food_sensitivity = v;
        }
        let mut sim = Simulator::new(sim_cfg, cfg.kernels.clone(), self.horizon_minutes)?;
        for d in &self.insulin {
            sim.dose_insulin(d.minute, d.amount)?;
        }
        for d in &self.food {
            sim.dose_food(d.minute, d.amount)?;
        }
        Ok(sim)
    }

    pub fn run(&self, cfg: &Config) -> Result<ScenarioOutcome> {
        self.validate()?;
        let mut sim = self.build_simulator(cfg)?;
        let mut guard = self.guard.clone().map(ProjectionGuard::new);
        let mut alerts = Vec::new();

        for t in 0..self.horizon_minutes {
            sim.step(t)?;
            if let Some(g) = guard.as_mut() {
                if t % self.cgm_interval_minutes == 0 {
                    let reading = Reading {
                        minute: t as f64,
                        mgdl: sim.glucose_at(t)?,
                    };
                    for alert in g.observe(reading) {
                        tracing::debug!(
                            scenario = %self.name,
                            minute = t,
                            kind = ?alert.kind,
                            projected = alert.projected_mgdl,
                            "projection alert"
                        );
                        alerts.push(alert);
                    }
                }
            }
        }

        let glycemic = GlycemicSummary::from_trace(
            sim.glucose(),
            cfg.reward.target_low,
            cfg.reward.target_high,
        );
        let final_glucose = sim.glucose().last().copied().unwrap_or(self.initial_glucose);
        tracing::info!(
            scenario = %self.name,
            final_glucose,
            time_in_range = glycemic.time_in_range,
            alerts = alerts.len(),
            "scenario complete"
        );

        Ok(ScenarioOutcome {
            name: self.name.clone(),
            horizon_minutes: self.horizon_minutes,
            glycemic,
            final_glucose,
            total_insulin_units: self.insulin.iter().map(|d| d.amount).sum(),
            total_calories: self.food.iter().map(|d| d.amount).sum(),
            alerts,
            glucose: sim.glucose().to_vec(),
            glucose_rate: sim.glucose_rate().to_vec(),
            active_insulin: sim.active_insulin().to_vec(),
            active_food: sim.active_food().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_day_is_valid() {
        let s = Scenario::reference_day();
        s.validate().unwrap();
        assert_eq!(s.insulin.len(), 3);
        assert_eq!(s.food.len(), 3);
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let yaml = r#"
name: snack
initial_glucose: 120
horizon_minutes: 600
food:
  - { minute: 30, amount: 50 }
"#;
        let s = Scenario::from_yaml_str(yaml).unwrap();
        assert_eq!(s.schema_version, SCENARIO_SCHEMA_VERSION);
        assert_eq!(s.cgm_interval_minutes, 5);
        assert!(s.insulin.is_empty());
        assert_eq!(s.food, vec![DoseSpec::new(30, 50.0)]);
    }

    #[test]
    fn dose_past_horizon_is_rejected() {
        let yaml = "name: x\ninitial_glucose: 100\nhorizon_minutes: 10\ninsulin:\n  - { minute: 10, amount: 1 }\n";
        let err = Scenario::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::Validation { ref field, .. } if field == "insulin"));
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let mut s = Scenario::fasting(200.0, 100);
        s.schema_version = 99;
        assert!(s.validate().is_err());
    }

    #[test]
    fn reference_day_runs() {
        let out = Scenario::reference_day().run(&Config::default()).unwrap();
        assert_eq!(out.glucose.len(), 1440);
        assert_eq!(out.glucose[0], 370.0);
        assert!((out.total_insulin_units - 7.3).abs() < 1e-9);
        assert!(out.glucose.iter().all(|g| g.is_finite()));
    }
}
