// src/trend.rs
//
// Glucose trend helpers: least-squares slope, a time-bounded rolling window
// with moving average / projection, and a projection guard that raises
// low/high alerts with a per-channel cooldown.
//
// Time is measured in simulated minutes so the same code serves the
// simulator (regression-based rate) and offline CGM traces.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Denominators below this are treated as degenerate.
const SLOPE_EPS: f64 = 1e-9;

/// Ordinary least squares slope dy/dx for `(x, y)` points.
///
/// Returns 0.0 for fewer than two points or a degenerate x spread.
pub fn linear_regression_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    let (mut sum_x, mut sum_y, mut sum_xx, mut sum_xy) = (0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let n = n as f64;
    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < SLOPE_EPS {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Slope of a uniformly sampled series (x = 0, 1, 2, ... times `dx`).
pub fn series_slope(values: &[f64], dx: f64) -> f64 {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, &y)| (i as f64 * dx, y))
        .collect();
    linear_regression_slope(&points)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub minute: f64,
    pub mgdl: f64,
}

/// Readings from the last `window_minutes` (relative to the newest reading).
#[derive(Debug, Clone)]
pub struct RollingWindow {
    window_minutes: f64,
    buf: VecDeque<Reading>,
}

impl RollingWindow {
    pub fn new(window_minutes: f64) -> Self {
        Self {
            window_minutes,
            buf: VecDeque::new(),
        }
    }

    pub fn add(&mut self, reading: Reading) {
        self.buf.push_back(reading);
        self.trim();
    }

    fn trim(&mut self) {
        let Some(newest) = self.buf.back() else {
            return;
        };
        let cutoff = newest.minute - self.window_minutes;
        while self.buf.front().is_some_and(|r| r.minute < cutoff) {
            self.buf.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn latest(&self) -> Option<Reading> {
        self.buf.back().copied()
    }

    pub fn moving_average(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.buf.iter().map(|r| r.mgdl).sum::<f64>() / self.buf.len() as f64)
    }

    /// mg/dL per minute; x axis is relative to the newest reading.
    pub fn slope_per_minute(&self) -> f64 {
        let Some(latest) = self.latest() else {
            return 0.0;
        };
        let points: Vec<(f64, f64)> = self
            .buf
            .iter()
            .map(|r| (r.minute - latest.minute, r.mgdl))
            .collect();
        linear_regression_slope(&points)
    }

    /// Moving average extrapolated `minutes` ahead along the window slope.
    pub fn project(&self, minutes: f64) -> Option<f64> {
        self.moving_average()
            .map(|avg| avg + self.slope_per_minute() * minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    ProjectedLow,
    ProjectedHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionAlert {
    pub kind: AlertKind,
    pub minute: f64,
    pub projected_mgdl: f64,
    pub horizon_minutes: f64,
    pub slope_per_minute: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionGuardConfig {
    pub window_minutes: f64,
    pub low_threshold: f64,
    pub low_horizon_minutes: f64,
    pub high_threshold: f64,
    pub high_horizon_minutes: f64,
    pub cooldown_minutes: f64,
}

impl Default for ProjectionGuardConfig {
    fn default() -> Self {
        Self {
            window_minutes: 20.0,
            low_threshold: 100.0,
            low_horizon_minutes: 60.0,
            high_threshold: 250.0,
            high_horizon_minutes: 30.0,
            cooldown_minutes: 10.0,
        }
    }
}

/// Feeds readings into a rolling window and fires projection alerts.
///
/// Low and high channels have independent cooldowns.
#[derive(Debug, Clone)]
pub struct ProjectionGuard {
    cfg: ProjectionGuardConfig,
    window: RollingWindow,
    last_low: Option<f64>,
    last_high: Option<f64>,
}

impl ProjectionGuard {
    pub fn new(cfg: ProjectionGuardConfig) -> Self {
        let window = RollingWindow::new(cfg.window_minutes);
        Self {
            cfg,
            window,
            last_low: None,
            last_high: None,
        }
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    fn can_fire(&self, last: Option<f64>, now: f64) -> bool {
        last.map_or(true, |t| now - t >= self.cfg.cooldown_minutes)
    }

    /// Add a reading and return any alerts it triggers.
    pub fn observe(&mut self, reading: Reading) -> Vec<ProjectionAlert> {
        self.window.add(reading);
        let now = reading.minute;
        let slope = self.window.slope_per_minute();
        let mut alerts = Vec::new();

        if let Some(proj) = self.window.project(self.cfg.low_horizon_minutes) {
            if proj < self.cfg.low_threshold && self.can_fire(self.last_low, now) {
                self.last_low = Some(now);
                alerts.push(ProjectionAlert {
                    kind: AlertKind::ProjectedLow,
                    minute: now,
                    projected_mgdl: proj,
                    horizon_minutes: self.cfg.low_horizon_minutes,
                    slope_per_minute: slope,
                });
            }
        }

        if let Some(proj) = self.window.project(self.cfg.high_horizon_minutes) {
            if proj > self.cfg.high_threshold && self.can_fire(self.last_high, now) {
                self.last_high = Some(now);
                alerts.push(ProjectionAlert {
                    kind: AlertKind::ProjectedHigh,
                    minute: now,
                    projected_mgdl: proj,
                    horizon_minutes: self.cfg.high_horizon_minutes,
                    slope_per_minute: slope,
                });
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_of_a_line() {
        let pts: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 3.0 - 2.0 * i as f64)).collect();
        assert!((linear_regression_slope(&pts) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs_give_zero_slope() {
        assert_eq!(linear_regression_slope(&[]), 0.0);
        assert_eq!(linear_regression_slope(&[(1.0, 5.0)]), 0.0);
        // All x equal: vertical spread only.
        assert_eq!(linear_regression_slope(&[(2.0, 1.0), (2.0, 9.0)]), 0.0);
    }

    #[test]
    fn series_slope_scales_with_dx() {
        let ys = [100.0, 102.0, 104.0, 106.0];
        assert!((series_slope(&ys, 1.0) - 2.0).abs() < 1e-12);
        assert!((series_slope(&ys, 5.0) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn window_trims_old_readings() {
        let mut w = RollingWindow::new(20.0);
        for m in 0..=30 {
            w.add(Reading {
                minute: m as f64,
                mgdl: 100.0,
            });
        }
        // Keeps minutes 10..=30.
        assert_eq!(w.len(), 21);
        assert_eq!(w.moving_average(), Some(100.0));
        assert_eq!(w.slope_per_minute(), 0.0);
    }

    #[test]
    fn projection_follows_trend() {
        let mut w = RollingWindow::new(20.0);
        for m in 0..5 {
            w.add(Reading {
                minute: m as f64,
                mgdl: 200.0 - m as f64,
            });
        }
        // avg 198, slope -1/min.
        let p = w.project(60.0).unwrap();
        assert!((p - 138.0).abs() < 1e-9);
    }

    #[test]
    fn guard_respects_cooldown() {
        let mut g = ProjectionGuard::new(ProjectionGuardConfig::default());
        let mut fired = Vec::new();
        for m in 0..30 {
            let r = Reading {
                minute: m as f64,
                mgdl: 130.0 - 2.0 * m as f64,
            };
            for a in g.observe(r) {
                fired.push(a);
            }
        }
        let lows: Vec<_> = fired
            .iter()
            .filter(|a| a.kind == AlertKind::ProjectedLow)
            .collect();
        assert!(!lows.is_empty());
        for pair in lows.windows(2) {
            assert!(pair[1].minute - pair[0].minute >= 10.0);
        }
        assert!(fired.iter().all(|a| a.kind != AlertKind::ProjectedHigh));
    }
}
