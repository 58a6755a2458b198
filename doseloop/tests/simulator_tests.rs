// tests/simulator_tests.rs
//
// Simulator behaviour through the public API: superposition of doses,
// causality of folding, renal-only relaxation and range checks.

use doseloop::config::{KernelConfig, SimConfig};
use doseloop::error::SimError;
use doseloop::kernel::AbsorptionKernel;
use doseloop::simulator::{DoseKind, Simulator};

fn sim_with(initial_glucose: f64, horizon: usize) -> Simulator {
    let cfg = SimConfig {
        initial_glucose,
        ..SimConfig::default()
    };
    Simulator::new(cfg, KernelConfig::default(), horizon).expect("valid simulator")
}

#[test]
fn split_insulin_dose_equals_combined_dose() {
    let mut split = sim_with(250.0, 2000);
    let mut whole = sim_with(250.0, 2000);
    split.dose_insulin(120, 0.3).unwrap();
    split.dose_insulin(120, 0.45).unwrap();
    whole.dose_insulin(120, 0.75).unwrap();

    for (a, b) in split.active_insulin().iter().zip(whole.active_insulin()) {
        assert!((a - b).abs() < 1e-12, "{a} vs {b}");
    }
    assert_eq!(split.insulin_doses().len(), 2);
    assert_eq!(whole.insulin_doses().len(), 1);
}

#[test]
fn split_food_dose_equals_combined_dose() {
    let mut split = sim_with(120.0, 1000);
    let mut whole = sim_with(120.0, 1000);
    split.dose_food(60, 40.0).unwrap();
    split.dose_food(60, 90.0).unwrap();
    whole.dose_food(60, 130.0).unwrap();

    for t in 0..1000 {
        split.step(t).unwrap();
        whole.step(t).unwrap();
    }
    for (a, b) in split.glucose().iter().zip(whole.glucose()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert!(split.food_doses().iter().all(|d| d.kind == DoseKind::Food));
}

#[test]
fn active_insulin_is_scaled_kernel() {
    let mut s = sim_with(250.0, 1500);
    s.dose_insulin(100, 2.0).unwrap();
    let k = AbsorptionKernel::insulin();
    for t in [0usize, 99, 100, 150, 299, 700, 1499] {
        let expected = 2.0 * k.eval(t as f64 - 100.0);
        assert!((s.active_insulin()[t] - expected).abs() < 1e-15);
    }
}

#[test]
fn fasting_from_370_relaxes_monotonically_towards_renal_threshold() {
    let mut s = sim_with(370.0, 10_000);
    for t in 0..10_000 {
        s.step(t).unwrap();
    }
    let g = s.glucose();
    for w in g.windows(2) {
        assert!(w[1] <= w[0], "glucose rose: {} -> {}", w[0], w[1]);
    }
    assert!(g.iter().all(|&v| v >= 180.0 && v.is_finite()));
    assert!(g[9_999] < 370.0);
    // Exponential approach: excess shrinks by (1 - 1e-4) per minute.
    let expected = 180.0 + 190.0 * (1.0 - 1e-4f64).powi(9_999);
    assert!((g[9_999] - expected).abs() < 1e-6);
}

#[test]
fn fasting_below_renal_threshold_is_flat() {
    let mut s = sim_with(150.0, 5_000);
    for t in 0..5_000 {
        s.step(t).unwrap();
    }
    assert!(s.glucose().iter().all(|&v| v == 150.0));
    assert!(s.glucose_rate().iter().all(|&r| r == 0.0));
}

#[test]
fn out_of_range_access_fails_fast() {
    let mut s = sim_with(250.0, 400);
    assert_eq!(
        s.step(400),
        Err(SimError::IndexOutOfRange {
            index: 400,
            horizon: 400
        })
    );
    assert!(s.food_on_board(100).is_err());
    assert!(s.food_on_board(99).is_ok());
    assert!(s.glucose_at(400).is_err());
}
