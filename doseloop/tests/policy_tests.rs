// tests/policy_tests.rs
//
// Bandit policy table: weighted Welford against closed-form statistics,
// skip threshold, UCB exploration order and summaries.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use doseloop::binning::StateKey;
use doseloop::config::{PolicyConfig, SelectorKind};
use doseloop::rl::{ArmStatistic, PolicyTable};

fn weighted_batch(samples: &[(f64, f64)]) -> (f64, f64, f64) {
    let w: f64 = samples.iter().map(|(_, w)| w).sum();
    let mean = samples.iter().map(|(x, w)| x * w).sum::<f64>() / w;
    let m2 = samples
        .iter()
        .map(|(x, w)| w * (x - mean).powi(2))
        .sum::<f64>();
    (w, mean, m2)
}

#[test]
fn weighted_welford_matches_batch() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..20 {
        let samples: Vec<(f64, f64)> = (0..200)
            .map(|_| (rng.gen_range(-50.0..5.0), rng.gen_range(1e-3..2.0)))
            .collect();
        let mut stat = ArmStatistic::default();
        for &(x, w) in &samples {
            stat.update(w, x);
        }
        let (w, mean, m2) = weighted_batch(&samples);
        assert!((stat.n - w).abs() < 1e-9);
        assert!((stat.mean - mean).abs() < 1e-9);
        assert!((stat.m2 - m2).abs() / m2.max(1.0) < 1e-9);
        assert!((stat.variance() - m2 / w).abs() < 1e-6);
        assert_eq!(stat.visits, 200);
    }
}

#[test]
fn below_threshold_updates_leave_statistics_untouched() {
    let mut table = PolicyTable::from_config(&PolicyConfig::default()).unwrap();
    let key = StateKey::from_readings(180.0, 0.0, 0.0, 0.0);
    table.update_reward(&key, 3, 0.8, -4.0).unwrap();
    let before = *table.stat(&key, 3).unwrap();
    for w in [0.0, 1e-6, 9.9e-5] {
        assert_eq!(table.update_reward(&key, 3, w, 1e6), Ok(false));
    }
    assert_eq!(*table.stat(&key, 3).unwrap(), before);
}

#[test]
fn zero_count_arm_has_zero_variance() {
    assert_eq!(ArmStatistic::default().variance(), 0.0);
}

#[test]
fn fresh_row_visits_every_candidate_once_in_order() {
    let cfg = PolicyConfig::default();
    let mut table = PolicyTable::from_config(&cfg).unwrap();
    let key = StateKey::from_readings(250.0, 1.0, 0.001, 3.0);
    let k = cfg.candidate_doses.len();

    let mut picks = Vec::new();
    for _ in 0..k {
        let choice = table.choose(&key);
        picks.push(choice.arm);
        table.update_reward(&key, choice.arm, 1.0, -1.0).unwrap();
    }
    assert_eq!(picks, (0..k).collect::<Vec<_>>());
}

#[test]
fn ucb_prefers_better_mean_at_equal_weight() {
    let mut table = PolicyTable::from_config(&PolicyConfig::default()).unwrap();
    let key = StateKey::from_readings(250.0, 0.0, 0.0, 0.0);
    for arm in 0..6 {
        let reward = if arm == 4 { -0.5 } else { -5.0 };
        table.update_reward(&key, arm, 2.0, reward).unwrap();
    }
    assert_eq!(table.choose(&key).arm, 4);
    assert_eq!(table.choose(&key).dose, 0.5);
}

#[test]
fn round_robin_selector_from_config() {
    let cfg = PolicyConfig {
        candidate_doses: vec![0.0, 0.1, 0.2],
        selector: SelectorKind::RoundRobin,
        min_trials: 3,
        ..PolicyConfig::default()
    };
    let mut table = PolicyTable::from_config(&cfg).unwrap();
    assert_eq!(table.selector_name(), "round_robin");
    let key = StateKey::from_readings(100.0, 0.0, 0.0, 0.0);
    let mut counts = [0u32; 3];
    for _ in 0..9 {
        let arm = table.choose(&key).arm;
        counts[arm] += 1;
        let reward = [-3.0, -1.0, -2.0][arm];
        table.update_reward(&key, arm, 0.5, reward).unwrap();
    }
    assert_eq!(counts, [3, 3, 3]);
    assert_eq!(table.choose(&key).arm, 1);
}

#[test]
fn summary_is_sorted_and_reports_best_arm() {
    let mut table = PolicyTable::from_config(&PolicyConfig::default()).unwrap();
    let high = StateKey::from_readings(320.0, 0.0, 0.0, 0.0);
    let low = StateKey::from_readings(70.0, 0.0, 0.0, 0.0);
    table.update_reward(&high, 5, 1.0, -1.0).unwrap();
    table.update_reward(&high, 0, 1.0, -9.0).unwrap();
    table.update_reward(&low, 0, 0.5, -2.0).unwrap();

    let summary = table.summary();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].state, low);
    assert_eq!(summary[1].state, high);
    assert_eq!(summary[1].best_arm, Some(5));
    assert_eq!(summary[1].best_dose, Some(1.0));
    assert_eq!(summary[1].mean_reward, Some(-1.0));
    assert_eq!(summary[1].visits, 2);
    assert!((summary[1].total_weight - 2.0).abs() < 1e-12);
}

#[test]
fn merged_tables_equal_single_table() {
    let cfg = PolicyConfig::default();
    let mut all = PolicyTable::from_config(&cfg).unwrap();
    let mut left = PolicyTable::from_config(&cfg).unwrap();
    let mut right = PolicyTable::from_config(&cfg).unwrap();
    let key = StateKey::from_readings(210.0, -1.0, 0.004, 0.0);

    let mut rng = ChaCha8Rng::seed_from_u64(5);
    for i in 0..100 {
        let arm = rng.gen_range(0..6);
        let w = rng.gen_range(0.01..1.0);
        let r = rng.gen_range(-10.0..0.0);
        all.update_reward(&key, arm, w, r).unwrap();
        let half = if i % 2 == 0 { &mut left } else { &mut right };
        half.update_reward(&key, arm, w, r).unwrap();
    }
    left.merge_from(&right).unwrap();
    for arm in 0..6 {
        let a = all.stat(&key, arm).copied().unwrap_or_default();
        let b = left.stat(&key, arm).copied().unwrap_or_default();
        assert!((a.n - b.n).abs() < 1e-9);
        assert!((a.mean - b.mean).abs() < 1e-9);
        assert!((a.m2 - b.m2).abs() < 1e-6);
        assert_eq!(a.visits, b.visits);
    }
}
