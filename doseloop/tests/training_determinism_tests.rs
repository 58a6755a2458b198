// tests/training_determinism_tests.rs
//
// Training and ensembles are deterministic:
// 1. The same config + seed gives identical episode summaries and policies.
// 2. Different seeds give different randomised episodes.
// 3. Ensemble output does not depend on the worker thread count.
// 4. JSONL telemetry from two identical runs is byte-identical.

use doseloop::config::Config;
use doseloop::logging::{FileSink, MemorySink, NoopSink};
use doseloop::rl::{run_ensemble, Trainer};

fn short_config() -> Config {
    let mut cfg = Config::default();
    cfg.training.episodes = 3;
    cfg.training.episode_minutes = 1440;
    cfg.training.seed = 42;
    cfg
}

#[test]
fn same_seed_same_training() {
    let cfg = short_config();
    let mut a = Trainer::new(&cfg, NoopSink).unwrap();
    let mut b = Trainer::new(&cfg, NoopSink).unwrap();
    let sa = a.run().unwrap();
    let sb = b.run().unwrap();
    assert_eq!(sa, sb);
    assert_eq!(a.policy().summary(), b.policy().summary());
}

#[test]
fn different_seeds_randomise_episodes() {
    let cfg = short_config();
    let mut other = cfg.clone();
    other.training.seed = 43;
    let a = Trainer::new(&cfg, NoopSink).unwrap().run().unwrap();
    let b = Trainer::new(&other, NoopSink).unwrap().run().unwrap();
    assert_ne!(a[0].initial_glucose, b[0].initial_glucose);
}

#[test]
fn policy_table_persists_across_episodes() {
    let cfg = short_config();
    let mut trainer = Trainer::new(&cfg, MemorySink::default()).unwrap();
    let summaries = trainer.run().unwrap();
    let states: Vec<usize> = summaries.iter().map(|s| s.visited_states).collect();
    for w in states.windows(2) {
        assert!(w[1] >= w[0]);
    }
    let markers = trainer.sink().markers().count();
    assert_eq!(markers, 6);
}

#[test]
fn ensemble_is_thread_count_invariant() {
    let mut cfg = short_config();
    cfg.training.episodes = 1;
    let one = run_ensemble(&cfg, 5, 3, 1).unwrap();
    let four = run_ensemble(&cfg, 5, 3, 4).unwrap();
    assert_eq!(one.summary(3), four.summary(3));
}

#[test]
fn telemetry_files_are_identical_for_identical_runs() {
    let cfg = short_config();
    let dir = tempfile::tempdir().unwrap();
    let paths = [dir.path().join("a.jsonl"), dir.path().join("b.jsonl")];
    for p in &paths {
        let sink = FileSink::create(p).unwrap();
        let mut trainer = Trainer::new(&cfg, sink).unwrap();
        trainer.run().unwrap();
    }
    let a = std::fs::read(&paths[0]).unwrap();
    let b = std::fs::read(&paths[1]).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
}
