// src/rl/ensemble.rs
//
// Independent training runs in parallel.
//
// Run `i` trains a private policy table with seed `base_seed + i`. Runs are
// dealt to worker threads round-robin; results are put back in run order
// before the per-run tables are merged (parallel Welford combination), so the
// report is identical for any thread count.

use serde::{Deserialize, Serialize};

use super::policy::{PolicyTable, StateSummary};
use super::trainer::{EpisodeSummary, Trainer};
use crate::config::Config;
use crate::error::Result;
use crate::logging::NoopSink;
use crate::metrics::OnlineStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_index: u64,
    pub seed: u64,
    pub episodes: Vec<EpisodeSummary>,
    /// Mean reward of the last episode.
    pub final_mean_reward: f64,
    /// Time in range of the last episode.
    pub final_time_in_range: f64,
    pub visited_states: usize,
}

pub struct EnsembleReport {
    pub runs: Vec<RunResult>,
    pub merged: PolicyTable,
}

/// Serializable view of an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummary {
    pub runs: u64,
    pub base_seed: u64,
    pub final_mean_reward_mean: f64,
    pub final_mean_reward_std: f64,
    pub final_time_in_range_mean: f64,
    pub final_time_in_range_std: f64,
    pub per_run: Vec<RunResult>,
    pub policy: Vec<StateSummary>,
}

impl EnsembleReport {
    pub fn summary(&self, base_seed: u64) -> EnsembleSummary {
        let mut reward = OnlineStats::default();
        let mut tir = OnlineStats::default();
        for r in &self.runs {
            reward.add(r.final_mean_reward);
            tir.add(r.final_time_in_range);
        }
        EnsembleSummary {
            runs: self.runs.len() as u64,
            base_seed,
            final_mean_reward_mean: reward.mean(),
            final_mean_reward_std: reward.stddev(),
            final_time_in_range_mean: tir.mean(),
            final_time_in_range_std: tir.stddev(),
            per_run: self.runs.clone(),
            policy: self.merged.summary(),
        }
    }
}

fn run_one(cfg: &Config, run_index: u64, base_seed: u64) -> Result<(RunResult, PolicyTable)> {
    let seed = base_seed.wrapping_add(run_index);
    let mut run_cfg = cfg.clone();
    run_cfg.training.seed = seed;

    let mut trainer = Trainer::new(&run_cfg, NoopSink)?;
    let episodes = trainer.run()?;
    let policy = trainer.into_policy();

    let last = episodes.last();
    let result = RunResult {
        run_index,
        seed,
        final_mean_reward: last.map_or(0.0, |e| e.mean_reward),
        final_time_in_range: last.map_or(0.0, |e| e.glycemic.time_in_range),
        visited_states: policy.visited_states().len(),
        episodes,
    };
    Ok((result, policy))
}

/// Train `runs` independent policies on up to `threads` workers.
pub fn run_ensemble(
    cfg: &Config,
    runs: u64,
    base_seed: u64,
    threads: usize,
) -> Result<EnsembleReport> {
    cfg.validate()?;
    let threads = threads.max(1).min(runs.max(1) as usize);
    tracing::info!(runs, base_seed, threads, "starting ensemble");

    let mut results: Vec<(RunResult, PolicyTable)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|worker| {
                scope.spawn(move || {
                    (worker as u64..runs)
                        .step_by(threads)
                        .map(|i| run_one(cfg, i, base_seed))
                        .collect::<Result<Vec<_>>>()
                })
            })
            .collect();

        let mut all = Vec::with_capacity(runs as usize);
        for h in handles {
            let batch = h
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
            all.extend(batch);
        }
        Ok::<_, crate::error::Error>(all)
    })?;

    results.sort_by_key(|(r, _)| r.run_index);

    let mut merged = PolicyTable::from_config(&cfg.policy)?;
    let mut out = Vec::with_capacity(results.len());
    for (result, policy) in results {
        merged.merge_from(&policy)?;
        tracing::debug!(
            run = result.run_index,
            seed = result.seed,
            final_mean_reward = result.final_mean_reward,
            "run merged"
        );
        out.push(result);
    }

    Ok(EnsembleReport { runs: out, merged })
}
