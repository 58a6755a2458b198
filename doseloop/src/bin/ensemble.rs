// src/bin/ensemble.rs
//
// Ensemble harness: independent training runs on worker threads.
//
// - Run i trains a private policy with seed + i.
// - Output is identical for any --threads value.
// - Writes ensemble_summary.json (aggregate + merged policy) and
//   ensemble_runs.jsonl (one line per run) into --out-dir.
//
// Run examples:
//   cargo run --release --bin ensemble -- --runs 16 --threads 4 --seed 7 --out-dir runs/
//   DOSELOOP_PROFILE=cautious cargo run --bin ensemble -- --runs 4 --episodes 5 --quiet

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use doseloop::config::{resolve_effective_profile, Config, DosingProfile};
use doseloop::logging::init_tracing;
use doseloop::rl::run_ensemble;

#[derive(Debug, Parser)]
#[command(
    name = "ensemble",
    about = "Train independent dosing policies in parallel and merge them",
    version
)]
struct Args {
    /// YAML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dosing profile (cautious | balanced | aggressive).
    #[arg(long, value_enum)]
    profile: Option<DosingProfile>,

    /// Number of independent runs.
    #[arg(long, default_value_t = 8)]
    runs: u64,

    /// Base seed; run i uses seed + i.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Worker threads.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Episodes per run.
    #[arg(long)]
    episodes: Option<u64>,

    /// Minutes per episode.
    #[arg(long)]
    minutes: Option<usize>,

    /// Output directory for summary files.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Only print the aggregate line.
    #[arg(long)]
    quiet: bool,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose > 0);

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let effective = resolve_effective_profile(args.profile);
    effective.log_startup();
    cfg.apply_profile(effective.profile);
    cfg.apply_env_overrides();
    if let Some(n) = args.episodes {
        cfg.training.episodes = n;
    }
    if let Some(m) = args.minutes {
        cfg.training.episode_minutes = m;
    }
    cfg.validate().context("invalid configuration")?;

    let report = run_ensemble(&cfg, args.runs, args.seed, args.threads)?;
    let summary = report.summary(args.seed);

    if !args.quiet {
        for r in &summary.per_run {
            println!(
                "run {:>4} | seed={} | final_mean_reward={:>10.4} | tir={:>5.1}% | states={}",
                r.run_index,
                r.seed,
                r.final_mean_reward,
                100.0 * r.final_time_in_range,
                r.visited_states,
            );
        }
    }
    println!(
        "ensemble | runs={} | profile={} | reward={:.4}±{:.4} | tir={:.1}%±{:.1}% | merged_states={}",
        summary.runs,
        effective.profile.as_str(),
        summary.final_mean_reward_mean,
        summary.final_mean_reward_std,
        100.0 * summary.final_time_in_range_mean,
        100.0 * summary.final_time_in_range_std,
        summary.policy.len(),
    );

    if let Some(dir) = &args.out_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        let summary_path = dir.join("ensemble_summary.json");
        fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", summary_path.display()))?;

        let runs_path = dir.join("ensemble_runs.jsonl");
        let mut w = BufWriter::new(
            File::create(&runs_path)
                .with_context(|| format!("creating {}", runs_path.display()))?,
        );
        for r in &summary.per_run {
            writeln!(w, "{}", serde_json::to_string(r)?)?;
        }
        w.flush()?;
    }

    Ok(())
}
