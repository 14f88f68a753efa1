//! `locus sim`: deterministic simulation campaign commands.
//!
//! `locus sim run` executes a campaign across many seeds.
//! `locus sim replay` replays a single seed with detailed trace output.

use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use locus_sim::campaign::{CampaignConfig, replay_seed, run_campaign};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section};

/// Top-level arguments for `locus sim`.
#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

/// Simulation subcommands.
#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Race one client reconciler against a server with slow, reordered fetch\n\
                      responses, partial batches, failures, and remote writers with skewed\n\
                      clocks. Reports pass/fail per seed and the first failure for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    locus sim run --seeds 100\n\n\
                      # Harsher faults and more writers\n    locus sim run --seeds 200 --writers 4 --faults 0.4\n\n\
                      # Machine-readable output\n    locus sim run --seeds 100 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay a specific seed to get its execution trace, statistics, and\n\
                      invariant violations. Use after a campaign failure to debug.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    locus sim replay --seed 42\n\n\
                      # Print every trace event\n    locus sim replay --seed 42 --trace"
    )]
    Replay(SimReplayArgs),
}

/// Parameters shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
pub struct SimParams {
    /// Number of simulation rounds per seed.
    #[arg(long, default_value = "32")]
    pub rounds: u64,

    /// Number of remote writers editing the server directly.
    #[arg(long, default_value = "2")]
    pub writers: usize,

    /// Overall fault probability (scales reorder, failure, partial batch,
    /// and freeze rates). Value between 0.0 and 1.0.
    #[arg(long, default_value = "0.1")]
    pub faults: f64,

    /// Maximum fetch response delay in rounds.
    #[arg(long, default_value = "3")]
    pub max_delay: u8,

    /// Maximum absolute clock skew in milliseconds.
    #[arg(long, default_value = "250")]
    pub max_skew: i64,
}

/// Arguments for `locus sim run`.
#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub params: SimParams,
}

/// Arguments for `locus sim replay`.
#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    /// Include every trace event in the output.
    #[arg(long)]
    pub trace: bool,

    #[command(flatten)]
    pub params: SimParams,
}

/// JSON output for `locus sim run`.
#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    stale_discards: usize,
    all_passed: bool,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

/// JSON output for `locus sim replay`.
#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    trace_events: usize,
    stats: locus_sim::SimulationStats,
    nodes: usize,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<Vec<locus_sim::TraceEvent>>,
}

fn build_campaign_config(seed_start: u64, seeds: u64, params: &SimParams) -> CampaignConfig {
    let faults = params.faults;
    CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        rounds: params.rounds,
        remote_writers: params.writers,
        fault_max_delay: params.max_delay,
        fault_reorder_percent: scale_fault(faults, 100),
        fault_failure_percent: scale_fault(faults, 100),
        fault_partial_percent: scale_fault(faults, 300),
        fault_freeze_percent: scale_fault(faults, 30),
        max_skew_millis: params.max_skew,
        ..CampaignConfig::default()
    }
}

/// Scale a base fault probability (0.0–1.0) by a weight to get a percent (0–100).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_fault(base: f64, weight_pct: u16) -> u8 {
    let raw = base * f64::from(weight_pct);
    raw.clamp(0.0, 100.0) as u8
}

/// Execute `locus sim run`.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode) -> Result<()> {
    let config = build_campaign_config(args.seed_start, args.seeds, &args.params);
    let report = run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        stale_discards: report.stale_discards,
        all_passed: report.all_passed(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };
    let p = &args.params;

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "campaign seeds_run={} writers={} rounds={} faults_pct={:.0}",
                out.seeds_run,
                p.writers,
                p.rounds,
                p.faults * 100.0
            );
            println!(
                "results passed={} failed={} interesting_states={} stale_discards={} all_passed={}",
                out.seeds_passed,
                out.seeds_failed,
                out.interesting_states_reached,
                out.stale_discards,
                out.all_passed
            );
            for failure in out.failures.iter().take(5) {
                println!(
                    "failure seed={} violations={}",
                    failure.seed,
                    failure.violations.len()
                );
            }
            if let Some(seed) = out.first_failure {
                println!("hint replay_seed={seed} writers={} rounds={}", p.writers, p.rounds);
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Simulation Campaign")?;
            pretty_kv(&mut w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(&mut w, "Writers", p.writers.to_string())?;
            pretty_kv(&mut w, "Rounds", p.rounds.to_string())?;
            pretty_kv(&mut w, "Fault rate", format!("{:.0}%", p.faults * 100.0))?;
            pretty_kv(
                &mut w,
                "Results",
                format!(
                    "{} passed / {} failed ({} interesting states, {} stale discards)",
                    out.seeds_passed,
                    out.seeds_failed,
                    out.interesting_states_reached,
                    out.stale_discards
                ),
            )?;

            match out.first_failure {
                None => pretty_kv(&mut w, "Status", "all seeds passed")?,
                Some(seed) => {
                    pretty_kv(
                        &mut w,
                        "Status",
                        format!("{} failures (first at seed {seed})", out.seeds_failed),
                    )?;
                    println!();
                    pretty_section(&mut w, "Failure Samples")?;
                    for failure in out.failures.iter().take(5) {
                        println!("seed {:<8} violations={}", failure.seed, failure.violations.len());
                        for violation in &failure.violations {
                            println!("  - {violation}");
                        }
                    }
                    if out.failures.len() > 5 {
                        println!("... and {} more failures", out.failures.len() - 5);
                    }
                    println!();
                    pretty_kv(
                        &mut w,
                        "Replay",
                        format!(
                            "locus sim replay --seed {seed} --writers {} --rounds {}",
                            p.writers, p.rounds
                        ),
                    )?;
                }
            }
        }
    }

    // Exit code 1 on any failure for CI integration
    if !report.all_passed() {
        process::exit(1);
    }

    Ok(())
}

/// Execute `locus sim replay`.
pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode) -> Result<()> {
    let config = build_campaign_config(args.seed, 1, &args.params);
    let result = replay_seed(args.seed, &config)?;

    let out = ReplayOutput {
        seed: args.seed,
        trace_events: result.trace.len(),
        stats: result.stats,
        nodes: result.tree.store().len(),
        oracle_passed: result.oracle.passed,
        violations: result
            .oracle
            .violations
            .iter()
            .map(ToString::to_string)
            .collect(),
        interesting_state_reached: result.interesting_state_reached,
        trace: args.trace.then(|| result.trace.clone()),
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            let s = &out.stats;
            println!(
                "replay seed={} writers={} rounds={}",
                out.seed, args.params.writers, args.params.rounds
            );
            println!(
                "result oracle_passed={} trace_events={} nodes={} interesting_state_reached={}",
                out.oracle_passed, out.trace_events, out.nodes, out.interesting_state_reached
            );
            println!(
                "stats local_edits={} rejected_moves={} remote_writes={} fetches={} fetch_failures={} partial_batches={} stale_discards={} reorders={}",
                s.local_edits,
                s.rejected_moves,
                s.remote_writes,
                s.fetches,
                s.fetch_failures,
                s.partial_batches,
                s.stale_discards,
                s.reorders
            );
            for violation in &out.violations {
                println!("violation={violation}");
            }
            for event in out.trace.iter().flatten() {
                println!("{}", serde_json::to_string(event)?);
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            let s = &out.stats;
            pretty_section(&mut w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(&mut w, "Writers", args.params.writers.to_string())?;
            pretty_kv(&mut w, "Rounds", args.params.rounds.to_string())?;
            pretty_kv(&mut w, "Trace events", out.trace_events.to_string())?;
            pretty_kv(&mut w, "Local edits", s.local_edits.to_string())?;
            pretty_kv(&mut w, "Remote writes", s.remote_writes.to_string())?;
            pretty_kv(
                &mut w,
                "Fetches",
                format!(
                    "{} ({} failed, {} partial batches)",
                    s.fetches, s.fetch_failures, s.partial_batches
                ),
            )?;
            pretty_kv(&mut w, "Stale", s.stale_discards.to_string())?;
            pretty_kv(&mut w, "Reorders", s.reorders.to_string())?;
            pretty_kv(&mut w, "Nodes", out.nodes.to_string())?;
            pretty_kv(&mut w, "Oracle", out.oracle_passed.to_string())?;

            if !out.oracle_passed {
                println!();
                pretty_section(&mut w, "Invariant Violations")?;
                for violation in &out.violations {
                    println!("- {violation}");
                }
            }

            if let Some(trace) = &out.trace {
                println!();
                pretty_section(&mut w, "Trace")?;
                for event in trace {
                    println!("{:>4}  {}", event.round, serde_json::to_string(&event.kind)?);
                }
            }
        }
    }

    if !result.oracle.passed {
        process::exit(1);
    }

    Ok(())
}

/// Dispatch `locus sim` subcommands.
pub fn run_sim(args: &SimArgs, output: OutputMode) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, output),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(faults: f64) -> SimParams {
        SimParams {
            rounds: 16,
            writers: 1,
            faults,
            max_delay: 2,
            max_skew: 0,
        }
    }

    #[test]
    fn scale_fault_clamps() {
        assert_eq!(scale_fault(0.1, 100), 10);
        assert_eq!(scale_fault(0.5, 300), 100);
        assert_eq!(scale_fault(-1.0, 100), 0);
    }

    #[test]
    fn campaign_config_carries_params() {
        let config = build_campaign_config(10, 5, &params(0.2));
        assert_eq!(config.seed_range, 10..15);
        assert_eq!(config.rounds, 16);
        assert_eq!(config.remote_writers, 1);
        assert_eq!(config.fault_failure_percent, 20);
        assert_eq!(config.fault_partial_percent, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_faults_campaign_passes() {
        let config = build_campaign_config(0, 10, &params(0.0));
        let report = run_campaign(&config).expect("campaign");
        assert!(report.all_passed(), "{:?}", report.failures.first());
    }
}
