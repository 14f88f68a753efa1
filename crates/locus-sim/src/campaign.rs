//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same parameters, collecting pass/fail
//! results and identifying the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::clock::ClockConfig;
use crate::network::FaultConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the simulation
/// parameters shared by every seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub rounds: u64,
    pub remote_writers: usize,
    pub initial_nodes: usize,
    pub edit_percent: u8,
    pub fetch_percent: u8,
    /// Maximum delivery delay in rounds.
    pub fault_max_delay: u8,
    pub fault_reorder_percent: u8,
    pub fault_failure_percent: u8,
    pub fault_partial_percent: u8,
    pub fault_remote_percent: u8,
    pub fault_freeze_percent: u8,
    pub fault_freeze_duration: u8,
    /// Maximum absolute clock skew for the client and remote writers.
    pub max_skew_millis: i64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            rounds: sim.rounds,
            remote_writers: sim.remote_writers,
            initial_nodes: sim.initial_nodes,
            edit_percent: sim.edit_percent,
            fetch_percent: sim.fetch_percent,
            fault_max_delay: sim.fault.max_delay_rounds,
            fault_reorder_percent: sim.fault.reorder_rate_percent,
            fault_failure_percent: sim.fault.fetch_failure_percent,
            fault_partial_percent: sim.fault.partial_batch_percent,
            fault_remote_percent: sim.fault.remote_edit_percent,
            fault_freeze_percent: sim.fault.freeze_rate_percent,
            fault_freeze_duration: sim.fault.freeze_duration_rounds,
            max_skew_millis: sim.clock.max_abs_skew_millis,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: self.rounds,
            remote_writers: self.remote_writers,
            initial_nodes: self.initial_nodes,
            edit_percent: self.edit_percent,
            fetch_percent: self.fetch_percent,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                reorder_rate_percent: self.fault_reorder_percent,
                fetch_failure_percent: self.fault_failure_percent,
                partial_batch_percent: self.fault_partial_percent,
                remote_edit_percent: self.fault_remote_percent,
                freeze_rate_percent: self.fault_freeze_percent,
                freeze_duration_rounds: self.fault_freeze_duration,
            },
            clock: ClockConfig {
                max_abs_skew_millis: self.max_skew_millis,
                ..ClockConfig::default()
            },
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.max_skew_millis < 0 {
            bail!("max_skew_millis must be >= 0");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds where a delayed fetch response lost a race to a local edit.
    pub interesting_states_reached: usize,
    /// Stale snapshot nodes discarded across all seeds.
    pub stale_discards: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
        stale_discards: 0,
    };

    for seed in config.seed_range.clone() {
        let result = replay_seed(seed, config)?;
        report.seeds_run += 1;
        report.stale_discards += result.stats.stale_discards;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if result.oracle.passed {
            report.seeds_passed += 1;
        } else {
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: result.oracle.violations.iter().map(ToString::to_string).collect(),
            });
        }
    }

    Ok(report)
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    Simulator::new(config.sim_config_for_seed(seed))?.run()
}
