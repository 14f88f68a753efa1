#![forbid(unsafe_code)]

use anyhow::Result;
use locus_sim::{SimulationConfig, Simulator};

fn main() -> Result<()> {
    let result = Simulator::new(SimulationConfig::default())?.run()?;

    println!(
        "simulation complete: trace_events={} passed={} stale_discards={} interesting={}",
        result.trace.len(),
        result.oracle.passed,
        result.stats.stale_discards,
        result.interesting_state_reached
    );

    Ok(())
}
