//! locus-sim library.
//!
//! Deterministic simulation of one client reconciler racing a server, slow
//! and reordered fetch responses, and remote writers with skewed clocks.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod clock;
pub mod network;
pub mod oracle;
pub mod rng;
pub mod server;
pub mod simulator;
pub mod writer;

pub use simulator::{
    EditAction, SimulationConfig, SimulationResult, SimulationStats, Simulator, TraceEvent,
    TraceEventKind,
};
