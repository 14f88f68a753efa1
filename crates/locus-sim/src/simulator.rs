//! Seeded simulation of one client racing a server and remote writers.
//!
//! Each round: clocks advance, in-flight messages land, a remote writer may
//! edit the server, the client may make a local edit (pushed with a delay)
//! and may start a fetch (answered with a delay, possibly streamed in
//! partial batches or failed). After the last round the network drains and
//! one fault-free full fetch runs before the convergence check.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use locus_core::clock::AnchoredClock;
use locus_core::config::TreeConfig;
use locus_core::event::{Applied, TreeEvent};
use locus_core::model::patch::LocalEdit;
use locus_core::query::validate_move;
use locus_core::reconcile::FetchFailure;
use locus_core::{Node, NodeId, Reconciler, Tree};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{ClockConfig, SimulatedClock};
use crate::network::{FaultConfig, Message, SimulatedNetwork};
use crate::oracle::{ConvergenceOracle, OracleResult};
use crate::rng::DeterministicRng;
use crate::server::ServerState;
use crate::writer::{RemoteWrite, RemoteWriter};

/// Parameters for one seeded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub rounds: u64,
    /// Devices writing to the server besides the simulated client.
    pub remote_writers: usize,
    /// Records on the server before the client's first fetch.
    pub initial_nodes: usize,
    /// Percentage chance per round of a local edit.
    pub edit_percent: u8,
    /// Percentage chance per round of starting a fetch.
    pub fetch_percent: u8,
    pub fault: FaultConfig,
    pub clock: ClockConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 32,
            remote_writers: 2,
            initial_nodes: 4,
            edit_percent: 60,
            fetch_percent: 35,
            fault: FaultConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.initial_nodes < 2 {
            bail!("initial_nodes must be >= 2 so the first fetch replaces the sample data");
        }
        if self.clock.tick_millis <= 0 {
            bail!("clock.tick_millis must be > 0");
        }
        Ok(())
    }
}

/// Kind of local edit the client made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Create,
    Update,
    Move,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEventKind {
    LocalEdit {
        id: NodeId,
        action: EditAction,
        updated_at: i64,
    },
    MoveRejected {
        id: NodeId,
        parent: NodeId,
        reason: String,
    },
    Push {
        id: NodeId,
        delay: u8,
    },
    PushLanded {
        id: NodeId,
        accepted: bool,
    },
    FetchRequested {
        batches: usize,
        failed: bool,
    },
    Merged {
        applied: usize,
        stale: usize,
        partial: bool,
        reset: bool,
    },
    FetchFailed,
    RemoteWrite(RemoteWrite),
    Reordered {
        count: usize,
    },
    ClockFrozen,
    ClockUnfrozen,
    FinalFetch {
        nodes: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub local_edits: usize,
    pub rejected_moves: usize,
    pub remote_writes: usize,
    pub fetches: usize,
    pub fetch_failures: usize,
    pub partial_batches: usize,
    pub stale_discards: usize,
    pub reorders: usize,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    pub tree: Tree,
    pub server: BTreeMap<NodeId, Node>,
    pub stats: SimulationStats,
    pub oracle: OracleResult,
    /// Whether a delayed fetch response actually lost a race to a local edit.
    pub interesting_state_reached: bool,
}

type ClientClock = AnchoredClock<SimulatedClock>;

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    root_id: NodeId,
    client: Reconciler<ClientClock>,
    server: ServerState,
    writers: Vec<RemoteWriter>,
    network: SimulatedNetwork,
    trace: Vec<TraceEvent>,
    stats: SimulationStats,
    oracle: OracleResult,
    next_local_seq: u64,
    frozen_until: Option<u64>,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = DeterministicRng::new(config.seed);
        let tree_config = TreeConfig::default();
        let root_id = NodeId::from(tree_config.root_id.as_str());

        let client_clock = AnchoredClock::new(SimulatedClock::new(config.clock.assign(&mut rng)));
        let client = Reconciler::new(Tree::seeded(&tree_config), client_clock);

        let server = ServerState::seeded(
            &root_id,
            config.initial_nodes,
            SimulatedClock::new(config.clock.reference()),
        );
        let writers = (0..config.remote_writers)
            .map(|id| RemoteWriter::new(id, SimulatedClock::new(config.clock.assign(&mut rng))))
            .collect();

        Ok(Self {
            config,
            rng,
            root_id,
            client,
            server,
            writers,
            network: SimulatedNetwork::new(config.fault),
            trace: Vec::new(),
            stats: SimulationStats::default(),
            oracle: OracleResult::pass(),
            next_local_seq: 0,
            frozen_until: None,
        })
    }

    /// Run every round, drain the network, fetch once more, and check convergence.
    ///
    /// # Errors
    ///
    /// Returns an error if the client rejects an event the simulator built.
    pub fn run(mut self) -> Result<SimulationResult> {
        self.initial_fetch()?;

        for round in 1..=self.config.rounds {
            self.advance_clocks(round);
            self.toggle_freeze(round);
            self.deliver(round)?;
            self.remote_write(round);
            if self.rng.hit_rate_percent(self.config.edit_percent) {
                self.local_edit(round);
            }
            if self.rng.hit_rate_percent(self.config.fetch_percent) {
                self.start_fetch(round);
            }
        }

        let mut round = self.config.rounds;
        if self.client.clock().inner().is_frozen() {
            self.client.clock_mut().inner_mut().unfreeze();
            self.record(round, TraceEventKind::ClockUnfrozen);
        }
        while self.network.pending_len() > 0 {
            round += 1;
            self.advance_clocks(round);
            self.deliver(round)?;
        }

        round += 1;
        self.advance_clocks(round);
        self.final_fetch(round)?;

        let interesting_state_reached = self.stats.stale_discards > 0;
        info!(
            seed = self.config.seed,
            passed = self.oracle.passed,
            stale = self.stats.stale_discards,
            "simulation finished"
        );

        Ok(SimulationResult {
            trace: self.trace,
            tree: self.client.into_tree(),
            server: self.server.nodes().clone(),
            stats: self.stats,
            oracle: self.oracle,
            interesting_state_reached,
        })
    }

    fn record(&mut self, round: u64, kind: TraceEventKind) {
        debug!(round, ?kind, "sim step");
        self.trace.push(TraceEvent { round, kind });
    }

    fn advance_clocks(&mut self, round: u64) {
        self.client.clock_mut().inner_mut().advance_to(round);
        self.server.advance_to(round);
        for writer in &mut self.writers {
            writer.advance_to(round);
        }
    }

    fn toggle_freeze(&mut self, round: u64) {
        match self.frozen_until {
            Some(until) if round >= until => {
                self.client.clock_mut().inner_mut().unfreeze();
                self.frozen_until = None;
                self.record(round, TraceEventKind::ClockUnfrozen);
            }
            Some(_) => {}
            None => {
                if self.rng.hit_rate_percent(self.config.fault.freeze_rate_percent) {
                    self.client.clock_mut().inner_mut().freeze();
                    let duration = u64::from(self.config.fault.freeze_duration_rounds.max(1));
                    self.frozen_until = Some(round.saturating_add(duration));
                    self.record(round, TraceEventKind::ClockFrozen);
                }
            }
        }
    }

    fn initial_fetch(&mut self) -> Result<()> {
        self.client.fetch_started();
        self.stats.fetches += 1;
        let batches = self.server.respond(true, false, &mut self.rng);
        self.record(
            0,
            TraceEventKind::FetchRequested {
                batches: batches.len(),
                failed: false,
            },
        );
        for batch in batches {
            self.apply_response(0, TreeEvent::FetchSuccess(batch))?;
        }
        Ok(())
    }

    fn final_fetch(&mut self, round: u64) -> Result<()> {
        self.client.fetch_started();
        let batches = self.server.respond(false, false, &mut self.rng);
        let nodes = batches.iter().map(|b| b.nodes.len()).sum();
        self.record(round, TraceEventKind::FinalFetch { nodes });
        for batch in batches {
            self.apply_response(round, TreeEvent::FetchSuccess(batch))?;
        }

        let converged = ConvergenceOracle::check_convergence(self.client.tree(), self.server.nodes())
            .merge(ConvergenceOracle::check_settled(self.client.tree()));
        self.oracle = std::mem::take(&mut self.oracle).merge(converged);
        Ok(())
    }

    fn deliver(&mut self, round: u64) -> Result<()> {
        let outcome = self.network.deliver_ready(round, &mut self.rng);
        if outcome.reordered {
            self.stats.reorders += 1;
            self.record(
                round,
                TraceEventKind::Reordered {
                    count: outcome.delivered.len(),
                },
            );
        }
        for message in outcome.delivered {
            match message {
                Message::Push(node) => {
                    let id = node.id.clone();
                    let accepted = self.server.apply(node);
                    self.record(round, TraceEventKind::PushLanded { id, accepted });
                }
                Message::Response(event) => self.apply_response(round, event)?,
            }
        }
        Ok(())
    }

    fn apply_response(&mut self, round: u64, event: TreeEvent) -> Result<()> {
        let before = ConvergenceOracle::timestamps(self.client.tree());
        let partial = matches!(&event, TreeEvent::FetchSuccess(s) if s.partial);

        let reset = match self.client.dispatch(event)? {
            Applied::Merged(outcome) => {
                self.stats.stale_discards += outcome.stale;
                self.record(
                    round,
                    TraceEventKind::Merged {
                        applied: outcome.applied,
                        stale: outcome.stale,
                        partial,
                        reset: outcome.reset,
                    },
                );
                outcome.reset
            }
            Applied::FetchFailed => {
                self.stats.fetch_failures += 1;
                self.record(round, TraceEventKind::FetchFailed);
                false
            }
            _ => false,
        };

        self.check_step(&before, round, reset);
        Ok(())
    }

    fn check_step(&mut self, before: &BTreeMap<NodeId, i64>, round: u64, reset: bool) {
        let step = ConvergenceOracle::check_step(before, self.client.tree(), round, reset);
        self.oracle = std::mem::take(&mut self.oracle).merge(step);
    }

    fn remote_write(&mut self, round: u64) {
        if self.writers.is_empty()
            || !self.rng.hit_rate_percent(self.config.fault.remote_edit_percent)
        {
            return;
        }
        let idx = self.rng.next_index(self.writers.len());
        let write = self.writers[idx].write(&mut self.server, &self.root_id, &mut self.rng);
        self.stats.remote_writes += 1;
        self.record(round, TraceEventKind::RemoteWrite(write));
    }

    fn local_edit(&mut self, round: u64) {
        let ids: Vec<NodeId> = self
            .client
            .tree()
            .store()
            .iter()
            .filter(|n| n.id != self.root_id)
            .map(|n| n.id.clone())
            .collect();

        let roll = self.rng.next_bounded(100);
        let (edit, action) = if ids.is_empty() || roll < 35 {
            let seq = self.next_local_seq;
            self.next_local_seq += 1;
            let parent = self.pick_parent(&ids);
            let edit = LocalEdit::create(format!("c{seq}"), parent, self.rng.next_pos())
                .text(format!("local #{seq}"));
            (edit, EditAction::Create)
        } else if roll < 75 {
            let id = ids[self.rng.next_index(ids.len())].clone();
            let checked = self
                .client
                .tree()
                .node(id.as_str())
                .is_some_and(|n| n.checked);
            let edit = if self.rng.hit_rate_percent(50) {
                LocalEdit::update(id).checked(!checked)
            } else {
                LocalEdit::update(id).text(format!("edited in round {round}"))
            };
            (edit, EditAction::Update)
        } else {
            let id = ids[self.rng.next_index(ids.len())].clone();
            let parent = self.pick_parent(&ids);
            if let Err(err) = validate_move(self.client.tree(), id.as_str(), parent.as_str()) {
                self.stats.rejected_moves += 1;
                self.record(
                    round,
                    TraceEventKind::MoveRejected {
                        id,
                        parent,
                        reason: err.to_string(),
                    },
                );
                return;
            }
            (
                LocalEdit::move_to(id, parent, self.rng.next_pos()),
                EditAction::Move,
            )
        };

        let before = ConvergenceOracle::timestamps(self.client.tree());
        let node = self.client.upsert_node(&edit);
        self.stats.local_edits += 1;
        self.record(
            round,
            TraceEventKind::LocalEdit {
                id: node.id.clone(),
                action,
                updated_at: node.updated_at,
            },
        );
        self.check_step(&before, round, false);

        let id = node.id.clone();
        let delay = self.network.send(Message::Push(node), round, &mut self.rng);
        self.record(round, TraceEventKind::Push { id, delay });
    }

    fn pick_parent(&mut self, ids: &[NodeId]) -> NodeId {
        if ids.is_empty() || self.rng.hit_rate_percent(40) {
            self.root_id.clone()
        } else {
            ids[self.rng.next_index(ids.len())].clone()
        }
    }

    fn start_fetch(&mut self, round: u64) {
        self.client.fetch_started();
        self.stats.fetches += 1;

        if self.rng.hit_rate_percent(self.config.fault.fetch_failure_percent) {
            let failure = TreeEvent::FetchFailure(FetchFailure {
                error: "simulated 503 Service Unavailable".to_string(),
            });
            self.network.send(Message::Response(failure), round, &mut self.rng);
            self.record(
                round,
                TraceEventKind::FetchRequested {
                    batches: 0,
                    failed: true,
                },
            );
            return;
        }

        let split = self.rng.hit_rate_percent(self.config.fault.partial_batch_percent);
        let batches = self.server.respond(false, split, &mut self.rng);
        self.stats.partial_batches += batches.iter().filter(|b| b.partial).count();
        self.record(
            round,
            TraceEventKind::FetchRequested {
                batches: batches.len(),
                failed: false,
            },
        );
        for batch in batches {
            self.network.send(
                Message::Response(TreeEvent::FetchSuccess(batch)),
                round,
                &mut self.rng,
            );
        }
    }
}
