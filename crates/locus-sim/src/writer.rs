//! Remote writers: other devices editing the server directly.

use locus_core::clock::Clock;
use locus_core::{Node, NodeId};
use serde::{Deserialize, Serialize};

use crate::clock::SimulatedClock;
use crate::rng::DeterministicRng;
use crate::server::ServerState;

/// Stable identifier for a remote writer.
pub type WriterId = usize;

/// What a remote writer did to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWrite {
    pub writer: WriterId,
    pub id: NodeId,
    pub created: bool,
    /// Whether the server kept the write.
    pub accepted: bool,
}

/// A device with its own skewed clock that creates nodes and edits content.
/// It never moves nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWriter {
    id: WriterId,
    clock: SimulatedClock,
    next_seq: u64,
}

impl RemoteWriter {
    #[must_use]
    pub const fn new(id: WriterId, clock: SimulatedClock) -> Self {
        Self {
            id,
            clock,
            next_seq: 0,
        }
    }

    #[must_use]
    pub const fn id(&self) -> WriterId {
        self.id
    }

    pub const fn advance_to(&mut self, round: u64) {
        self.clock.advance_to(round);
    }

    /// Make one write against `server`.
    pub fn write(
        &mut self,
        server: &mut ServerState,
        root_id: &NodeId,
        rng: &mut DeterministicRng,
    ) -> RemoteWrite {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let stamp = self.clock.now_millis();

        let existing: Vec<&Node> = server.nodes().values().collect();
        let create = existing.is_empty() || rng.hit_rate_percent(30);

        let node = if create {
            let parent = if existing.is_empty() || rng.hit_rate_percent(50) {
                root_id.clone()
            } else {
                existing[rng.next_index(existing.len())].id.clone()
            };
            Node::new(format!("r{}-{seq}", self.id), Some(parent), rng.next_pos())
                .with_text(format!("remote {} #{seq}", self.id))
                .with_updated_at(stamp)
        } else {
            let mut node = existing[rng.next_index(existing.len())].clone();
            if rng.hit_rate_percent(50) {
                node.checked = !node.checked;
            } else {
                node.text = format!("remote {} edit #{seq}", self.id);
            }
            node.with_updated_at(stamp)
        };

        let id = node.id.clone();
        let accepted = server.apply(node);
        RemoteWrite {
            writer: self.id,
            id,
            created: create,
            accepted,
        }
    }
}
