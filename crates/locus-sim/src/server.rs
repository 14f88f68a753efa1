//! Authoritative server model.
//!
//! The server keeps one record per id and accepts a write when its
//! `updated_at` is at least the stored one. Fetches return the whole map.

use std::collections::BTreeMap;

use locus_core::clock::Clock;
use locus_core::reconcile::{FetchSuccess, SnapshotNode};
use locus_core::{Node, NodeId};

use crate::clock::SimulatedClock;
use crate::rng::DeterministicRng;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerState {
    nodes: BTreeMap<NodeId, Node>,
    clock: SimulatedClock,
}

impl ServerState {
    /// A server holding `count` records under `root_id`, stamped just before
    /// the simulation starts.
    #[must_use]
    pub fn seeded(root_id: &NodeId, count: usize, clock: SimulatedClock) -> Self {
        let stamp = clock.now_millis().saturating_sub(1_000);
        let nodes = (0..count)
            .map(|i| {
                let pos = f64::from(u32::try_from(i).unwrap_or(u32::MAX));
                Node::new(format!("s{i}"), Some(root_id.clone()), pos)
                    .with_text(format!("server item {i}"))
                    .with_updated_at(stamp)
            })
            .map(|node| (node.id.clone(), node))
            .collect();
        Self { nodes, clock }
    }

    #[must_use]
    pub const fn nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.nodes
    }

    pub const fn advance_to(&mut self, round: u64) {
        self.clock.advance_to(round);
    }

    /// Server time in milliseconds.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Store `node` unless the server already holds a strictly newer copy.
    pub fn apply(&mut self, node: Node) -> bool {
        if let Some(existing) = self.nodes.get(&node.id)
            && existing.updated_at > node.updated_at
        {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Answer a fetch with every record, optionally streamed as partial batches.
    ///
    /// All batches but the last are marked `partial`.
    #[must_use]
    pub fn respond(
        &self,
        is_initial_fetch: bool,
        split: bool,
        rng: &mut DeterministicRng,
    ) -> Vec<FetchSuccess> {
        let st = self.now_millis();
        let wire: Vec<SnapshotNode> = self.nodes.values().map(SnapshotNode::from).collect();

        let batch_count = if split && wire.len() >= 2 {
            2 + rng.next_index(2)
        } else {
            1
        };
        let batch_size = wire.len().div_ceil(batch_count).max(1);

        let mut batches: Vec<FetchSuccess> = wire
            .chunks(batch_size)
            .map(|chunk| FetchSuccess {
                nodes: chunk.to_vec(),
                is_initial_fetch,
                partial: true,
                st,
            })
            .collect();
        match batches.last_mut() {
            Some(last) => last.partial = false,
            None => batches.push(FetchSuccess {
                nodes: Vec::new(),
                is_initial_fetch,
                partial: false,
                st,
            }),
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockConfig;

    fn server(count: usize) -> ServerState {
        ServerState::seeded(
            &NodeId::from("home"),
            count,
            SimulatedClock::new(ClockConfig::default().reference()),
        )
    }

    #[test]
    fn stale_writes_are_rejected() {
        let mut s = server(1);
        let current = s.nodes()["s0"].clone();
        let older = current.clone().with_text("old").with_updated_at(current.updated_at - 1);
        assert!(!s.apply(older));
        let same_time = current.clone().with_text("tie");
        assert!(s.apply(same_time));
        assert_eq!(s.nodes()["s0"].text, "tie");
    }

    #[test]
    fn unsplit_response_is_one_complete_batch() {
        let s = server(4);
        let mut rng = DeterministicRng::new(0);
        let batches = s.respond(true, false, &mut rng);
        assert_eq!(batches.len(), 1);
        assert!(!batches[0].partial);
        assert!(batches[0].is_initial_fetch);
        assert_eq!(batches[0].nodes.len(), 4);
    }

    #[test]
    fn split_response_ends_with_complete_batch() {
        let s = server(5);
        let mut rng = DeterministicRng::new(4);
        let batches = s.respond(false, true, &mut rng);
        assert!(batches.len() >= 2);
        let (last, rest) = batches.split_last().expect("batches");
        assert!(!last.partial);
        assert!(rest.iter().all(|b| b.partial));
        let total: usize = batches.iter().map(|b| b.nodes.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn empty_server_still_completes_fetch() {
        let s = server(0);
        let mut rng = DeterministicRng::new(0);
        let batches = s.respond(false, true, &mut rng);
        assert_eq!(batches.len(), 1);
        assert!(!batches[0].partial);
    }
}
