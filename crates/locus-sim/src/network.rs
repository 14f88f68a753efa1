use locus_core::Node;
use locus_core::event::TreeEvent;
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Fault injection configuration for the simulated client/server link.
///
/// Messages are delayed and reordered but never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage chance of reordering ready messages at each tick.
    pub reorder_rate_percent: u8,
    /// Percentage of fetches answered with a failure.
    pub fetch_failure_percent: u8,
    /// Percentage of fetch responses streamed as several partial batches.
    pub partial_batch_percent: u8,
    /// Percentage chance per round that a remote writer edits the server.
    pub remote_edit_percent: u8,
    /// Percentage chance per round to freeze the client clock.
    pub freeze_rate_percent: u8,
    /// Number of rounds to keep a frozen clock frozen.
    pub freeze_duration_rounds: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 3,
            reorder_rate_percent: 10,
            fetch_failure_percent: 10,
            partial_batch_percent: 30,
            remote_edit_percent: 30,
            freeze_rate_percent: 3,
            freeze_duration_rounds: 2,
        }
    }
}

/// Payload carried by the simulated network.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A locally edited record pushed to the server.
    Push(Node),
    /// A fetch response event delivered to the client.
    Response(TreeEvent),
}

#[derive(Debug, Clone, PartialEq)]
struct PendingMessage {
    deliver_at_round: u64,
    message: Message,
}

/// Result of delivering all ready messages for a round.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverOutcome {
    pub delivered: Vec<Message>,
    /// Whether delivery order was shuffled.
    pub reordered: bool,
}

/// Deterministic delaying and reordering network model.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedNetwork {
    pending: Vec<PendingMessage>,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            pending: Vec::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Number of queued in-flight messages.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enqueue a message with a random delay; returns the delay in rounds.
    pub fn send(&mut self, message: Message, round: u64, rng: &mut DeterministicRng) -> u8 {
        let delay_bound = u64::from(self.fault.max_delay_rounds).saturating_add(1);
        let delay = u8::try_from(rng.next_bounded(delay_bound)).unwrap_or(self.fault.max_delay_rounds);
        self.pending.push(PendingMessage {
            deliver_at_round: round.saturating_add(u64::from(delay)),
            message,
        });
        delay
    }

    /// Deliver all messages whose delivery round has arrived.
    #[must_use]
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|pending| pending.deliver_at_round <= round);
        self.pending = future;

        let mut delivered: Vec<Message> = ready.into_iter().map(|p| p.message).collect();
        let reordered =
            delivered.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        if reordered {
            delivered.reverse();
        }

        DeliverOutcome {
            delivered,
            reordered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::event::{SelectPayload, TreeEvent};

    fn response(n: usize) -> Message {
        Message::Response(TreeEvent::Select(SelectPayload {
            id: Some(format!("n{n}").into()),
        }))
    }

    #[test]
    fn messages_wait_for_their_round() {
        let fault = FaultConfig {
            max_delay_rounds: 0,
            reorder_rate_percent: 0,
            ..FaultConfig::default()
        };
        let mut net = SimulatedNetwork::new(fault);
        let mut rng = DeterministicRng::new(1);

        assert_eq!(net.send(response(1), 5, &mut rng), 0);
        assert!(net.deliver_ready(4, &mut rng).delivered.is_empty());
        let outcome = net.deliver_ready(5, &mut rng);
        assert_eq!(outcome.delivered, vec![response(1)]);
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn delay_is_bounded() {
        let mut net = SimulatedNetwork::new(FaultConfig::default());
        let mut rng = DeterministicRng::new(9);
        for i in 0..50 {
            let delay = net.send(response(i), 0, &mut rng);
            assert!(delay <= FaultConfig::default().max_delay_rounds);
        }
        let outcome = net.deliver_ready(u64::from(FaultConfig::default().max_delay_rounds), &mut rng);
        assert_eq!(outcome.delivered.len(), 50);
    }

    #[test]
    fn reorder_reverses_ready_batch() {
        let fault = FaultConfig {
            max_delay_rounds: 0,
            reorder_rate_percent: 100,
            ..FaultConfig::default()
        };
        let mut net = SimulatedNetwork::new(fault);
        let mut rng = DeterministicRng::new(2);
        net.send(response(1), 0, &mut rng);
        net.send(response(2), 0, &mut rng);
        let outcome = net.deliver_ready(0, &mut rng);
        assert!(outcome.reordered);
        assert_eq!(outcome.delivered, vec![response(2), response(1)]);
    }
}
