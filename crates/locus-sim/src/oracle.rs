use std::collections::BTreeMap;
use std::fmt;

use locus_core::verify::{IndexViolation, check_index};
use locus_core::{Node, NodeId, Tree};

// ── Core result types ─────────────────────────────────────────────────────────

/// Oracle result for one or more invariant checks.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

impl Default for OracleResult {
    fn default() -> Self {
        Self::pass()
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    /// The child index disagrees with the node store.
    IndexInconsistent {
        round: u64,
        violations: Vec<IndexViolation>,
    },

    /// A record's `updated_at` went down outside an initial-fetch reset.
    TimestampRegressed {
        round: u64,
        id: NodeId,
        before: i64,
        after: i64,
    },

    /// After quiescence and a final fetch, client and server disagree on a record.
    Divergence {
        id: NodeId,
        client: Option<Node>,
        server: Option<Node>,
    },

    /// The final fetch left loading or error flags set.
    FetchNotSettled { in_progress: bool, error: bool },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexInconsistent { round, violations } => {
                write!(f, "IndexInconsistent: round {round}: ")?;
                let details: Vec<String> = violations.iter().map(ToString::to_string).collect();
                write!(f, "{}", details.join("; "))
            }
            Self::TimestampRegressed {
                round,
                id,
                before,
                after,
            } => write!(
                f,
                "TimestampRegressed: round {round}: '{id}' went from {before} to {after}"
            ),
            Self::Divergence { id, client, server } => write!(
                f,
                "Divergence: '{id}' client={} server={}",
                describe(client.as_ref()),
                describe(server.as_ref())
            ),
            Self::FetchNotSettled { in_progress, error } => write!(
                f,
                "FetchNotSettled: in_progress={in_progress} error={error}"
            ),
        }
    }
}

fn describe(node: Option<&Node>) -> String {
    node.map_or_else(
        || "absent".to_string(),
        |n| {
            format!(
                "{{parent={:?} text={:?} checked={} pos={} updated_at={}}}",
                n.parent_id.as_ref().map(NodeId::as_str),
                n.text,
                n.checked,
                n.pos,
                n.updated_at
            )
        },
    )
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Invariant checks run against the client tree during and after a simulation.
///
/// 1. **Index consistency** (`check_index`): after every step.
/// 2. **Monotonic timestamps** (`check_monotonic`): after every step.
/// 3. **Convergence** (`check_convergence`): after quiescence and a final
///    full fetch, every non-root record equals the server's copy.
/// 4. **Settled fetch state** (`check_settled`): after the final fetch.
pub struct ConvergenceOracle;

impl ConvergenceOracle {
    /// Snapshot of every record's `updated_at`, for [`Self::check_monotonic`].
    #[must_use]
    pub fn timestamps(tree: &Tree) -> BTreeMap<NodeId, i64> {
        tree.store()
            .iter()
            .map(|n| (n.id.clone(), n.updated_at))
            .collect()
    }

    #[must_use]
    pub fn check_index(tree: &Tree, round: u64) -> OracleResult {
        let violations = check_index(tree);
        if violations.is_empty() {
            OracleResult::pass()
        } else {
            OracleResult::from_violations(vec![InvariantViolation::IndexInconsistent {
                round,
                violations,
            }])
        }
    }

    /// Every id present both before and after a step kept or raised its stamp.
    #[must_use]
    pub fn check_monotonic(before: &BTreeMap<NodeId, i64>, tree: &Tree, round: u64) -> OracleResult {
        let violations = tree
            .store()
            .iter()
            .filter_map(|node| {
                let prev = *before.get(&node.id)?;
                (node.updated_at < prev).then(|| InvariantViolation::TimestampRegressed {
                    round,
                    id: node.id.clone(),
                    before: prev,
                    after: node.updated_at,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Run the per-step checks. `reset` skips the monotonic check for a
    /// merge that wiped local data.
    #[must_use]
    pub fn check_step(
        before: &BTreeMap<NodeId, i64>,
        tree: &Tree,
        round: u64,
        reset: bool,
    ) -> OracleResult {
        let index = Self::check_index(tree, round);
        if reset {
            index
        } else {
            index.merge(Self::check_monotonic(before, tree, round))
        }
    }

    /// The client's non-root records equal the server's records exactly.
    #[must_use]
    pub fn check_convergence(tree: &Tree, server: &BTreeMap<NodeId, Node>) -> OracleResult {
        let root_id = tree.root_id();
        let mut violations = Vec::new();

        for node in tree.store().iter().filter(|n| &n.id != root_id) {
            match server.get(&node.id) {
                Some(remote) if remote == node => {}
                remote => violations.push(InvariantViolation::Divergence {
                    id: node.id.clone(),
                    client: Some(node.clone()),
                    server: remote.cloned(),
                }),
            }
        }
        for remote in server.values() {
            if !tree.store().contains(remote.id.as_str()) {
                violations.push(InvariantViolation::Divergence {
                    id: remote.id.clone(),
                    client: None,
                    server: Some(remote.clone()),
                });
            }
        }

        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_settled(tree: &Tree) -> OracleResult {
        let status = tree.fetch_status();
        if status.fetch_in_progress || status.fetch_error {
            OracleResult::from_violations(vec![InvariantViolation::FetchNotSettled {
                in_progress: status.fetch_in_progress,
                error: status.fetch_error,
            }])
        } else {
            OracleResult::pass()
        }
    }
}
