//! Dispatched tree events.
//!
//! Events use the same `{ "type": ..., "payload": ... }` shape as the
//! front end's actions, one JSON object per event:
//!
//! ```json
//! {"type":"upsert","payload":{"id":"n1","parent_id":"home","pos":2,"new":true,"text":"Buy milk"}}
//! {"type":"fetch_started"}
//! {"type":"fetch_success","payload":{"nodes":[],"partial":true,"st":1700000000000}}
//! {"type":"fetch_failure","payload":{"error":"timeout"}}
//! {"type":"select","payload":{"id":"n1"}}
//! {"type":"remove","payload":{"id":"n1"}}
//! ```

use serde::{Deserialize, Serialize};
use std::io::BufRead;

use crate::clock::Clock;
use crate::model::node::{Node, NodeId};
use crate::model::patch::{LocalEdit, LocalEditPayload, PatchError};
use crate::reconcile::{FetchFailure, FetchSuccess, MergeOutcome, Reconciler};

/// One event dispatched to the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TreeEvent {
    Upsert(LocalEditPayload),
    FetchStarted,
    FetchSuccess(FetchSuccess),
    FetchFailure(FetchFailure),
    Select(SelectPayload),
    Remove(RemovePayload),
}

impl TreeEvent {
    /// Short name used in logs and reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "upsert",
            Self::FetchStarted => "fetch_started",
            Self::FetchSuccess(_) => "fetch_success",
            Self::FetchFailure(_) => "fetch_failure",
            Self::Select(_) => "select",
            Self::Remove(_) => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectPayload {
    pub id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePayload {
    pub id: NodeId,
}

/// What applying one event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Upserted(Node),
    Merged(MergeOutcome),
    FetchStarted,
    FetchFailed,
    Selected,
    Removed(Option<Node>),
}

impl<C: Clock> Reconciler<C> {
    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns a [`PatchError`] when an upsert payload cannot be turned into
    /// a valid edit. The tree is left untouched in that case.
    pub fn dispatch(&mut self, event: TreeEvent) -> Result<Applied, PatchError> {
        let applied = match event {
            TreeEvent::Upsert(payload) => {
                let edit = LocalEdit::try_from(payload)?;
                Applied::Upserted(self.upsert_node(&edit))
            }
            TreeEvent::FetchStarted => {
                self.fetch_started();
                Applied::FetchStarted
            }
            TreeEvent::FetchSuccess(success) => Applied::Merged(self.merge_snapshot(&success)),
            TreeEvent::FetchFailure(failure) => {
                self.fetch_failed(&failure);
                Applied::FetchFailed
            }
            TreeEvent::Select(SelectPayload { id }) => {
                self.select(id);
                Applied::Selected
            }
            TreeEvent::Remove(RemovePayload { id }) => {
                Applied::Removed(self.remove_node(id.as_str()))
            }
        };
        Ok(applied)
    }
}

/// Errors reading a JSON Lines event log.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("failed to read event log line {line}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid event on line {line}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a JSON Lines event log. Blank lines and `#` comments are skipped.
///
/// # Errors
///
/// Returns an [`EventLogError`] naming the 1-based line that failed.
pub fn read_events(reader: impl BufRead) -> Result<Vec<TreeEvent>, EventLogError> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| EventLogError::Io {
            line: line_no,
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|source| EventLogError::Parse {
            line: line_no,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TreeConfig;
    use crate::tree::Tree;

    const LOG: &str = r#"
# seed session
{"type":"upsert","payload":{"id":"n1","parent_id":"home","pos":2,"new":true,"text":"Buy milk"}}
{"type":"fetch_started"}
{"type":"fetch_failure","payload":{"error":"timeout"}}
{"type":"select","payload":{"id":"n1"}}
"#;

    #[test]
    fn reads_json_lines_log() {
        let events = read_events(LOG.as_bytes()).expect("log parses");
        let kinds: Vec<_> = events.iter().map(TreeEvent::kind).collect();
        assert_eq!(kinds, vec!["upsert", "fetch_started", "fetch_failure", "select"]);
    }

    #[test]
    fn reports_failing_line() {
        let err = read_events("\n{\"type\":\"bogus\"}\n".as_bytes()).expect_err("bad event");
        assert!(matches!(err, EventLogError::Parse { line: 2, .. }));
    }

    #[test]
    fn dispatch_applies_log() {
        let mut r = Reconciler::new(Tree::seeded(&TreeConfig::default()), ManualClock::new(7));
        for event in read_events(LOG.as_bytes()).expect("log parses") {
            r.dispatch(event).expect("valid event");
        }
        let tree = r.tree();
        assert_eq!(tree.children("home"), &[NodeId::from("init"), NodeId::from("n1")]);
        assert_eq!(tree.selected_list_id(), Some(&NodeId::from("n1")));
        assert!(tree.fetch_status().fetch_error);
    }

    #[test]
    fn invalid_upsert_leaves_tree_untouched() {
        let mut r = Reconciler::new(Tree::seeded(&TreeConfig::default()), ManualClock::new(7));
        let before = r.tree().clone();
        let event: TreeEvent =
            serde_json::from_str(r#"{"type":"upsert","payload":{"id":"n1","new":true}}"#)
                .expect("parses");
        assert!(r.dispatch(event).is_err());
        assert_eq!(r.tree(), &before);
    }

    #[test]
    fn unit_event_serializes_without_payload() {
        let json = serde_json::to_string(&TreeEvent::FetchStarted).expect("serialize");
        assert_eq!(json, r#"{"type":"fetch_started"}"#);
    }
}
