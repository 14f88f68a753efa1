//! The reconciler: sole writer of the node store and child index.
//!
//! Local edits and server snapshots both flow through here.
//!
//! # Conflict rule
//!
//! Snapshot nodes are compared to local records by `updated_at` alone. When
//! the local record is strictly newer the incoming node is dropped; otherwise
//! it replaces the local record wholesale. Content is never compared. This
//! keeps a local edit that landed while a slower fetch was in flight from
//! being overwritten by that fetch's stale response.
//!
//! # Index maintenance
//!
//! Local creates and moves rebuild the affected parents' entries from the
//! store. Snapshot nodes are inserted into their parent's entry and re-sorted,
//! and detached from the previous parent's entry when they moved.
//!
//! Every method is a synchronous `&mut self` call. Nothing here awaits, and
//! the borrow checker rules out a second concurrent writer.

pub mod snapshot;

use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::clock::skew::check_clock_skew;
use crate::config::SyncConfig;
use crate::model::node::{Node, NodeId};
use crate::model::patch::LocalEdit;
use crate::tree::Tree;

pub use snapshot::{FetchFailure, FetchSuccess, MergeOutcome, SnapshotNode};

/// Applies every write to a [`Tree`], stamping local edits with `C`.
#[derive(Debug)]
pub struct Reconciler<C> {
    tree: Tree,
    clock: C,
    sync: SyncConfig,
}

impl<C: Clock> Reconciler<C> {
    pub fn new(tree: Tree, clock: C) -> Self {
        Self {
            tree,
            clock,
            sync: SyncConfig::default(),
        }
    }

    #[must_use]
    pub fn with_sync_config(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    pub const fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Apply a local edit and return the resulting record.
    ///
    /// The record's `updated_at` is stamped with the current clock reading
    /// (never moving backwards). Creates and moves rebuild the child-index
    /// entry of the node's parent, and of its previous parent when it moved.
    #[instrument(skip_all, fields(id = %edit.id))]
    pub fn upsert_node(&mut self, edit: &LocalEdit) -> Node {
        let old_parent_id = if edit.placement.touches_index() {
            self.tree
                .store
                .get(edit.id.as_str())
                .and_then(|n| n.parent_id.clone())
        } else {
            None
        };

        let stamp = self.clock.now_millis();
        let node = self
            .tree
            .store
            .put(&edit.id, &edit.content, &edit.placement, stamp)
            .clone();

        if edit.placement.touches_index() {
            if let Some(parent_id) = &node.parent_id {
                self.tree.index.rebuild_for(parent_id, &self.tree.store);
            }
            if let Some(old_parent_id) = old_parent_id
                && node.parent_id.as_ref() != Some(&old_parent_id)
            {
                self.tree.index.rebuild_for(&old_parent_id, &self.tree.store);
            }
        }

        debug!(updated_at = node.updated_at, "upserted node");
        node
    }

    /// Merge a server snapshot into the tree.
    ///
    /// An initial fetch carrying more than one node first discards everything
    /// but the root. A non-partial payload clears the loading/error flags and
    /// records `st` as the last successful sync point.
    #[instrument(skip_all, fields(nodes = success.nodes.len(), initial = success.is_initial_fetch, partial = success.partial))]
    pub fn merge_snapshot(&mut self, success: &FetchSuccess) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let local_now = self.clock.now_millis();

        if success.is_initial_fetch && success.nodes.len() > 1 {
            let root_id = self.tree.root_id.clone();
            self.tree.store.retain_only(root_id.as_str());
            self.tree.index.reset_to_root(&root_id);
            outcome.reset = true;
            info!(root = %root_id, "initial fetch replaces local sample data");
        }

        for incoming in &success.nodes {
            let stamp = incoming.updated_at_millis();
            let node = incoming.to_node_stamped(stamp.unwrap_or(0));

            if let Some(stamp) = stamp
                && let Some(warning) =
                    check_clock_skew(stamp, local_now, self.sync.skew_threshold_ms)
            {
                warn!(id = %node.id, skew_ms = warning.skew_ms, "{}", warning.message);
            }

            let previous_parent_id = match self.tree.store.get(node.id.as_str()) {
                Some(existing) if stamp.is_none() || existing.updated_at > node.updated_at => {
                    debug!(
                        id = %node.id,
                        local = existing.updated_at,
                        incoming = node.updated_at,
                        "discarding stale snapshot node"
                    );
                    outcome.stale += 1;
                    continue;
                }
                Some(existing) => existing.parent_id.clone(),
                None => None,
            };

            let id = node.id.clone();
            let parent_id = node.parent_id.clone();
            self.tree.store.replace(node);

            if let Some(previous_parent_id) = previous_parent_id
                && parent_id.as_ref() != Some(&previous_parent_id)
            {
                self.tree.index.detach(previous_parent_id.as_str(), id.as_str());
            }
            if let Some(parent_id) = &parent_id {
                self.tree.index.insert_sorted(parent_id, &id, &self.tree.store);
            }
            outcome.applied += 1;
        }

        if !success.partial {
            self.tree.fetch.fetch_in_progress = false;
            self.tree.fetch.fetch_error = false;
            self.tree.fetch.fetch_error_message = None;
            self.tree.fetch.last_successful_call_time = Some(success.st);
            self.clock.observe_server_time(success.st);
        }

        debug!(
            applied = outcome.applied,
            stale = outcome.stale,
            "merged snapshot"
        );
        outcome
    }

    /// Mark a fetch as in flight.
    pub const fn fetch_started(&mut self) {
        self.tree.fetch.fetch_in_progress = true;
    }

    /// Record a failed fetch. Already-merged data is left in place.
    pub fn fetch_failed(&mut self, failure: &FetchFailure) {
        warn!(error = %failure.error, "fetch failed");
        self.tree.fetch.fetch_in_progress = false;
        self.tree.fetch.fetch_error = true;
        self.tree.fetch.fetch_error_message = Some(failure.error.clone());
    }

    /// Change the selected node. The id is not checked against the store.
    pub fn select(&mut self, id: Option<NodeId>) {
        self.tree.selected_list_id = id;
    }

    /// Delete a record and drop it from its parent's child list.
    ///
    /// Its children keep their `parent_id` and become dangling references.
    #[instrument(skip(self))]
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let removed = self.tree.store.remove(id)?;
        if let Some(parent_id) = &removed.parent_id {
            self.tree.index.detach(parent_id.as_str(), id);
        }
        debug!("removed node");
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TreeConfig;
    use crate::clock::timestamp::millis_to_iso;

    fn seeded(now: i64) -> Reconciler<ManualClock> {
        Reconciler::new(Tree::seeded(&TreeConfig::default()), ManualClock::new(now))
    }

    fn snap(id: &str, parent: &str, pos: f64, text: &str, updated_at: i64) -> SnapshotNode {
        SnapshotNode::from(
            &Node::new(id, Some(parent.into()), pos)
                .with_text(text)
                .with_updated_at(updated_at),
        )
    }

    fn children(r: &Reconciler<ManualClock>, parent: &str) -> Vec<String> {
        r.tree()
            .children(parent)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn create_appends_in_pos_order() {
        let mut r = seeded(1_000);
        r.upsert_node(&LocalEdit::create("n1", "home", 2.0).text("Buy milk"));
        assert_eq!(r.tree().node("n1").map(|n| n.text.as_str()), Some("Buy milk"));
        assert_eq!(children(&r, "home"), vec!["init", "n1"]);
    }

    #[test]
    fn upsert_stamps_with_clock() {
        let mut r = seeded(5_000);
        let node = r.upsert_node(&LocalEdit::update("init").checked(true));
        assert_eq!(node.updated_at, 5_000);
        assert!(node.checked);
    }

    #[test]
    fn move_leaves_old_parent() {
        let mut r = seeded(1_000);
        r.upsert_node(&LocalEdit::create("a", "home", 2.0));
        r.upsert_node(&LocalEdit::create("b", "home", 3.0));
        r.upsert_node(&LocalEdit::move_to("b", "a", 1.0));
        assert_eq!(children(&r, "home"), vec!["init", "a"]);
        assert_eq!(children(&r, "a"), vec!["b"]);
    }

    #[test]
    fn reorder_within_parent() {
        let mut r = seeded(1_000);
        r.upsert_node(&LocalEdit::create("a", "home", 2.0));
        let mut edit = LocalEdit::update("a");
        edit.placement = crate::model::patch::Placement::Move {
            parent_id: None,
            pos: Some(0.5),
        };
        r.upsert_node(&edit);
        assert_eq!(children(&r, "home"), vec!["a", "init"]);
    }

    #[test]
    fn stale_snapshot_node_is_discarded() {
        let mut r = seeded(10_000);
        r.upsert_node(&LocalEdit::update("init").text("local"));
        let outcome = r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("init", "home", 1.0, "remote", 9_000)],
            st: 9_500,
            ..FetchSuccess::default()
        });
        assert_eq!(outcome.stale, 1);
        assert_eq!(r.tree().node("init").map(|n| n.text.as_str()), Some("local"));
    }

    #[test]
    fn newer_snapshot_node_replaces_record() {
        let mut r = seeded(10_000);
        r.upsert_node(&LocalEdit::update("init").text("local").checked(true));
        let incoming = snap("init", "home", 1.0, "remote", 11_000);
        r.merge_snapshot(&FetchSuccess {
            nodes: vec![incoming.clone()],
            st: 11_500,
            ..FetchSuccess::default()
        });
        assert_eq!(r.tree().node("init"), Some(&incoming.to_node()));
    }

    #[test]
    fn snapshot_move_detaches_from_old_parent() {
        let mut r = seeded(1_000);
        r.upsert_node(&LocalEdit::create("a", "home", 2.0));
        r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("init", "a", 1.0, "", 2_000)],
            st: 2_000,
            ..FetchSuccess::default()
        });
        assert_eq!(children(&r, "home"), vec!["a"]);
        assert_eq!(children(&r, "a"), vec!["init"]);
    }

    #[test]
    fn initial_fetch_replaces_sample_data() {
        let mut r = seeded(1_000);
        r.upsert_node(&LocalEdit::create("draft", "home", 5.0));
        let outcome = r.merge_snapshot(&FetchSuccess {
            nodes: vec![
                snap("x", "home", 1.0, "X", 500),
                snap("y", "home", 2.0, "Y", 500),
            ],
            is_initial_fetch: true,
            st: 600,
            ..FetchSuccess::default()
        });
        assert!(outcome.reset);
        assert!(r.tree().node("init").is_none());
        assert!(r.tree().node("draft").is_none());
        assert!(r.tree().node("home").is_some());
        assert_eq!(children(&r, "home"), vec!["x", "y"]);
    }

    #[test]
    fn single_node_initial_fetch_does_not_reset() {
        let mut r = seeded(1_000);
        let outcome = r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("x", "home", 2.0, "X", 500)],
            is_initial_fetch: true,
            st: 600,
            ..FetchSuccess::default()
        });
        assert!(!outcome.reset);
        assert_eq!(children(&r, "home"), vec!["init", "x"]);
    }

    #[test]
    fn partial_snapshot_keeps_loading_flags() {
        let mut r = seeded(1_000);
        r.fetch_started();
        r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("x", "home", 2.0, "X", 500)],
            partial: true,
            st: 700,
            ..FetchSuccess::default()
        });
        assert!(r.tree().fetch_status().fetch_in_progress);
        assert_eq!(r.tree().fetch_status().last_successful_call_time, None);

        r.merge_snapshot(&FetchSuccess {
            nodes: vec![],
            st: 800,
            ..FetchSuccess::default()
        });
        assert!(!r.tree().fetch_status().fetch_in_progress);
        assert_eq!(r.tree().fetch_status().last_successful_call_time, Some(800));
    }

    #[test]
    fn failure_sets_error_without_rollback() {
        let mut r = seeded(1_000);
        r.fetch_started();
        r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("x", "home", 2.0, "X", 500)],
            partial: true,
            st: 700,
            ..FetchSuccess::default()
        });
        r.fetch_failed(&FetchFailure {
            error: "timeout".to_string(),
        });
        let status = r.tree().fetch_status();
        assert!(status.fetch_error);
        assert!(!status.fetch_in_progress);
        assert_eq!(status.fetch_error_message.as_deref(), Some("timeout"));
        assert!(r.tree().node("x").is_some());
    }

    #[test]
    fn success_clears_previous_error() {
        let mut r = seeded(1_000);
        r.fetch_failed(&FetchFailure {
            error: "offline".to_string(),
        });
        r.merge_snapshot(&FetchSuccess {
            st: 900,
            ..FetchSuccess::default()
        });
        assert!(!r.tree().fetch_status().fetch_error);
        assert_eq!(r.tree().fetch_status().fetch_error_message, None);
    }

    #[test]
    fn child_before_parent_is_tolerated() {
        let mut r = seeded(1_000);
        r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("kid", "later", 1.0, "", 500)],
            partial: true,
            st: 0,
            ..FetchSuccess::default()
        });
        assert_eq!(children(&r, "later"), vec!["kid"]);

        r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("later", "home", 3.0, "", 500)],
            st: 0,
            ..FetchSuccess::default()
        });
        assert_eq!(children(&r, "home"), vec!["init", "later"]);
        assert_eq!(children(&r, "later"), vec!["kid"]);
    }

    #[test]
    fn missing_timestamp_loses_to_local_record() {
        let mut r = seeded(1_000);
        let mut incoming = snap("init", "home", 1.0, "remote", 0);
        incoming.updated_at = None;
        r.upsert_node(&LocalEdit::update("init").text("local"));
        r.merge_snapshot(&FetchSuccess {
            nodes: vec![incoming],
            st: 0,
            ..FetchSuccess::default()
        });
        assert_eq!(r.tree().node("init").map(|n| n.text.as_str()), Some("local"));
    }

    #[test]
    fn untimestamped_node_loses_to_seeded_sample_at_zero() {
        let mut r = seeded(1_000);
        let before = r.tree().node("init").cloned();
        assert_eq!(before.as_ref().map(|n| n.updated_at), Some(0));

        for raw in [None, Some("yesterday".to_string())] {
            let mut incoming = snap("init", "home", 5.0, "remote", 0);
            incoming.updated_at = raw;
            let outcome = r.merge_snapshot(&FetchSuccess {
                nodes: vec![incoming],
                st: 0,
                ..FetchSuccess::default()
            });
            assert_eq!(outcome.applied, 0);
            assert_eq!(outcome.stale, 1);
        }
        assert_eq!(r.tree().node("init").cloned(), before);
        assert_eq!(children(&r, "home"), ["init"]);
    }

    #[test]
    fn untimestamped_node_is_accepted_for_unknown_id() {
        let mut r = seeded(1_000);
        let mut incoming = snap("fresh", "home", 2.0, "remote", 0);
        incoming.updated_at = None;
        let outcome = r.merge_snapshot(&FetchSuccess {
            nodes: vec![incoming],
            st: 0,
            ..FetchSuccess::default()
        });
        assert_eq!(outcome.applied, 1);
        assert_eq!(r.tree().node("fresh").map(|n| n.updated_at), Some(0));
    }

    #[test]
    fn select_tolerates_unknown_ids() {
        let mut r = seeded(1_000);
        r.select(Some(NodeId::from("nope")));
        assert_eq!(r.tree().selected_list_id(), Some(&NodeId::from("nope")));
        r.select(None);
        assert_eq!(r.tree().selected_list_id(), None);
    }

    #[test]
    fn remove_detaches_from_parent() {
        let mut r = seeded(1_000);
        assert!(r.remove_node("init").is_some());
        assert!(children(&r, "home").is_empty());
        assert!(r.remove_node("init").is_none());
    }

    #[test]
    fn future_timestamps_are_still_applied() {
        let mut r = seeded(1_000);
        let far_future = 1_000 + 10 * 60 * 1_000;
        r.merge_snapshot(&FetchSuccess {
            nodes: vec![snap("init", "home", 1.0, "from the future", far_future)],
            st: 0,
            ..FetchSuccess::default()
        });
        assert_eq!(r.tree().node("init").map(|n| n.updated_at), Some(far_future));
        assert_eq!(millis_to_iso(far_future), "1970-01-01T00:10:01.000Z");
    }
}
