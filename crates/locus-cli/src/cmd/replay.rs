//! `locus replay`: apply a JSON Lines event log to the saved tree.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use locus_core::clock::{AnchoredClock, Clock, ManualClock, SystemClock};
use locus_core::error::ErrorCode;
use locus_core::event::{Applied, TreeEvent, read_events};
use locus_core::model::patch::{LocalEdit, Placement};
use locus_core::query::{MoveError, validate_move};
use locus_core::{Reconciler, Tree};
use serde::Serialize;
use tracing::{debug, info};

use super::Workspace;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Event log to apply, one JSON event per line. Use `-` for stdin.
    pub log: PathBuf,

    /// Start from a freshly seeded tree instead of the saved one.
    #[arg(long)]
    pub fresh: bool,

    /// Apply the events and report, but do not write the state file.
    #[arg(long)]
    pub dry_run: bool,

    /// Stamp local edits at this fixed time (milliseconds since the epoch)
    /// instead of the system clock.
    #[arg(long, value_name = "MILLIS")]
    pub now: Option<i64>,
}

/// Counts of what a replay did.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub upserts: usize,
    pub merges: usize,
    pub applied: usize,
    pub stale: usize,
    pub resets: usize,
    pub fetch_failures: usize,
    pub selections: usize,
    pub removals: usize,
    pub nodes: usize,
    pub saved: bool,
}

impl ReplayReport {
    fn record(&mut self, applied: &Applied) {
        self.events += 1;
        match applied {
            Applied::Upserted(_) => self.upserts += 1,
            Applied::Merged(outcome) => {
                self.merges += 1;
                self.applied += outcome.applied;
                self.stale += outcome.stale;
                if outcome.reset {
                    self.resets += 1;
                }
            }
            Applied::FetchStarted => {}
            Applied::FetchFailed => self.fetch_failures += 1,
            Applied::Selected => self.selections += 1,
            Applied::Removed(_) => self.removals += 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    log: String,
    state: String,
    #[serde(flatten)]
    report: ReplayReport,
}

fn open_log(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Reject moves that would detach a subtree into itself or move the root.
///
/// Moves to a parent that is not loaded yet are allowed.
fn check_move(tree: &Tree, event: &TreeEvent) -> Result<()> {
    let TreeEvent::Upsert(payload) = event else {
        return Ok(());
    };
    let Ok(edit) = LocalEdit::try_from(payload.clone()) else {
        return Ok(());
    };
    // A create for an id already in the store re-parents it like a move.
    let parent_id = match &edit.placement {
        Placement::Move {
            parent_id: Some(parent_id),
            ..
        }
        | Placement::Create { parent_id, .. } => parent_id,
        Placement::Move { parent_id: None, .. } | Placement::Keep => return Ok(()),
    };
    if !tree.store().contains(edit.id.as_str()) {
        return Ok(());
    }

    match validate_move(tree, edit.id.as_str(), parent_id.as_str()) {
        Ok(()) | Err(MoveError::ParentNotFound(_) | MoveError::NodeNotFound(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Apply `events` in order, stopping at the first invalid one.
pub fn apply_events<C: Clock>(
    reconciler: &mut Reconciler<C>,
    events: Vec<TreeEvent>,
) -> Result<ReplayReport> {
    let mut report = ReplayReport::default();
    for (idx, event) in events.into_iter().enumerate() {
        let kind = event.kind();
        check_move(reconciler.tree(), &event)
            .with_context(|| format!("event {} ({kind})", idx + 1))
            .context(ErrorCode::InvalidMove)?;
        let applied = reconciler
            .dispatch(event)
            .with_context(|| format!("event {} ({kind})", idx + 1))
            .context(ErrorCode::InvalidEdit)?;
        debug!(event = idx + 1, kind, "applied event");
        report.record(&applied);
    }
    Ok(report)
}

/// Execute `locus replay`.
pub fn run_replay(args: &ReplayArgs, output: OutputMode, workspace: &Workspace) -> Result<()> {
    let reader = open_log(&args.log).context(ErrorCode::EventLogInvalid)?;
    let events = read_events(reader)
        .with_context(|| format!("Failed to read {}", args.log.display()))
        .context(ErrorCode::EventLogInvalid)?;

    let tree = if args.fresh {
        workspace.seeded_tree()
    } else {
        workspace.load_tree()?
    };

    let local: Box<dyn Clock> = match args.now {
        Some(millis) => Box::new(ManualClock::new(millis)),
        None => Box::new(SystemClock),
    };
    let mut reconciler = Reconciler::new(tree, AnchoredClock::new(local))
        .with_sync_config(workspace.config.project.sync);

    let mut report = apply_events(&mut reconciler, events)?;
    let tree = reconciler.into_tree();
    report.nodes = tree.store().len();

    if !args.dry_run {
        workspace.save_tree(&tree)?;
        report.saved = true;
    }
    info!(
        events = report.events,
        stale = report.stale,
        saved = report.saved,
        "replay finished"
    );

    let out = ReplayOutput {
        log: args.log.display().to_string(),
        state: workspace.state_path.display().to_string(),
        report,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            let r = &out.report;
            writeln!(
                w,
                "replay events={} upserts={} merges={} applied={} stale={} resets={} fetch_failures={} selections={} removals={}",
                r.events,
                r.upserts,
                r.merges,
                r.applied,
                r.stale,
                r.resets,
                r.fetch_failures,
                r.selections,
                r.removals
            )?;
            writeln!(w, "state path={} nodes={} saved={}", out.state, r.nodes, r.saved)
        },
        |out, w| {
            let r = &out.report;
            pretty_section(w, &format!("Replay {}", out.log))?;
            pretty_kv(w, "Events", r.events.to_string())?;
            pretty_kv(w, "Local edits", r.upserts.to_string())?;
            pretty_kv(
                w,
                "Snapshots",
                format!(
                    "{} merged ({} applied, {} stale, {} resets)",
                    r.merges, r.applied, r.stale, r.resets
                ),
            )?;
            pretty_kv(w, "Failures", r.fetch_failures.to_string())?;
            pretty_kv(w, "Nodes", r.nodes.to_string())?;
            if r.saved {
                pretty_kv(w, "Saved to", &out.state)
            } else {
                pretty_kv(w, "Saved to", "(dry run)")
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::NodeId;
    use locus_core::config::TreeConfig;

    fn events(jsonl: &str) -> Vec<TreeEvent> {
        read_events(jsonl.as_bytes()).expect("valid log")
    }

    fn reconciler() -> Reconciler<ManualClock> {
        Reconciler::new(Tree::seeded(&TreeConfig::default()), ManualClock::new(5_000))
    }

    #[test]
    fn report_counts_each_kind() {
        let mut r = reconciler();
        let log = r#"
{"type":"upsert","payload":{"id":"a","parent_id":"home","pos":1,"new":true}}
{"type":"fetch_started"}
{"type":"fetch_success","payload":{"nodes":[{"id":"b","parent_id":"home","text":"","checked":false,"pos":2,"updated_at":"2024-01-01T00:00:00Z"}],"partial":true,"st":9000}}
{"type":"fetch_failure","payload":{"error":"timeout"}}
{"type":"select","payload":{"id":"a"}}
{"type":"remove","payload":{"id":"b"}}
"#;
        let report = apply_events(&mut r, events(log)).expect("apply");
        assert_eq!(report.events, 6);
        assert_eq!(report.upserts, 1);
        assert_eq!(report.merges, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.fetch_failures, 1);
        assert_eq!(report.selections, 1);
        assert_eq!(report.removals, 1);
    }

    #[test]
    fn cycle_move_is_rejected_with_code() {
        let mut r = reconciler();
        let log = r#"
{"type":"upsert","payload":{"id":"a","parent_id":"home","pos":1,"new":true}}
{"type":"upsert","payload":{"id":"b","parent_id":"a","pos":1,"new":true}}
{"type":"upsert","payload":{"id":"a","parent_id":"b","pos":1}}
"#;
        let err = apply_events(&mut r, events(log)).expect_err("cycle");
        assert_eq!(err.downcast_ref::<ErrorCode>(), Some(&ErrorCode::InvalidMove));
        assert!(format!("{err:#}").contains("event 3 (upsert)"));
        assert_eq!(
            r.tree().node("a").and_then(|n| n.parent_id.clone()),
            Some(NodeId::from("home"))
        );
    }

    #[test]
    fn recreate_under_descendant_is_rejected_with_code() {
        let mut r = reconciler();
        let log = r#"
{"type":"upsert","payload":{"id":"a","parent_id":"home","pos":1,"new":true}}
{"type":"upsert","payload":{"id":"b","parent_id":"a","pos":1,"new":true}}
{"type":"upsert","payload":{"id":"a","parent_id":"b","pos":1,"new":true}}
"#;
        let err = apply_events(&mut r, events(log)).expect_err("cycle");
        assert_eq!(err.downcast_ref::<ErrorCode>(), Some(&ErrorCode::InvalidMove));
        assert!(format!("{err:#}").contains("event 3 (upsert)"));
        assert_eq!(
            r.tree().node("a").and_then(|n| n.parent_id.clone()),
            Some(NodeId::from("home"))
        );
        assert_eq!(r.tree().children("b"), &[] as &[NodeId]);
    }

    #[test]
    fn recreate_of_root_is_rejected() {
        let mut r = reconciler();
        let log = r#"
{"type":"upsert","payload":{"id":"a","parent_id":"home","pos":1,"new":true}}
{"type":"upsert","payload":{"id":"home","parent_id":"a","pos":1,"new":true}}
"#;
        let err = apply_events(&mut r, events(log)).expect_err("root");
        assert_eq!(err.downcast_ref::<ErrorCode>(), Some(&ErrorCode::InvalidMove));
        assert_eq!(r.tree().node("home").and_then(|n| n.parent_id.clone()), None);
    }

    #[test]
    fn move_under_unloaded_parent_is_allowed() {
        let mut r = reconciler();
        let log = r#"
{"type":"upsert","payload":{"id":"a","parent_id":"home","pos":1,"new":true}}
{"type":"upsert","payload":{"id":"a","parent_id":"later","pos":3}}
"#;
        apply_events(&mut r, events(log)).expect("apply");
        assert_eq!(r.tree().children("later"), &[NodeId::from("a")]);
    }

    #[test]
    fn invalid_create_is_rejected_with_code() {
        let mut r = reconciler();
        let log = r#"{"type":"upsert","payload":{"id":"x","pos":1,"new":true}}"#;
        let err = apply_events(&mut r, events(log)).expect_err("missing parent");
        assert_eq!(err.downcast_ref::<ErrorCode>(), Some(&ErrorCode::InvalidEdit));
        assert!(r.tree().node("x").is_none());
    }
}
