//! `locus show`: render the outline below a node.

use std::io::Write;

use anyhow::{Result, bail};
use clap::Args;
use locus_core::Tree;
use locus_core::clock::timestamp::millis_to_iso;
use locus_core::query::{OutlineRow, nested_progress, visible_rows};
use serde::Serialize;

use super::Workspace;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Node to start from. Defaults to the root.
    pub id: Option<String>,
}

/// One outline line for text and pretty output.
#[derive(Debug, Serialize)]
struct Row {
    depth: usize,
    id: String,
    text: String,
    checked: bool,
    hidden_children: bool,
    progress: Option<String>,
}

impl Row {
    fn from_outline(tree: &Tree, row: &OutlineRow<'_>) -> Self {
        let id = row.node.id.as_str();
        let progress = (!tree.children(id).is_empty())
            .then(|| nested_progress(tree, id).to_string());
        Self {
            depth: row.depth,
            id: id.to_string(),
            text: row.node.text.clone(),
            checked: row.node.checked,
            hidden_children: row.has_hidden_children,
            progress,
        }
    }
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    from: String,
    rows: Vec<Row>,
    fetch_in_progress: bool,
    fetch_error: Option<String>,
    last_sync: Option<String>,
}

fn build_output(tree: &Tree, from: &str) -> ShowOutput {
    let status = tree.fetch_status();
    ShowOutput {
        from: from.to_string(),
        rows: visible_rows(tree, from)
            .iter()
            .map(|row| Row::from_outline(tree, row))
            .collect(),
        fetch_in_progress: status.fetch_in_progress,
        fetch_error: status
            .fetch_error
            .then(|| status.fetch_error_message.clone().unwrap_or_default()),
        last_sync: status.last_successful_call_time.map(millis_to_iso),
    }
}

fn write_text(out: &ShowOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for row in &out.rows {
        writeln!(
            w,
            "{}{}\tchecked={}\t{}",
            "  ".repeat(row.depth),
            row.id,
            row.checked,
            row.text
        )?;
    }
    Ok(())
}

fn write_pretty(out: &ShowOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Outline from {}", out.from))?;
    if out.rows.is_empty() {
        writeln!(w, "(empty)")?;
    }
    for row in &out.rows {
        let mark = if row.checked { "[x]" } else { "[ ]" };
        let fold = if row.hidden_children { " +" } else { "" };
        let progress = row
            .progress
            .as_deref()
            .map(|p| format!("  {p}"))
            .unwrap_or_default();
        writeln!(
            w,
            "{}{mark} {}{fold}{progress}  ({})",
            "  ".repeat(row.depth),
            row.text,
            row.id
        )?;
    }
    writeln!(w)?;
    if out.fetch_in_progress {
        pretty_kv(w, "Sync", "fetch in progress")?;
    }
    if let Some(message) = &out.fetch_error {
        pretty_kv(w, "Sync error", message)?;
    }
    pretty_kv(
        w,
        "Last sync",
        out.last_sync.as_deref().unwrap_or("never"),
    )
}

/// Execute `locus show`.
///
/// JSON output is the full tree view (`nodeDBMap`, `nodeUIMap`, selection
/// and fetch status) regardless of the starting node.
pub fn run_show(args: &ShowArgs, output: OutputMode, workspace: &Workspace) -> Result<()> {
    let tree = workspace.load_tree()?;
    let from = args
        .id
        .clone()
        .unwrap_or_else(|| tree.root_id().as_str().to_string());
    if tree.node(&from).is_none() {
        bail!("node '{from}' not found in {}", workspace.state_path.display());
    }

    if output.is_json() {
        return render_mode(output, &tree.view(), |_, _| Ok(()), |_, _| Ok(()));
    }

    let out = build_output(&tree, &from);
    render_mode(output, &out, write_text, write_pretty)
}
