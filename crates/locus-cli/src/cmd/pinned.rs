//! `locus pinned`: nodes pinned to the dashboard.


use anyhow::Result;
use locus_core::Tree;
use locus_core::query::{direct_progress, pinned};
use serde::Serialize;

use super::Workspace;
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Debug, Serialize)]
struct PinnedRow {
    id: String,
    text: String,
    pinned_pos: f64,
    checked: u32,
    total: u32,
}

fn build_rows(tree: &Tree) -> Vec<PinnedRow> {
    pinned(tree)
        .into_iter()
        .map(|node| {
            let progress = direct_progress(tree, node.id.as_str());
            PinnedRow {
                id: node.id.as_str().to_string(),
                text: node.text.clone(),
                pinned_pos: node.pinned_pos.unwrap_or_default(),
                checked: progress.checked,
                total: progress.total,
            }
        })
        .collect()
}

/// Execute `locus pinned`.
pub fn run_pinned(output: OutputMode, workspace: &Workspace) -> Result<()> {
    let tree = workspace.load_tree()?;
    let rows = build_rows(&tree);

    render_mode(
        output,
        &rows,
        |rows, w| {
            for row in rows {
                writeln!(
                    w,
                    "pinned id={} pos={} progress={}/{} text={}",
                    row.id, row.pinned_pos, row.checked, row.total, row.text
                )?;
            }
            Ok(())
        },
        |rows, w| {
            pretty_section(w, "Pinned")?;
            if rows.is_empty() {
                writeln!(w, "nothing pinned")?;
            }
            for row in rows {
                writeln!(
                    w,
                    "{:<24} {:>3}/{:<3} ({})",
                    row.text, row.checked, row.total, row.id
                )?;
            }
            Ok(())
        },
    )
}
