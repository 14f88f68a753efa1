//! `locus verify`: check the saved tree's child index against its records.


use anyhow::{Result, anyhow};
use locus_core::Tree;
use locus_core::error::ErrorCode;
use locus_core::query::orphans;
use locus_core::verify::{IndexViolation, check_index};
use serde::Serialize;

use super::Workspace;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Debug, Serialize)]
struct VerifyOutput {
    state: String,
    nodes: usize,
    parents: usize,
    consistent: bool,
    violations: Vec<IndexViolation>,
    /// Records whose parent is not loaded. Reported, not an error.
    orphans: Vec<String>,
}

fn build_output(tree: &Tree, state: String) -> VerifyOutput {
    let violations = check_index(tree);
    VerifyOutput {
        state,
        nodes: tree.store().len(),
        parents: tree.index().len(),
        consistent: violations.is_empty(),
        violations,
        orphans: orphans(tree)
            .into_iter()
            .map(|n| n.id.as_str().to_string())
            .collect(),
    }
}

/// Execute `locus verify`. Exits non-zero when the index is inconsistent.
pub fn run_verify(output: OutputMode, workspace: &Workspace) -> Result<()> {
    let tree = workspace.load_tree()?;
    let out = build_output(&tree, workspace.state_path.display().to_string());

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "verify nodes={} parents={} consistent={} violations={} orphans={}",
                out.nodes,
                out.parents,
                out.consistent,
                out.violations.len(),
                out.orphans.len()
            )?;
            for violation in &out.violations {
                writeln!(w, "violation={violation}")?;
            }
            for id in &out.orphans {
                writeln!(w, "orphan={id}")?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Verify {}", out.state))?;
            pretty_kv(w, "Nodes", out.nodes.to_string())?;
            pretty_kv(w, "Parents", out.parents.to_string())?;
            pretty_kv(
                w,
                "Index",
                if out.consistent { "consistent" } else { "INCONSISTENT" },
            )?;
            for violation in &out.violations {
                writeln!(w, "  - {violation}")?;
            }
            if !out.orphans.is_empty() {
                pretty_kv(w, "Orphans", out.orphans.join(", "))?;
            }
            Ok(())
        },
    )?;

    if out.consistent {
        Ok(())
    } else {
        Err(anyhow!("{} violation(s)", out.violations.len()).context(ErrorCode::IndexInconsistent))
    }
}
