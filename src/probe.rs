use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::config::ProbePolicy;
use crate::identity::QSemverIdentity;
use crate::util::{fill_percent, now_iso};

const PROBE_FILE_NAME: &str = "context.probe";

/// Source-control totals supplied by whoever can read them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScmTotals {
    pub repo_count: usize,
    pub total_changes: usize,
}

pub fn inbox_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join("_").join(".vscode").join("hermes-inbox")
}

pub fn render_probe(
    identity: &QSemverIdentity,
    scm: Option<&ScmTotals>,
    policy: &ProbePolicy,
    timestamp: &str,
) -> String {
    let rsc = identity.requests_since_compaction;
    let mut lines = vec![
        "state: unknown".to_string(),
        format!(
            "context_pct: {}",
            fill_percent(rsc, policy.context_fill_denominator)
        ),
        format!("rsc: {rsc}"),
        format!("patch: {}", identity.patch),
        format!("ts: {timestamp}"),
    ];
    if let Some(scm) = scm {
        lines.push(format!("scm_total_changes: {}", scm.total_changes));
        lines.push(format!("scm_repo_count: {}", scm.repo_count));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Writes the probe into the workspace inbox. The inbox belongs to another
/// tool, so nothing is written (and `Ok(false)` returned) when it is absent.
pub fn write_context_probe(
    workspace_root: &Path,
    identity: &QSemverIdentity,
    scm: Option<&ScmTotals>,
    policy: &ProbePolicy,
) -> Result<bool> {
    let inbox = inbox_dir(workspace_root);
    if !inbox.is_dir() {
        return Ok(false);
    }

    let body = render_probe(identity, scm, policy, &now_iso());
    let target = inbox.join(PROBE_FILE_NAME);
    let mut tmp = NamedTempFile::new_in(&inbox)
        .with_context(|| format!("failed to create temp file in {}", inbox.display()))?;
    tmp.write_all(body.as_bytes())
        .with_context(|| format!("failed to write probe for {}", target.display()))?;
    tmp.persist(&target)
        .with_context(|| format!("failed to move probe into {}", target.display()))?;
    Ok(true)
}
