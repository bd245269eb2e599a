use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::QhoamiConfig;
use crate::identity::{IdentityQuery, QSemverIdentity, compute_identity};
use crate::probe::write_context_probe;
use crate::repository::{LocatedSession, SessionRepository, find_current_session};
use crate::util::fill_percent;

pub fn print_identity(
    config: &QhoamiConfig,
    repository: &SessionRepository,
    query: &IdentityQuery,
) -> Result<u8> {
    let identity = compute_identity(repository, query, &config.roles);
    if !identity.is_resolved() {
        eprintln!("Session not found: {}", requested_label(query));
        return Ok(1);
    }
    print_json(&identity)?;
    Ok(0)
}

pub fn print_status(
    config: &QhoamiConfig,
    repository: &SessionRepository,
    query: &IdentityQuery,
) -> Result<u8> {
    let identity = compute_identity(repository, query, &config.roles);

    println!("qhoami status");
    println!("storage: {}", repository.storage_root().display());
    println!(
        "workspace: {}",
        identity.workspace_id.as_deref().unwrap_or("none")
    );
    if !identity.is_resolved() {
        println!("session: not found ({})", requested_label(query));
        return Ok(1);
    }
    print_identity_summary(&identity, config);
    Ok(0)
}

pub fn print_reboots(repository: &SessionRepository, query: &IdentityQuery) -> Result<u8> {
    let located = match query.session_id.as_deref() {
        Some(session_id) => {
            repository.find_session_by_id(session_id, query.workspace_id.as_deref())
        }
        None => query
            .workspace_id
            .clone()
            .or_else(|| repository.discover_workspace())
            .and_then(|workspace_id| {
                let sessions = repository.read_sessions(&workspace_id);
                find_current_session(&sessions)
                    .cloned()
                    .map(|summary| LocatedSession {
                        workspace_id,
                        summary,
                    })
            }),
    };

    let Some(located) = located else {
        eprintln!("Session not found: {}", requested_label(query));
        return Ok(1);
    };

    let report = &located.summary.reboot_data;
    print_json(&json!({
        "sessionId": located.summary.id,
        "workspaceHash": located.workspace_id,
        "filePath": located.summary.file_path.display().to_string(),
        "requestCount": located.summary.request_count,
        "rebootCount": report.ground_truth,
        "reboots": report,
    }))?;
    Ok(0)
}

pub fn write_probe(
    config: &QhoamiConfig,
    repository: &SessionRepository,
    query: &IdentityQuery,
    workspace_root: &Path,
) -> Result<u8> {
    let identity = compute_identity(repository, query, &config.roles);
    if !identity.is_resolved() {
        eprintln!("Session not found: {}", requested_label(query));
        return Ok(1);
    }

    match write_context_probe(workspace_root, &identity, None, &config.probe) {
        Ok(true) => println!("probe written for session {}", display_session(&identity)),
        Ok(false) => debug!(root = %workspace_root.display(), "no probe inbox; skipped"),
        Err(err) => warn!(error = %format!("{err:#}"), "failed to write context probe"),
    }
    Ok(0)
}

fn print_identity_summary(identity: &QSemverIdentity, config: &QhoamiConfig) {
    let policy = &config.probe;
    let rsc = identity.requests_since_compaction;
    println!("session: {}", display_session(identity));
    if let Some(title) = &identity.custom_title {
        println!("  title: {title}");
    }
    println!("  cq: {}", identity.cq.as_deref().unwrap_or("n/a"));
    println!("  kq: {}", identity.kq.as_deref().unwrap_or("unassigned"));
    if let Some(role) = identity.role {
        println!("  role: {}", role.as_str());
    }
    println!(
        "  patch: {} (raw markers {}){}",
        identity.patch,
        identity.raw_marker_patch,
        if identity.patch >= policy.reboot_risk_threshold {
            " [wrap-up advised]"
        } else {
            ""
        }
    );
    println!(
        "  birth_order: {} / {}",
        identity.session_birth_order, identity.total_sessions
    );
    println!("  requests: {}", identity.request_count);
    println!(
        "  requests_since_compaction: {rsc} ({}% of context){}",
        fill_percent(rsc, policy.context_fill_denominator),
        if usize::try_from(rsc).is_ok_and(|n| n >= policy.context_warn_threshold) {
            " [high]"
        } else {
            ""
        }
    );
    println!(
        "  first_message: {}",
        identity.first_message_at.as_deref().unwrap_or("n/a")
    );
    println!(
        "  last_reboot: {}",
        identity.last_reboot_at.as_deref().unwrap_or("never")
    );
}

fn display_session(identity: &QSemverIdentity) -> &str {
    identity.session_id.as_deref().unwrap_or("unknown")
}

fn requested_label(query: &IdentityQuery) -> &str {
    query.session_id.as_deref().unwrap_or("(most recent)")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
