//! Q-Semver identity of a session.
//!
//! * `cq` (chronos): `0.<birth order>.<reboots>`, birth order being the
//!   session's 1-indexed rank by first message within its workspace.
//! * `kq` (kairos): `0.<role tag>.<reboots>`, only when the custom title
//!   carries a role tag such as `/AS/0.5.Q/`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::RolePolicy;
use crate::reboot::RebootEvent;
use crate::repository::{SessionRepository, SessionSummary, find_current_session};
use crate::util::iso_millis;

static ROLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/(?:AS/)?([0-9]+\.[0-9]+)\.Q/").expect("role tag pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    HuskOverseer,
    Infrastructure,
    Quester,
    DomainSpecialist,
    Unknown,
}

impl Role {
    pub fn from_tag(tag: &str, policy: &RolePolicy) -> Self {
        let Ok(value) = tag.parse::<f64>() else {
            return Self::Unknown;
        };
        if value == policy.overseer_tag {
            Self::HuskOverseer
        } else if value >= policy.specialist_min {
            Self::DomainSpecialist
        } else if value >= policy.quester_min {
            Self::Quester
        } else if value >= policy.infrastructure_min {
            Self::Infrastructure
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HuskOverseer => "husk-overseer",
            Self::Infrastructure => "infrastructure",
            Self::Quester => "quester",
            Self::DomainSpecialist => "domain-specialist",
            Self::Unknown => "unknown",
        }
    }
}

/// Extracts the decimal tag from titles like `/AS/0.5.Q/` or `/1.2.Q/`.
pub fn parse_role_tag(custom_title: Option<&str>) -> Option<String> {
    let title = custom_title?;
    ROLE_TAG
        .captures(title)
        .and_then(|caps| caps.get(1))
        .map(|tag| tag.as_str().to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityQuery {
    pub session_id: Option<String>,
    pub workspace_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QSemverIdentity {
    pub session_id: Option<String>,
    #[serde(rename = "workspaceHash")]
    pub workspace_id: Option<String>,
    pub cq: Option<String>,
    pub kq: Option<String>,
    /// Ground-truth reboot count.
    pub patch: usize,
    pub raw_marker_patch: usize,
    pub role: Option<Role>,
    pub custom_title: Option<String>,
    /// 1-indexed; -1 when no session was resolved.
    pub session_birth_order: i64,
    #[serde(rename = "totalSessionsInHash")]
    pub total_sessions: usize,
    pub request_count: usize,
    /// Negative when holes precede the last reboot.
    pub requests_since_compaction: i64,
    pub first_message_at: Option<String>,
    pub last_reboot_at: Option<String>,
    pub reboots: Vec<RebootEvent>,
}

impl QSemverIdentity {
    pub fn empty(
        workspace_id: Option<String>,
        total_sessions: usize,
        session_id: Option<String>,
    ) -> Self {
        Self {
            session_id,
            workspace_id,
            cq: None,
            kq: None,
            patch: 0,
            raw_marker_patch: 0,
            role: None,
            custom_title: None,
            session_birth_order: -1,
            total_sessions,
            request_count: 0,
            requests_since_compaction: 0,
            first_message_at: None,
            last_reboot_at: None,
            reboots: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.workspace_id.is_some() && self.session_birth_order != -1
    }
}

/// Resolves the target session and derives its identity. Lookup failures
/// produce [`QSemverIdentity::empty`] rather than an error.
pub fn compute_identity(
    repository: &SessionRepository,
    query: &IdentityQuery,
    roles: &RolePolicy,
) -> QSemverIdentity {
    let workspace_id = query
        .workspace_id
        .clone()
        .or_else(|| repository.discover_workspace());
    let Some(workspace_id) = workspace_id else {
        debug!("no workspace with chat sessions found");
        return QSemverIdentity::empty(None, 0, query.session_id.clone());
    };

    let sessions = repository.read_sessions(&workspace_id);
    let target = match query.session_id.as_deref() {
        Some(session_id) => sessions.iter().find(|session| session.id == session_id),
        None => find_current_session(&sessions),
    };
    let Some(target) = target else {
        debug!(workspace = %workspace_id, session = ?query.session_id, "session not found");
        return QSemverIdentity::empty(
            Some(workspace_id),
            sessions.len(),
            query.session_id.clone(),
        );
    };

    identity_for(target, &sessions, workspace_id, roles)
}

/// Derives the identity of `target` among its workspace `siblings`
/// (which must include it).
pub fn identity_for(
    target: &SessionSummary,
    siblings: &[SessionSummary],
    workspace_id: String,
    roles: &RolePolicy,
) -> QSemverIdentity {
    let birth_order = birth_order(target, siblings);
    let reboot_data = &target.reboot_data;
    let patch = reboot_data.ground_truth;
    let role_tag = parse_role_tag(target.custom_title.as_deref());
    let last_reboot = reboot_data.last_reboot();
    let requests_since_compaction = match last_reboot {
        Some(event) => target.request_count as i64 - (event.index as i64 + 1),
        None => target.request_count as i64,
    };

    QSemverIdentity {
        session_id: Some(target.id.clone()),
        workspace_id: Some(workspace_id),
        cq: Some(format!("0.{birth_order}.{patch}")),
        kq: role_tag.as_ref().map(|tag| format!("0.{tag}.{patch}")),
        patch,
        raw_marker_patch: reboot_data.count,
        role: role_tag.as_deref().map(|tag| Role::from_tag(tag, roles)),
        custom_title: target.custom_title.clone(),
        session_birth_order: birth_order,
        total_sessions: siblings.len(),
        request_count: target.request_count,
        requests_since_compaction,
        first_message_at: (target.first_message_time != 0)
            .then(|| iso_millis(target.first_message_time))
            .flatten(),
        last_reboot_at: last_reboot.map(|event| event.at.clone()),
        reboots: reboot_data.events_ground_truth.clone(),
    }
}

// Ties on first-message time fall back to the session id so the rank does
// not depend on directory listing order.
fn birth_order(target: &SessionSummary, siblings: &[SessionSummary]) -> i64 {
    let mut ordered: Vec<&SessionSummary> = siblings.iter().collect();
    ordered.sort_by(|a, b| {
        a.first_message_time
            .cmp(&b.first_message_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
        .iter()
        .position(|session| session.id == target.id)
        .map_or(-1, |idx| idx as i64 + 1)
}
