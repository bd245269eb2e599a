//! Session enumeration over an editor's workspace storage.
//!
//! Layout: `<storage>/<workspace-id>/chatSessions/<session-id>.{json,jsonl}`.
//! When both extensions exist for one session the `.jsonl` mutation log is
//! the current one; visiting names in sorted order puts it after the `.json`
//! so it overwrites the older summary.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::SESSIONS_SUBDIR;
use crate::decoder::read_session_file;
use crate::document::SessionDocument;
use crate::reboot::{RebootExtraction, extract_reboots};
use crate::util::system_time_millis;

const SESSION_EXTENSIONS: [&str; 2] = ["jsonl", "json"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    /// Epoch millis; 0 when the session carries no timestamp at all.
    pub first_message_time: i64,
    /// Present (non-hole) requests only.
    pub request_count: usize,
    /// File mtime in epoch millis.
    pub modified_time: i64,
    pub custom_title: Option<String>,
    pub reboot_data: RebootExtraction,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedSession {
    pub workspace_id: String,
    pub summary: SessionSummary,
}

#[derive(Debug, Clone)]
pub struct SessionRepository {
    storage_root: PathBuf,
}

impl SessionRepository {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn sessions_dir(&self, workspace_id: &str) -> PathBuf {
        self.storage_root.join(workspace_id).join(SESSIONS_SUBDIR)
    }

    /// Summaries for every session in a workspace that has at least one
    /// present request, ordered by session id.
    pub fn read_sessions(&self, workspace_id: &str) -> Vec<SessionSummary> {
        let sessions_dir = self.sessions_dir(workspace_id);
        let mut sessions: BTreeMap<String, SessionSummary> = BTreeMap::new();

        for entry in WalkDir::new(&sessions_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if !entry.file_type().is_file() || session_id_of(entry.path()).is_none() {
                continue;
            }
            let Some(summary) = summarize_file(entry.path()) else {
                continue;
            };
            if summary.request_count == 0 {
                debug!(session = %summary.id, "skipping session without requests");
                continue;
            }
            sessions.insert(summary.id.clone(), summary);
        }

        debug!(
            workspace = workspace_id,
            count = sessions.len(),
            "enumerated sessions"
        );
        sessions.into_values().collect()
    }

    /// Workspace whose sessions folder was touched most recently.
    pub fn discover_workspace(&self) -> Option<String> {
        let mut best: Option<(SystemTime, String)> = None;

        for workspace_id in self.workspace_ids() {
            let Ok(modified) =
                fs::metadata(self.sessions_dir(&workspace_id)).and_then(|meta| meta.modified())
            else {
                continue;
            };
            if best.as_ref().is_none_or(|(newest, _)| modified > *newest) {
                best = Some((modified, workspace_id));
            }
        }

        best.map(|(_, workspace_id)| workspace_id)
    }

    /// Looks a session up by id, in one workspace or across all of them.
    pub fn find_session_by_id(
        &self,
        session_id: &str,
        workspace_id: Option<&str>,
    ) -> Option<LocatedSession> {
        let workspaces = match workspace_id {
            Some(workspace_id) => vec![workspace_id.to_string()],
            None => self.workspace_ids(),
        };

        for workspace_id in workspaces {
            let sessions_dir = self.sessions_dir(&workspace_id);
            for ext in SESSION_EXTENSIONS {
                let path = sessions_dir.join(format!("{session_id}.{ext}"));
                if !path.is_file() {
                    continue;
                }
                if let Some(summary) = summarize_file(&path) {
                    return Some(LocatedSession {
                        workspace_id,
                        summary,
                    });
                }
            }
        }
        None
    }

    fn workspace_ids(&self) -> Vec<String> {
        WalkDir::new(&self.storage_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(ToString::to_string))
            .collect()
    }
}

/// Decodes one session file and rolls it up. `None` when the file does not
/// decode or has no usable name.
pub fn summarize_file(path: &Path) -> Option<SessionSummary> {
    let id = session_id_of(path)?;
    let document = SessionDocument::from_value(&read_session_file(path)?);
    let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "session file has no mtime");
            return None;
        }
    };

    Some(SessionSummary {
        id: id.to_string(),
        first_message_time: document.first_message_time(),
        request_count: document.request_count(),
        modified_time: system_time_millis(modified),
        custom_title: document.custom_title.clone(),
        reboot_data: extract_reboots(&document),
        file_path: path.to_path_buf(),
    })
}

/// Most recently modified session; the earlier entry wins a tie.
pub fn find_current_session(sessions: &[SessionSummary]) -> Option<&SessionSummary> {
    sessions
        .iter()
        .min_by_key(|session| Reverse(session.modified_time))
}

fn session_id_of(path: &Path) -> Option<&str> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    if !SESSION_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
}
