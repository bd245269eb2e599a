//! Compaction ("reboot") detection.
//!
//! The editor marks a finished compaction with a progress-task response part.
//! Both the part kind and its text changed between editor releases, so every
//! known spelling is listed here. A marker alone is not trustworthy: cancelled
//! compactions leave a marker without a summary, and mutation-log replay can
//! repeat a marker for the same summary. The ground-truth list only counts a
//! request when its summary hash differs from the previous counted one.

use serde::Serialize;

use crate::document::{Request, SessionDocument};
use crate::util::iso_millis;

pub const UNKNOWN_TIMESTAMP: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Older editor releases.
    ProgressTask,
    ProgressTaskSerialized,
}

impl MarkerKind {
    pub const ALL: [Self; 2] = [Self::ProgressTask, Self::ProgressTaskSerialized];

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::ProgressTask => "progressTask",
            Self::ProgressTaskSerialized => "progressTaskSerialized",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.wire_name() == kind)
    }
}

/// Texts of a completed compaction. "Compacting conversation..." is the
/// in-progress label and is intentionally absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerText {
    SummarizedHistory,
    CompactedConversation,
}

impl MarkerText {
    pub const ALL: [Self; 2] = [Self::SummarizedHistory, Self::CompactedConversation];

    pub fn wire_text(self) -> &'static str {
        match self {
            Self::SummarizedHistory => "Summarized conversation history",
            Self::CompactedConversation => "Compacted conversation",
        }
    }

    pub fn from_wire(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.wire_text() == text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRebootEvent {
    pub index: usize,
    pub at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebootEvent {
    pub index: usize,
    pub at: String,
    pub summary_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebootExtraction {
    /// Raw marker count, diagnostic only.
    pub count: usize,
    /// Authoritative reboot count.
    pub ground_truth: usize,
    pub events: Vec<RawRebootEvent>,
    pub events_ground_truth: Vec<RebootEvent>,
}

impl RebootExtraction {
    pub fn last_reboot(&self) -> Option<&RebootEvent> {
        self.events_ground_truth.last()
    }
}

pub fn extract_reboots(document: &SessionDocument) -> RebootExtraction {
    let mut events = Vec::new();
    let mut events_ground_truth = Vec::new();
    let mut previous_hash: Option<String> = None;

    for (index, request) in document.present_requests() {
        if !has_completion_marker(request) {
            continue;
        }

        let at = request
            .timestamp
            .and_then(iso_millis)
            .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string());
        events.push(RawRebootEvent {
            index,
            at: at.clone(),
        });

        // Phantom markers carry no summary and leave the tracker untouched.
        let Some(summary) = request.summary_text.as_deref() else {
            continue;
        };
        let hash = summary_hash(summary);
        if previous_hash.as_deref() != Some(hash.as_str()) {
            previous_hash = Some(hash.clone());
            events_ground_truth.push(RebootEvent {
                index,
                at,
                summary_hash: hash,
            });
        }
    }

    RebootExtraction {
        count: events.len(),
        ground_truth: events_ground_truth.len(),
        events,
        events_ground_truth,
    }
}

pub fn summary_hash(summary: &str) -> String {
    format!("{:x}", md5::compute(summary.as_bytes()))
}

// Duplicate marker parts in one request still count once.
fn has_completion_marker(request: &Request) -> bool {
    request.response.iter().any(|part| {
        part.kind.as_deref().and_then(MarkerKind::from_wire).is_some()
            && part
                .content_value
                .as_deref()
                .and_then(MarkerText::from_wire)
                .is_some()
    })
}
