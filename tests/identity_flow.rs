use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde_json::{Value, json};
use tempfile::TempDir;

use qhoami::config::{RolePolicy, SESSIONS_SUBDIR};
use qhoami::identity::{IdentityQuery, Role, compute_identity};
use qhoami::repository::SessionRepository;

fn compaction(ts: i64, summary: Option<&str>) -> Value {
    let mut request = json!({
        "timestamp": ts,
        "response": [
            {"kind": "markdownContent", "content": {"value": "working"}},
            {"kind": "progressTaskSerialized", "content": {"value": "Compacted conversation"}}
        ]
    });
    if let Some(summary) = summary {
        request["result"] = json!({"metadata": {"summary": {"text": summary}}});
    }
    request
}

fn write(root: &Path, workspace: &str, file: &str, body: &str, mtime_secs: u64) {
    let dir = root.join(workspace).join(SESSIONS_SUBDIR);
    fs::create_dir_all(&dir).expect("sessions dir");
    let path = dir.join(file);
    fs::write(&path, body).expect("write session");
    fs::File::open(&path)
        .expect("open")
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs))
        .expect("mtime");
}

fn log(lines: &[Value]) -> String {
    lines
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Workspace "ws" with three sessions:
/// * `first`  (flat, oldest first message)
/// * `second` (mutation log with appended turns and compactions; newest mtime)
/// * `third`  (flat, title-tagged, first message in between)
fn fixture() -> TempDir {
    let tmp = TempDir::new().expect("temp dir");
    let root = tmp.path();

    write(
        root,
        "ws",
        "first.json",
        &json!({"requests": [{"timestamp": 1_000}]}).to_string(),
        100,
    );

    let second = log(&[
        json!({"kind": 0, "v": {"customTitle": null, "requests": [{"timestamp": 3_000}]}}),
        json!({"kind": 2, "k": ["requests"], "v": [compaction(4_000, Some("alpha"))]}),
        json!({"kind": 2, "k": ["requests"], "v": [compaction(5_000, Some("alpha"))]}),
        json!({"kind": 9, "k": ["requests"], "v": [{"timestamp": 1}]}),
        json!({"kind": 2, "k": ["requests"], "v": [compaction(6_000, None)]}),
        json!({"kind": 2, "k": ["requests"], "v": [compaction(7_000, Some("beta"))]}),
        json!({"kind": 2, "k": ["requests"], "v": [{"timestamp": 8_000}, {"timestamp": 9_000}]}),
        json!({"kind": 1, "k": ["customTitle"], "v": "sprint /AS/0.5.Q/ quest"}),
    ]);
    write(root, "ws", "second.json", &json!({"requests": []}).to_string(), 150);
    write(root, "ws", "second.jsonl", &second, 300);

    write(
        root,
        "ws",
        "third.json",
        &json!({"customTitle": "/1.2.Q/", "requests": [null, {"timestamp": 2_000}]}).to_string(),
        200,
    );
    tmp
}

#[test]
fn most_recent_session_identity() {
    let tmp = fixture();
    let repo = SessionRepository::new(tmp.path());
    let query = IdentityQuery {
        session_id: None,
        workspace_id: Some("ws".to_string()),
    };

    let identity = compute_identity(&repo, &query, &RolePolicy::default());

    assert_eq!(identity.session_id.as_deref(), Some("second"));
    assert_eq!(identity.total_sessions, 3);
    assert_eq!(identity.session_birth_order, 3);
    assert_eq!(identity.request_count, 7);
    assert_eq!(identity.raw_marker_patch, 4);
    assert_eq!(identity.patch, 2);
    assert_eq!(identity.cq.as_deref(), Some("0.3.2"));
    assert_eq!(identity.kq.as_deref(), Some("0.0.5.2"));
    assert_eq!(identity.role, Some(Role::Quester));
    // last ground-truth reboot is request 4 of 7
    assert_eq!(identity.requests_since_compaction, 2);
    assert_eq!(
        identity.last_reboot_at.as_deref(),
        Some("1970-01-01T00:00:07.000Z")
    );
    let indices: Vec<usize> = identity.reboots.iter().map(|event| event.index).collect();
    assert_eq!(indices, vec![1, 4]);
}

#[test]
fn explicit_session_birth_order_and_role() {
    let tmp = fixture();
    let repo = SessionRepository::new(tmp.path());

    let first = compute_identity(
        &repo,
        &IdentityQuery {
            session_id: Some("first".into()),
            workspace_id: Some("ws".into()),
        },
        &RolePolicy::default(),
    );
    assert_eq!(first.session_birth_order, 1);
    assert_eq!(first.cq.as_deref(), Some("0.1.0"));

    let third = compute_identity(
        &repo,
        &IdentityQuery {
            session_id: Some("third".into()),
            workspace_id: Some("ws".into()),
        },
        &RolePolicy::default(),
    );
    assert_eq!(third.session_birth_order, 2);
    assert_eq!(third.request_count, 1);
    assert_eq!(third.kq.as_deref(), Some("0.1.2.0"));
    assert_eq!(third.role, Some(Role::DomainSpecialist));
}

#[test]
fn unknown_session_yields_empty_record() {
    let tmp = fixture();
    let repo = SessionRepository::new(tmp.path());
    let identity = compute_identity(
        &repo,
        &IdentityQuery {
            session_id: Some("does-not-exist".into()),
            workspace_id: Some("ws".into()),
        },
        &RolePolicy::default(),
    );

    assert!(!identity.is_resolved());
    assert_eq!(identity.session_birth_order, -1);
    assert_eq!(identity.cq, None);
    assert_eq!(identity.kq, None);
    assert_eq!(identity.workspace_id.as_deref(), Some("ws"));
    assert_eq!(identity.total_sessions, 3);
    assert_eq!(identity.session_id.as_deref(), Some("does-not-exist"));
}

#[test]
fn missing_storage_yields_empty_record_without_workspace() {
    let tmp = TempDir::new().expect("temp dir");
    let repo = SessionRepository::new(tmp.path().join("workspaceStorage"));
    let identity = compute_identity(&repo, &IdentityQuery::default(), &RolePolicy::default());

    assert_eq!(identity.workspace_id, None);
    assert_eq!(identity.session_birth_order, -1);
    assert_eq!(identity.total_sessions, 0);
}

#[test]
fn workspace_is_discovered_when_not_given() {
    let tmp = fixture();
    let repo = SessionRepository::new(tmp.path());
    let identity = compute_identity(&repo, &IdentityQuery::default(), &RolePolicy::default());
    assert_eq!(identity.workspace_id.as_deref(), Some("ws"));
    assert_eq!(identity.session_id.as_deref(), Some("second"));
}

#[test]
fn identity_record_is_flat_json() {
    let tmp = fixture();
    let repo = SessionRepository::new(tmp.path());
    let identity = compute_identity(
        &repo,
        &IdentityQuery {
            session_id: Some("second".into()),
            workspace_id: Some("ws".into()),
        },
        &RolePolicy::default(),
    );
    let value = serde_json::to_value(&identity).expect("serialize");

    assert_eq!(value["sessionId"], "second");
    assert_eq!(value["workspaceHash"], "ws");
    assert_eq!(value["rawMarkerPatch"], 4);
    assert_eq!(value["role"], "quester");
    assert_eq!(value["requestsSinceCompaction"], 2);
    assert_eq!(value["firstMessageAt"], "1970-01-01T00:00:03.000Z");
    assert!(value["reboots"][0]["summaryHash"].is_string());
}
