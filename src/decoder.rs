//! Session file decoding.
//!
//! The editor writes chat sessions in one of two shapes:
//!
//! * `.json`: a monolithic snapshot of the whole session object.
//! * `.jsonl`: a mutation log. The first record is a snapshot (`kind: 0`),
//!   every following record patches it in place:
//!   `kind: 1` sets the value at key path `k`, `kind: 2` appends the items of
//!   `v` to the sequence at `k`.
//!
//! New conversation turns arrive as `kind: 2` appends onto `requests`, so a
//! replay that ignores them freezes the request list at snapshot time.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{DecodeError, DecodeResult};

const OPCODE_SNAPSHOT: u64 = 0;
const OPCODE_SET: u64 = 1;
const OPCODE_APPEND: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFormat {
    Flat,
    MutationLog,
}

impl SessionFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jsonl") => Self::MutationLog,
            _ => Self::Flat,
        }
    }
}

/// One segment of a mutation key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    Index(usize),
    Field(String),
}

impl PathKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(field) => Some(Self::Field(field.clone())),
            Value::Number(number) => number
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Self::Index),
            _ => None,
        }
    }

    fn empty_container(&self) -> Value {
        match self {
            Self::Index(_) => Value::Array(Vec::new()),
            Self::Field(_) => Value::Object(serde_json::Map::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Snapshot(Value),
    Set { path: Vec<PathKey>, value: Value },
    Append { path: Vec<PathKey>, items: Vec<Value> },
    /// Unrecognised opcode or malformed key path; skipped on replay.
    Unknown,
}

impl Operation {
    pub fn from_record(mut record: Value) -> Self {
        let opcode = record.get("kind").and_then(Value::as_u64);
        let value = record
            .get_mut("v")
            .map(Value::take)
            .unwrap_or(Value::Null);

        if opcode == Some(OPCODE_SNAPSHOT) {
            return Self::Snapshot(value);
        }

        let Some(path) = record
            .get("k")
            .and_then(Value::as_array)
            .and_then(|keys| keys.iter().map(PathKey::from_value).collect::<Option<Vec<_>>>())
        else {
            return Self::Unknown;
        };

        match (opcode, value) {
            (Some(OPCODE_SET), value) => Self::Set { path, value },
            (Some(OPCODE_APPEND), Value::Array(items)) => Self::Append { path, items },
            _ => Self::Unknown,
        }
    }
}

/// Decodes session file content. Trailing whitespace is ignored.
pub fn decode_str(content: &str, format: SessionFormat) -> DecodeResult<Value> {
    let content = content.trim_end();
    match format {
        SessionFormat::Flat => serde_json::from_str(content).map_err(|source| DecodeError::Json {
            line: source.line(),
            source,
        }),
        SessionFormat::MutationLog => replay_log(content),
    }
}

/// Invalid UTF-8 is replaced with U+FFFD rather than failing the file.
pub fn try_read_session_file(path: &Path) -> DecodeResult<Value> {
    let raw = fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_str(&String::from_utf8_lossy(&raw), SessionFormat::from_path(path))
}

/// Reads and decodes a session file. Any failure means "no document".
pub fn read_session_file(path: &Path) -> Option<Value> {
    match try_read_session_file(path) {
        Ok(document) => Some(document),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "skipping undecodable session file");
            None
        }
    }
}

fn replay_log(content: &str) -> DecodeResult<Value> {
    let mut operations = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_record(idx + 1, line));

    let first = operations.next().ok_or(DecodeError::Empty)??;
    let Operation::Snapshot(snapshot) = first else {
        return Err(DecodeError::MissingSnapshot);
    };

    operations.try_fold(snapshot, |mut document, operation| -> DecodeResult<Value> {
        apply_operation(&mut document, operation?);
        Ok(document)
    })
}

fn parse_record(line: usize, text: &str) -> DecodeResult<Operation> {
    serde_json::from_str::<Value>(text)
        .map(Operation::from_record)
        .map_err(|source| DecodeError::Json { line, source })
}

/// Applies one patch. Returns `false` when the operation was skipped.
pub fn apply_operation(document: &mut Value, operation: Operation) -> bool {
    match operation {
        Operation::Set { path, value } => set_at(document, &path, value),
        Operation::Append { path, items } => append_at(document, &path, items),
        Operation::Snapshot(_) | Operation::Unknown => false,
    }
}

pub fn set_at(root: &mut Value, path: &[PathKey], value: Value) -> bool {
    let Some(slot) = leaf_slot(root, path) else {
        return false;
    };
    *slot = value;
    true
}

pub fn append_at(root: &mut Value, path: &[PathKey], items: Vec<Value>) -> bool {
    let Some(slot) = leaf_slot(root, path) else {
        return false;
    };
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    if let Value::Array(existing) = slot {
        existing.extend(items);
    }
    true
}

fn leaf_slot<'a>(root: &'a mut Value, path: &[PathKey]) -> Option<&'a mut Value> {
    let (leaf, parents) = path.split_last()?;
    let parent = container_at(root, parents, leaf)?;
    slot_mut(parent, leaf)
}

/// Walks `parents` from `root`, creating missing (or null) containers on the
/// way. The container type follows the key that will index into it.
pub fn container_at<'a>(
    root: &'a mut Value,
    parents: &[PathKey],
    leaf: &PathKey,
) -> Option<&'a mut Value> {
    let mut cursor = root;
    for (idx, key) in parents.iter().enumerate() {
        let next = parents.get(idx + 1).unwrap_or(leaf);
        let slot = slot_mut(cursor, key)?;
        if slot.is_null() {
            *slot = next.empty_container();
        }
        cursor = slot;
    }
    Some(cursor)
}

fn slot_mut<'a>(node: &'a mut Value, key: &PathKey) -> Option<&'a mut Value> {
    match (node, key) {
        (Value::Object(map), PathKey::Field(field)) => {
            Some(map.entry(field.clone()).or_insert(Value::Null))
        }
        (Value::Object(map), PathKey::Index(index)) => {
            Some(map.entry(index.to_string()).or_insert(Value::Null))
        }
        (Value::Array(items), PathKey::Index(index)) => index_slot(items, *index),
        (Value::Array(items), PathKey::Field(field)) => {
            let index = field.parse::<usize>().ok()?;
            index_slot(items, index)
        }
        _ => None,
    }
}

/// Most null padding a single write may add past the end of a sequence.
pub const MAX_SPARSE_GAP: usize = 1024;

// Indices further than `MAX_SPARSE_GAP` past the end are unreachable.
fn index_slot(items: &mut Vec<Value>, index: usize) -> Option<&mut Value> {
    if index >= items.len() {
        if index - items.len() > MAX_SPARSE_GAP {
            return None;
        }
        items.resize(index.checked_add(1)?, Value::Null);
    }
    items.get_mut(index)
}
