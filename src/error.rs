use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read session file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON on line {line}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("mutation log has no records")]
    Empty,
    #[error("first mutation log record is not a snapshot")]
    MissingSnapshot,
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
