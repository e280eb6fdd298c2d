use std::path::PathBuf;
use thiserror::Error;

/// Failure to pull the message text out of an attributed-body blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("attributed body does not contain a string")]
    NoString,
    #[error("attributed body contains {count} strings, expected exactly one")]
    MultipleStrings { count: usize },
    #[error("attributed body truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("unexpected byte {byte:#04x} at offset {offset}")]
    Malformed { offset: usize, byte: u8 },
    #[error("attributed body string is not valid UTF-8")]
    InvalidUtf8,
    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("archive not available at {}: {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("sender {0:?} is not in the configured user map")]
    UnknownIdentity(String),
    #[error("archive query failed: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to decode message at {timestamp}: {source}")]
    Decode {
        timestamp: String,
        #[source]
        source: DecodeError,
    },
}
