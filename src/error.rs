use std::path::PathBuf;
use thiserror::Error;

use crate::intent::types::EntityKey;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder unavailable: {0}")]
    Unavailable(String),
    #[error("encoder timed out after {0}ms")]
    Timeout(u64),
    #[error("encoding cancelled")]
    Cancelled,
    #[error("encoder returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
    #[error("embedding server returned status {0}")]
    Status(u16),
    #[error("malformed encoder response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("entity recognizer unavailable")]
    Unavailable,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read definitions from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse definitions: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid thresholds: {0}")]
    Thresholds(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("no action registered for {0}")]
    UnknownAction(String),
    #[error("{intent} requires entity '{key}'")]
    MissingEntity { intent: String, key: EntityKey },
}
