//! Error types shared across the monitor core.
//!
//! Errors are split by how the pipeline reacts to them:
//! - `ConfigError`: fatal, surfaced at construction before anything runs
//! - `TransportError`: one poll tick failed, logged and retried next tick
//! - `RconError`: session failures, routed into the reconnect state machine
//! - `CheckpointError`: resume file unreadable, reader falls back to offset 0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("invalid pattern for {name}: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected http status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("ftp error: {0}")]
    Ftp(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum RconError {
    #[error("not connected (state: {0})")]
    NotConnected(String),

    #[error("login rejected by server")]
    LoginRejected,

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("session closed")]
    SessionClosed,

    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt checkpoint {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
