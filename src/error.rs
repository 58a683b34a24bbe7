//! Error types

use thiserror::Error;

/// Failures while starting or consuming an agent query.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("failed to spawn agent `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed stream line: {message} (line: {line})")]
    Parse { line: String, message: String },
    #[error("agent exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },
    #[error("agent stream closed: {0}")]
    Closed(String),
}

/// Failures while delivering a notification to the sink.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification bus unavailable ({path}): {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sink poisoned")]
    Poisoned,
    #[error("notification queue full, dropping notification")]
    QueueFull,
    #[error("notification writer stopped")]
    Closed,
}

/// Failures at the inbound message boundary.
#[derive(Error, Debug)]
pub enum InboundError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
