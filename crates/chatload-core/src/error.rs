use std::path::PathBuf;
use std::time::Duration;

/// Failure to open (or re-open) a room connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("connect to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("handshake with {url} rejected: {reason}")]
    Rejected { url: String, reason: String },

    #[error("invalid target url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure of a single send/ack exchange on an open connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    #[error("no acknowledgment within {0:?}")]
    AckTimeout(Duration),

    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Returned by a producer `put` once every consumer has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("work queue closed: no consumers left")]
pub struct QueueClosed;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Why a single retry attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Connect(#[from] ConnectionError),

    #[error(transparent)]
    Send(#[from] SendError),
}
