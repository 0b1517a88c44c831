use std::path::PathBuf;
use std::time::Duration;

use hickory_proto::error::ProtoError;
use thiserror::Error;

/// Failures a resolver can report.
///
/// Upstream failures (timeouts, socket errors, undecodable replies) are
/// transient: composite resolvers treat them as "try the next source".
/// Configuration and fixture errors mean the setup itself is broken and are
/// passed through to the caller.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("upstream {server} timed out after {timeout:?}")]
    Timeout { server: String, timeout: Duration },

    #[error("upstream {server}: {source}")]
    Io {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dns message: {0}")]
    Proto(#[from] ProtoError),

    #[error("read resolver config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse resolver config {} line {line}: {reason}", path.display())]
    ConfigParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("malformed record {record:?}: {reason}")]
    MalformedRecord { record: String, reason: String },
}

impl ResolveError {
    pub fn malformed(record: &str, reason: impl Into<String>) -> Self {
        ResolveError::MalformedRecord {
            record: record.to_string(),
            reason: reason.into(),
        }
    }

    /// Transient errors are absorbed by fallback chains.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResolveError::Timeout { .. } | ResolveError::Io { .. } | ResolveError::Proto(_)
        )
    }
}
