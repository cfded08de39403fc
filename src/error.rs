use thiserror::Error;

/// Durable-storage failures (snapshot store, change log, metadata).
///
/// A storage failure never leaves a partially written file behind: all
/// writes go through a temp-file-then-rename replace.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encode/decode failed for '{path}': {message}")]
    Codec { path: String, message: String },
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn codec(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Codec {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Failures of one sync cycle, caught at the orchestrator boundary.
///
/// `Fetch` and `Parse` abort the cycle before any write, so the prior
/// snapshot, metadata and change log stay untouched and remain servable.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network, timeout or HTTP error from the upstream API.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// Upstream responded, but the payload was malformed.
    #[error("malformed upstream payload: {0}")]
    Parse(String),
    /// Disk failure while persisting the cycle's output.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
