use std::path::PathBuf;

use thiserror::Error;

use super::types::{BlockId, DeleteStats};

#[derive(Debug, Error)]
/// Errors returned by a block cache tier (and passed through by the tiered cache).
pub enum CacheError {
    /// The block is not present in the tier that was asked.
    #[error("no such block in cache: {block_id}")]
    NoSuchBlock {
        /// Block that was looked up.
        block_id: BlockId,
    },

    /// The tier could not be created or opened.
    #[error("failed to initialize block cache at {path}: {reason}")]
    Init {
        /// Root directory of the tier.
        path: PathBuf,
        /// Error message.
        reason: String,
    },

    /// IO error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The tier has already been shut down.
    #[error("block cache has been shut down")]
    Shutdown,
}

impl CacheError {
    /// Returns `true` for the one error kind the tiered cache falls back on.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NoSuchBlock { .. })
    }

    pub(crate) fn background_task(err: tokio::task::JoinError) -> Self {
        CacheError::Io(std::io::Error::other(err))
    }
}

/// Convenience result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// A delete that failed part-way. `completed` still counts what was removed.
#[derive(Debug, Error)]
#[error("delete failed after removing {} blocks ({} bytes): {source}", completed.removed, completed.bytes_removed)]
pub struct DeleteError {
    pub completed: DeleteStats,
    #[source]
    pub source: CacheError,
}

impl DeleteError {
    pub fn new(completed: DeleteStats, source: CacheError) -> Self {
        Self { completed, source }
    }
}

impl From<CacheError> for DeleteError {
    fn from(source: CacheError) -> Self {
        Self::new(DeleteStats::default(), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_no_such_block_is_not_found() {
        let id = BlockId::from_content(b"a");

        assert!(CacheError::NoSuchBlock { block_id: id }.is_not_found());
        assert!(!CacheError::Cancelled.is_not_found());
        assert!(!CacheError::Shutdown.is_not_found());
        assert!(
            !CacheError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_not_found()
        );
    }

    #[test]
    fn test_delete_error_reports_partial_counts() {
        let err = DeleteError::new(DeleteStats::new(2, 64), CacheError::Cancelled);
        let msg = err.to_string();

        assert!(msg.contains("2 blocks"));
        assert!(msg.contains("64 bytes"));
        assert!(msg.contains("operation cancelled"));
    }
}
