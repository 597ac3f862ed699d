//! Engine error types.

use stitch_core::SessionId;
use thiserror::Error;

/// Errors surfaced by the upload engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required chunk was absent at merge time. The client recovers by
    /// re-sending the chunk, then re-sending the final chunk to re-trigger
    /// the merge.
    #[error("missing chunk {0} at merge time")]
    MissingChunk(u32),

    #[error("merge already in progress for session {0}")]
    MergeInProgress(SessionId),

    #[error("invalid request: {0}")]
    Request(#[from] stitch_core::Error),

    #[error("storage error: {0}")]
    Storage(#[from] stitch_storage::StorageError),
}

impl EngineError {
    /// Whether the client can recover by re-sending chunks, as opposed to
    /// an I/O failure that may need operator attention.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::MissingChunk(_) | Self::MergeInProgress(_))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
