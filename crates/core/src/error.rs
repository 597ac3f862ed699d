//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
///
/// Every variant is an invalid-request class error: a request failing these
/// checks is rejected before any storage mutation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("total_chunks must be at least 1")]
    InvalidTotalChunks,

    #[error("chunk index {index} out of range for {total} chunks")]
    ChunkIndexOutOfRange { index: u32, total: u32 },

    #[error("total_chunks mismatch: session declared {declared}, request has {got}")]
    TotalChunksMismatch { declared: u32, got: u32 },

    #[error("filename mismatch: session declared {declared:?}, request has {got:?}")]
    FilenameMismatch { declared: String, got: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
