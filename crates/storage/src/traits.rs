//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use stitch_core::{ChunkEntry, SessionId, SessionMeta};

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Per-session chunk storage.
///
/// Chunks are owned by this store until the merge engine consumes them
/// (read followed by delete). A chunk write must be durable before it
/// becomes visible to `list`.
#[async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    /// Persist or overwrite a chunk. Creates the session's storage area on
    /// first write.
    async fn put(&self, session: &SessionId, index: u32, data: Bytes) -> StorageResult<()>;

    /// List committed chunks, sorted by index. Empty for unknown sessions.
    async fn list(&self, session: &SessionId) -> StorageResult<Vec<ChunkEntry>>;

    /// Open a chunk for streaming reads.
    async fn get_stream(&self, session: &SessionId, index: u32) -> StorageResult<ByteStream>;

    /// Delete a single chunk.
    async fn remove(&self, session: &SessionId, index: u32) -> StorageResult<()>;

    /// Remove the session's entire storage area. Idempotent: an absent
    /// session is not an error.
    async fn purge_session(&self, session: &SessionId) -> StorageResult<()>;

    /// Read the session metadata record, if one has been written.
    async fn read_meta(&self, session: &SessionId) -> StorageResult<Option<SessionMeta>>;

    /// Write or replace the session metadata record.
    async fn write_meta(&self, session: &SessionId, meta: &SessionMeta) -> StorageResult<()>;

    /// Enumerate sessions with a storage area on disk.
    async fn sessions(&self) -> StorageResult<Vec<SessionId>>;
}

/// A completed file as reported by the final store listing.
#[derive(Clone, Debug)]
pub struct FinalFile {
    /// Filename under the completed area.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub modified: Option<time::OffsetDateTime>,
}

/// Storage for completed files.
#[async_trait]
pub trait FinalStore: Send + Sync + 'static {
    /// Check whether a completed file exists under the given name.
    async fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Open a sink for a new completed file.
    ///
    /// The file must not be observable under `name` until the sink's
    /// `finish` returns.
    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn FileSink>>;

    /// List completed files, excluding the temporary partition and any
    /// in-flight output files.
    async fn list(&self) -> StorageResult<Vec<FinalFile>>;
}

/// Trait for streaming writes of a completed file.
#[async_trait]
pub trait FileSink: Send {
    /// Append a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Flush durably and publish atomically under the final name.
    ///
    /// On failure the partial output is removed before the error returns; a
    /// file visible under the final name is always complete.
    async fn finish(self: Box<Self>) -> StorageResult<PathBuf>;

    /// Abort the write and discard the partial output.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
