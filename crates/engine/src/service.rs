//! Upload service facade.
//!
//! The operation set a transport collaborator (HTTP, CLI) binds to:
//! receive a chunk, query the resume point, poll merge completion, and list
//! partial and completed uploads. Wire formats, multipart decoding, and
//! filename normalization are the collaborator's concern; everything here
//! takes already-decoded values.

use crate::error::{EngineError, EngineResult};
use crate::merge::MergeEngine;
use crate::metrics;
use crate::tracker::{PartialUpload, Progress, SessionTracker};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stitch_core::{Error as RequestError, SessionId, SessionMeta, validate_filename};
use stitch_storage::{ChunkStore, FinalFile, FinalStore};

/// A chunk receipt request.
#[derive(Clone)]
pub struct ReceiveChunk {
    /// Client-chosen session id, stable across all chunks of one transfer.
    pub session_id: String,
    /// Position of this chunk, in `[0, total_chunks)`.
    pub chunk_index: u32,
    /// Declared chunk count, fixed for the session's lifetime.
    pub total_chunks: u32,
    /// Already-decoded target filename.
    pub filename: String,
    /// Declared total size in bytes, for progress display only.
    pub declared_size: Option<u64>,
    /// The chunk payload.
    pub payload: Bytes,
}

impl fmt::Debug for ReceiveChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveChunk")
            .field("session_id", &self.session_id)
            .field("chunk_index", &self.chunk_index)
            .field("total_chunks", &self.total_chunks)
            .field("filename", &self.filename)
            .field("declared_size", &self.declared_size)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Outcome of a chunk receipt.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Chunk stored; more chunks expected.
    Accepted,
    /// Final chunk stored and the session merged into the completed file.
    Merged(PathBuf),
}

/// Merge-completion poll result.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct MergeStatus {
    pub merged: bool,
}

/// The upload engine facade.
pub struct UploadService {
    chunks: Arc<dyn ChunkStore>,
    finals: Arc<dyn FinalStore>,
    tracker: SessionTracker,
    merger: MergeEngine,
    /// Sessions with a merge walk in flight. Guards only set membership;
    /// no I/O happens under this lock.
    merging: Mutex<HashSet<SessionId>>,
}

impl UploadService {
    /// Create the service over the given stores.
    pub fn new(chunks: Arc<dyn ChunkStore>, finals: Arc<dyn FinalStore>) -> Self {
        Self {
            tracker: SessionTracker::new(chunks.clone()),
            merger: MergeEngine::new(chunks.clone(), finals.clone()),
            chunks,
            finals,
            merging: Mutex::new(HashSet::new()),
        }
    }

    /// Validate and store a chunk; run the merge when the declared final
    /// chunk arrives.
    ///
    /// All validation happens before any storage mutation. The merge is
    /// triggered by the receipt of index `total_chunks - 1`, not by a
    /// completeness scan; a session missing earlier chunks fails the merge
    /// with [`EngineError::MissingChunk`] and keeps its chunks for resume.
    #[tracing::instrument(
        skip(self, req),
        fields(session_id = %req.session_id, chunk_index = req.chunk_index)
    )]
    pub async fn receive_chunk(&self, req: ReceiveChunk) -> EngineResult<ChunkOutcome> {
        let session = SessionId::parse(&req.session_id)?;
        validate_filename(&req.filename)?;
        if req.total_chunks == 0 {
            return Err(RequestError::InvalidTotalChunks.into());
        }
        if req.chunk_index >= req.total_chunks {
            return Err(RequestError::ChunkIndexOutOfRange {
                index: req.chunk_index,
                total: req.total_chunks,
            }
            .into());
        }

        // Declarations are fixed once made for the session's lifetime.
        let meta = match self.chunks.read_meta(&session).await? {
            Some(existing) => {
                if existing.total_chunks != req.total_chunks {
                    return Err(RequestError::TotalChunksMismatch {
                        declared: existing.total_chunks,
                        got: req.total_chunks,
                    }
                    .into());
                }
                if existing.target_filename != req.filename {
                    return Err(RequestError::FilenameMismatch {
                        declared: existing.target_filename.clone(),
                        got: req.filename.clone(),
                    }
                    .into());
                }
                existing
            }
            None => {
                let meta = SessionMeta::new(&req.filename, req.total_chunks, req.declared_size);
                self.chunks.write_meta(&session, &meta).await?;
                meta
            }
        };

        let size = req.payload.len() as u64;
        self.chunks.put(&session, req.chunk_index, req.payload).await?;
        metrics::CHUNKS_RECEIVED.inc();
        metrics::CHUNK_BYTES_RECEIVED.inc_by(size);
        tracing::debug!(size, "chunk stored");

        if req.chunk_index == meta.last_chunk_index() {
            let path = self.merge_exclusive(&session, &meta).await?;
            return Ok(ChunkOutcome::Merged(path));
        }

        Ok(ChunkOutcome::Accepted)
    }

    /// Lowest chunk index the session is still missing. Unknown sessions
    /// start from zero.
    pub async fn next_chunk(&self, session_id: &str) -> EngineResult<u32> {
        let session = SessionId::parse(session_id)?;
        self.tracker.next_expected(&session).await
    }

    /// Whether a completed file exists under the given name. Existence is
    /// the sole completion signal.
    pub async fn merge_status(&self, filename: &str) -> EngineResult<MergeStatus> {
        validate_filename(filename)?;
        Ok(MergeStatus {
            merged: self.finals.exists(filename).await?,
        })
    }

    /// Byte progress of one session against its declared size.
    pub async fn progress(&self, session_id: &str) -> EngineResult<Progress> {
        let session = SessionId::parse(session_id)?;
        self.tracker.progress(&session).await
    }

    /// Every session with at least one chunk and no completed merge.
    pub async fn list_partial_uploads(&self) -> EngineResult<Vec<PartialUpload>> {
        self.tracker.list_all_partial().await
    }

    /// Completed files, excluding the temporary partition.
    pub async fn list_completed_files(&self) -> EngineResult<Vec<FinalFile>> {
        Ok(self.finals.list().await?)
    }

    /// Remove a session's temporary area. Idempotent; the hook for an
    /// external stale-session sweep.
    pub async fn purge_session(&self, session_id: &str) -> EngineResult<()> {
        let session = SessionId::parse(session_id)?;
        self.chunks.purge_session(&session).await?;
        metrics::SESSIONS_PURGED.inc();
        Ok(())
    }

    /// Run the merge with per-session exclusivity: only one chunk carries
    /// the final index, but an erroneously duplicated trigger must not
    /// start a second walk over the same session.
    async fn merge_exclusive(
        &self,
        session: &SessionId,
        meta: &SessionMeta,
    ) -> EngineResult<PathBuf> {
        let _guard = MergeGuard::acquire(&self.merging, session)?;
        self.merger
            .merge(session, &meta.target_filename, meta.total_chunks)
            .await
    }
}

/// RAII entry in the in-flight merge set.
struct MergeGuard<'a> {
    merging: &'a Mutex<HashSet<SessionId>>,
    session: SessionId,
}

impl<'a> MergeGuard<'a> {
    fn acquire(
        merging: &'a Mutex<HashSet<SessionId>>,
        session: &SessionId,
    ) -> EngineResult<Self> {
        if !lock_set(merging).insert(session.clone()) {
            return Err(EngineError::MergeInProgress(session.clone()));
        }
        Ok(Self {
            merging,
            session: session.clone(),
        })
    }
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        lock_set(self.merging).remove(&self.session);
    }
}

/// Only set membership changes under this lock, so a poisoned lock still
/// holds a consistent set and can be recovered.
fn lock_set<'a>(merging: &'a Mutex<HashSet<SessionId>>) -> MutexGuard<'a, HashSet<SessionId>> {
    merging.lock().unwrap_or_else(PoisonError::into_inner)
}
