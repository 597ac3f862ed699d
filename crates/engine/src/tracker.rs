//! Session progress tracking and resume points.

use crate::error::EngineResult;
use serde::Serialize;
use std::sync::Arc;
use stitch_core::{SessionId, SessionMeta};
use stitch_storage::ChunkStore;

/// Byte-level progress of one session.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Progress {
    /// Sum of committed chunk sizes.
    pub uploaded_bytes: u64,
    /// Rounded percentage against the declared size; 0 when none declared.
    pub percent: u8,
    /// Number of committed chunks.
    pub chunk_count: usize,
}

/// Summary of a partially uploaded session.
#[derive(Clone, Debug, Serialize)]
pub struct PartialUpload {
    pub session_id: SessionId,
    /// Target filename, or the session id when the metadata record is
    /// missing.
    pub name: String,
    pub total_size: Option<u64>,
    pub uploaded_size: u64,
    pub percent: u8,
    pub chunk_count: usize,
}

/// Computes resume points and progress from the chunk store.
#[derive(Clone)]
pub struct SessionTracker {
    chunks: Arc<dyn ChunkStore>,
}

impl SessionTracker {
    /// Create a tracker over the given chunk store.
    pub fn new(chunks: Arc<dyn ChunkStore>) -> Self {
        Self { chunks }
    }

    /// Lowest chunk index not yet present.
    ///
    /// An unknown session resumes from zero; out-of-order arrivals resume
    /// from the first hole rather than the end of the present set.
    pub async fn next_expected(&self, session: &SessionId) -> EngineResult<u32> {
        let present = self.chunks.list(session).await?;
        let mut next = 0u32;
        for entry in &present {
            if entry.index == next {
                next += 1;
            } else {
                break;
            }
        }
        Ok(next)
    }

    /// Progress against the session's declared size.
    pub async fn progress(&self, session: &SessionId) -> EngineResult<Progress> {
        let present = self.chunks.list(session).await?;
        let declared = self
            .read_meta_lenient(session)
            .await
            .and_then(|meta| meta.declared_size);
        let uploaded_bytes: u64 = present.iter().map(|entry| entry.size).sum();

        Ok(Progress {
            uploaded_bytes,
            percent: percent_of(uploaded_bytes, declared),
            chunk_count: present.len(),
        })
    }

    /// Every session with at least one committed chunk.
    ///
    /// This is the recovery surface: after a crash or browser restart a
    /// client (or an administrative sweep) enumerates interrupted uploads
    /// from here.
    pub async fn list_all_partial(&self) -> EngineResult<Vec<PartialUpload>> {
        let mut partials = Vec::new();

        for session in self.chunks.sessions().await? {
            let present = self.chunks.list(&session).await?;
            if present.is_empty() {
                continue;
            }

            let uploaded_size: u64 = present.iter().map(|entry| entry.size).sum();
            let (name, total_size) = match self.read_meta_lenient(&session).await {
                Some(meta) => (meta.target_filename, meta.declared_size),
                // Crash window before the metadata record was written; keep
                // the session visible so a sweep can still find it.
                None => (session.as_str().to_string(), None),
            };

            partials.push(PartialUpload {
                percent: percent_of(uploaded_size, total_size),
                chunk_count: present.len(),
                session_id: session,
                name,
                total_size,
                uploaded_size,
            });
        }

        Ok(partials)
    }

    /// Read the metadata record, treating an unreadable one as absent so
    /// listings never lose sight of a session.
    async fn read_meta_lenient(&self, session: &SessionId) -> Option<SessionMeta> {
        match self.chunks.read_meta(session).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(session_id = %session, error = %e, "unreadable session metadata");
                None
            }
        }
    }
}

/// Rounded percentage, guarded against absent or zero declared sizes and
/// clamped at 100 (declared sizes are client-supplied and may be wrong).
fn percent_of(uploaded: u64, declared: Option<u64>) -> u8 {
    match declared {
        Some(total) if total > 0 => {
            let percent = (uploaded as f64 / total as f64 * 100.0).round();
            percent.min(100.0) as u8
        }
        _ => 0,
    }
}
