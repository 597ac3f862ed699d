//! Sequential chunk merge.

use crate::error::{EngineError, EngineResult};
use crate::metrics;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use stitch_core::SessionId;
use stitch_storage::{ChunkStore, FileSink, FinalStore, StorageError};

/// Reassembles a session's chunks into its completed file.
///
/// The merge is a sequential pipeline over indices `0..total_chunks`: each
/// chunk is streamed into the output sink in order, with no interleaving.
/// Merges for different sessions may run in parallel tasks; a single merge
/// has no internal concurrency.
#[derive(Clone)]
pub struct MergeEngine {
    chunks: Arc<dyn ChunkStore>,
    finals: Arc<dyn FinalStore>,
}

impl MergeEngine {
    /// Create a merge engine over the given stores.
    pub fn new(chunks: Arc<dyn ChunkStore>, finals: Arc<dyn FinalStore>) -> Self {
        Self { chunks, finals }
    }

    /// Concatenate chunks `0..total_chunks` into `target_filename`.
    ///
    /// On success the session's temporary area is purged and the completed
    /// path returned. On failure the partial output is discarded, no file
    /// appears under the final name, and un-consumed chunks stay in place
    /// so the client can resume.
    #[tracing::instrument(skip(self, session), fields(session_id = %session))]
    pub async fn merge(
        &self,
        session: &SessionId,
        target_filename: &str,
        total_chunks: u32,
    ) -> EngineResult<PathBuf> {
        let timer = metrics::MERGE_DURATION.start_timer();
        let result = self.run(session, target_filename, total_chunks).await;
        timer.observe_duration();

        match &result {
            Ok(path) => {
                metrics::MERGES_COMPLETED.inc();
                tracing::info!(path = %path.display(), total_chunks, "merge completed");
            }
            Err(e) => {
                metrics::MERGES_FAILED.inc();
                tracing::error!(error = %e, "merge failed");
            }
        }
        result
    }

    async fn run(
        &self,
        session: &SessionId,
        target_filename: &str,
        total_chunks: u32,
    ) -> EngineResult<PathBuf> {
        // Presence pass before anything is consumed: a missing chunk must
        // leave the session fully intact, and no output file may be created
        // for it.
        let present: HashSet<u32> = self
            .chunks
            .list(session)
            .await?
            .iter()
            .map(|entry| entry.index)
            .collect();
        for index in 0..total_chunks {
            if !present.contains(&index) {
                return Err(EngineError::MissingChunk(index));
            }
        }

        let mut sink = self.finals.create_sink(target_filename).await?;

        for index in 0..total_chunks {
            if let Err(e) = self.append_chunk(&mut sink, session, index).await {
                let _ = sink.abort().await;
                return Err(e);
            }
            // The chunk is consumed once appended; deleting it is disk
            // reclamation and never changes the merge outcome.
            if let Err(e) = self.chunks.remove(session, index).await {
                tracing::warn!(
                    session_id = %session,
                    chunk_index = index,
                    error = %e,
                    "failed to delete consumed chunk"
                );
            }
        }

        // The sink deletes its partial output if the close fails, so a
        // truncated file never lands under the target name.
        let path = sink.finish().await?;

        if let Err(e) = self.chunks.purge_session(session).await {
            tracing::warn!(session_id = %session, error = %e, "failed to purge session area");
        } else {
            metrics::SESSIONS_PURGED.inc();
        }

        Ok(path)
    }

    /// Stream one chunk into the sink. Absence maps to `MissingChunk`:
    /// presence was checked up front, but the walk re-verifies each chunk
    /// as it consumes it.
    async fn append_chunk(
        &self,
        sink: &mut Box<dyn FileSink>,
        session: &SessionId,
        index: u32,
    ) -> EngineResult<()> {
        let mut stream = match self.chunks.get_stream(session, index).await {
            Ok(stream) => stream,
            Err(StorageError::NotFound(_)) => return Err(EngineError::MissingChunk(index)),
            Err(e) => return Err(e.into()),
        };

        while let Some(data) = stream.next().await {
            sink.write(data?).await?;
        }
        Ok(())
    }
}
