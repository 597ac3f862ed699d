//! Local filesystem storage backend.
//!
//! Serves both storage roles from one root directory: completed files live
//! directly under the root, per-session chunk directories under the
//! temporary partition (`root/<temp_dir>/<session_id>/`).

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ChunkStore, FileSink, FinalFile, FinalStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use stitch_core::config::StorageConfig;
use stitch_core::{
    ChunkEntry, SESSION_META_FILE, SessionId, SessionMeta, chunk_file_name, parse_chunk_file_name,
};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Filesystem-backed chunk and completed-file storage.
pub struct FilesystemStore {
    root: PathBuf,
    temp_root: PathBuf,
    temp_dir: String,
}

impl FilesystemStore {
    /// Create a new filesystem store rooted at the configured directory.
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        config.validate().map_err(StorageError::Config)?;
        fs::create_dir_all(&config.root).await?;
        Ok(Self {
            root: config.root.clone(),
            temp_root: config.temp_root(),
            temp_dir: config.temp_dir.clone(),
        })
    }

    /// Directory holding one session's chunks and metadata record.
    ///
    /// `SessionId` is validated at parse time to be a single path
    /// component, so the join cannot escape the temporary partition.
    fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.temp_root.join(session.as_str())
    }

    /// Resolve a completed-file name under the root, rejecting anything
    /// that is not a plain visible file name.
    fn final_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidPath(format!(
                "filename must be a single path component: {name:?}"
            )));
        }
        match Path::new(name).components().next() {
            Some(std::path::Component::Normal(_)) => {}
            _ => {
                return Err(StorageError::InvalidPath(format!(
                    "unsafe filename: {name:?}"
                )));
            }
        }
        // Dot-prefixed names are reserved for in-flight outputs, and the
        // temp partition must never be addressable as a completed file.
        if name.starts_with('.') || name == self.temp_dir {
            return Err(StorageError::InvalidPath(format!(
                "reserved filename: {name:?}"
            )));
        }
        Ok(self.root.join(name))
    }
}

/// Write to a temp file with a unique name, fsync, then rename.
///
/// A crash mid-write leaves only the temp file; the target name never holds
/// a partial write, so anything visible under it is fully committed.
async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    let temp_path = path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or_else(|| temp_name.clone()),
    );
    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
    }
    fs::rename(&temp_path, path).await?;
    Ok(())
}

#[async_trait]
impl ChunkStore for FilesystemStore {
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, session: &SessionId, index: u32, data: Bytes) -> StorageResult<()> {
        let dir = self.session_dir(session);
        fs::create_dir_all(&dir).await?;
        write_atomic(&dir.join(chunk_file_name(index)), &data).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, session: &SessionId) -> StorageResult<Vec<ChunkEntry>> {
        let dir = self.session_dir(session);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(index) = parse_chunk_file_name(&name.to_string_lossy()) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            chunks.push(ChunkEntry {
                index,
                size: metadata.len(),
            });
        }

        chunks.sort_by_key(|chunk| chunk.index);
        Ok(chunks)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, session: &SessionId, index: u32) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.session_dir(session).join(chunk_file_name(index));
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("chunk {index} of session {session}"))
            } else {
                StorageError::Io(e)
            }
        })?;

        // Stream the chunk in pieces instead of loading it into memory
        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn remove(&self, session: &SessionId, index: u32) -> StorageResult<()> {
        let path = self.session_dir(session).join(chunk_file_name(index));
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("chunk {index} of session {session}"))
            } else {
                StorageError::Io(e)
            }
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn purge_session(&self, session: &SessionId) -> StorageResult<()> {
        match fs::remove_dir_all(self.session_dir(session)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read_meta(&self, session: &SessionId) -> StorageResult<Option<SessionMeta>> {
        let path = self.session_dir(session).join(SESSION_META_FILE);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };
        let meta = serde_json::from_slice(&data)
            .map_err(|e| StorageError::CorruptMeta(format!("session {session}: {e}")))?;
        Ok(Some(meta))
    }

    #[instrument(skip(self, meta), fields(backend = "filesystem"))]
    async fn write_meta(&self, session: &SessionId, meta: &SessionMeta) -> StorageResult<()> {
        let dir = self.session_dir(session);
        fs::create_dir_all(&dir).await?;
        let data = serde_json::to_vec(meta)
            .map_err(|e| StorageError::CorruptMeta(format!("session {session}: {e}")))?;
        write_atomic(&dir.join(SESSION_META_FILE), &data).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn sessions(&self) -> StorageResult<Vec<SessionId>> {
        let mut entries = match fs::read_dir(&self.temp_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            // Directories we could not have created are skipped rather than
            // surfaced as phantom sessions.
            if let Ok(session) = SessionId::parse(&entry.file_name().to_string_lossy()) {
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(sessions)
    }
}

#[async_trait]
impl FinalStore for FilesystemStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.final_path(name)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn FileSink>> {
        let final_path = self.final_path(name)?;
        let temp_path = self.root.join(format!(".merge.{}", Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemSink {
            file,
            temp_path,
            final_path,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self) -> StorageResult<Vec<FinalFile>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            // The temp partition is a directory and in-flight outputs are
            // dot-prefixed; both stay out of the completed listing.
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().await?;
            files.push(FinalFile {
                name,
                size: metadata.len(),
                modified: metadata.modified().ok().map(|t| t.into()),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

/// Streaming sink writing a completed file.
struct FilesystemSink {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
}

#[async_trait]
impl FileSink for FilesystemSink {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<PathBuf> {
        let FilesystemSink {
            file,
            temp_path,
            final_path,
        } = *self;

        // Flush durably before publishing; a failed close must not leave a
        // truncated file at the final name, so the temp output is removed
        // on every error path.
        if let Err(e) = file.sync_all().await {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(final_path)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
        Ok(())
    }
}
