//! Storage layer for the stitch upload engine.
//!
//! This crate provides:
//! - Per-session chunk storage with atomic, durable writes
//! - Completed-file storage with rename-based commit
//! - A local filesystem backend serving both roles from one root

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemStore;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ChunkStore, FileSink, FinalFile, FinalStore};

use std::sync::Arc;
use stitch_core::config::StorageConfig;

/// Create the chunk and final stores from configuration.
///
/// Both handles point at the same backend instance so the chunk and
/// completed areas always share one root.
pub async fn from_config(
    config: &StorageConfig,
) -> StorageResult<(Arc<dyn ChunkStore>, Arc<dyn FinalStore>)> {
    let store = Arc::new(FilesystemStore::new(config).await?);
    Ok((store.clone(), store))
}
