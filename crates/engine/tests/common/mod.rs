//! Common test utilities and fixtures.

pub mod mocks;

use bytes::Bytes;
use std::sync::Arc;
use stitch_core::config::AppConfig;
use stitch_engine::{ReceiveChunk, UploadService};
use stitch_storage::FilesystemStore;
use tempfile::TempDir;

/// Build a service rooted in a fresh temp directory.
/// Note: allow(dead_code) because each test file compiles common/ separately.
#[allow(dead_code)]
pub async fn build_service() -> (TempDir, Arc<UploadService>) {
    let temp = TempDir::new().unwrap();
    let config = AppConfig::for_testing(temp.path());
    let store = Arc::new(FilesystemStore::new(&config.storage).await.unwrap());
    let service = Arc::new(UploadService::new(store.clone(), store));
    (temp, service)
}

/// Shorthand for a chunk receipt request.
#[allow(dead_code)]
pub fn chunk_req(
    session: &str,
    index: u32,
    total: u32,
    filename: &str,
    payload: impl Into<Bytes>,
) -> ReceiveChunk {
    ReceiveChunk {
        session_id: session.to_string(),
        chunk_index: index,
        total_chunks: total,
        filename: filename.to_string(),
        declared_size: None,
        payload: payload.into(),
    }
}

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}
