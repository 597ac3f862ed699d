//! Chunk file naming and listing entries.

use serde::{Deserialize, Serialize};

/// Suffix for chunk files in a session's temporary directory.
pub const CHUNK_FILE_SUFFIX: &str = ".part";

/// A committed chunk as reported by the chunk store listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// Position of the chunk in the final file (0-indexed).
    pub index: u32,
    /// Size in bytes.
    pub size: u64,
}

/// File name for a chunk index within a session directory.
pub fn chunk_file_name(index: u32) -> String {
    format!("{index}{CHUNK_FILE_SUFFIX}")
}

/// Parse a chunk index back out of a directory entry name.
///
/// Returns `None` for entries that are not committed chunks (the metadata
/// record, in-flight temp files).
pub fn parse_chunk_file_name(name: &str) -> Option<u32> {
    name.strip_suffix(CHUNK_FILE_SUFFIX)?.parse().ok()
}
