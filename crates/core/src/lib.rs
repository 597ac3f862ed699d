//! Core domain types and shared logic for the stitch upload engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Session identifiers and the persisted metadata record
//! - Chunk file naming and listing entries
//! - Configuration types
//! - Invalid-request errors, rejected before any storage mutation

pub mod chunk;
pub mod config;
pub mod error;
pub mod session;

pub use chunk::{CHUNK_FILE_SUFFIX, ChunkEntry, chunk_file_name, parse_chunk_file_name};
pub use config::{AppConfig, StorageConfig};
pub use error::{Error, Result};
pub use session::{SessionId, SessionMeta, validate_filename};

/// File name of the per-session metadata record.
pub const SESSION_META_FILE: &str = "session.json";

/// Maximum byte length of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 255;

/// Maximum byte length of a target filename.
pub const MAX_FILENAME_LEN: usize = 255;
