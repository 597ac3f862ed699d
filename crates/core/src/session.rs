//! Session identity and the persisted metadata record.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Unique identifier for an upload session.
///
/// Session ids are chosen by the client and treated as opaque. They also
/// name a directory in the temporary storage area, so parsing enforces that
/// an id is usable as a single path component.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Parse and validate a client-supplied session id.
    pub fn parse(s: &str) -> Result<Self> {
        validate_path_component(s, crate::MAX_SESSION_ID_LEN)
            .map_err(|reason| Error::InvalidSessionId(format!("{s:?}: {reason}")))?;
        Ok(Self(s.to_string()))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a target filename.
///
/// The filename arrives already decoded from the transport layer; this only
/// checks it is safe to use as a single path component in the completed
/// area.
pub fn validate_filename(name: &str) -> Result<()> {
    validate_path_component(name, crate::MAX_FILENAME_LEN)
        .map_err(|reason| Error::InvalidFilename(format!("{name:?}: {reason}")))
}

/// Shared path-component rules for ids and filenames.
///
/// Dot-prefixed names are reserved for internal temp files, so they are
/// rejected here along with traversal components and separators.
fn validate_path_component(s: &str, max_len: usize) -> std::result::Result<(), &'static str> {
    if s.is_empty() {
        return Err("must not be empty");
    }
    if s.len() > max_len {
        return Err("too long");
    }
    if s.contains(['/', '\\', '\0']) {
        return Err("must not contain path separators or NUL");
    }
    if s == "." || s == ".." {
        return Err("must not be a relative path component");
    }
    if s.starts_with('.') {
        return Err("must not start with '.'");
    }
    Ok(())
}

/// Metadata record persisted alongside a session's chunks.
///
/// Written into the session's temporary directory when the first chunk
/// arrives and re-read by progress queries and crash recovery. Upload state
/// is never derived by parsing the session identifier itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Target filename for the merged file (already decoded).
    pub target_filename: String,
    /// Declared number of chunks, fixed for the session's lifetime.
    pub total_chunks: u32,
    /// Declared total size in bytes, used only for progress display.
    pub declared_size: Option<u64>,
    /// When the session's first chunk was received.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SessionMeta {
    /// Create a new metadata record.
    pub fn new(
        target_filename: impl Into<String>,
        total_chunks: u32,
        declared_size: Option<u64>,
    ) -> Self {
        Self {
            target_filename: target_filename.into(),
            total_chunks,
            declared_size,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Index of the final chunk, whose receipt triggers the merge.
    ///
    /// `total_chunks` is validated to be at least 1 before a record is
    /// created.
    pub fn last_chunk_index(&self) -> u32 {
        self.total_chunks - 1
    }
}
