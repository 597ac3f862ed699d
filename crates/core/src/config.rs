//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage area configuration.
///
/// Completed files live directly under `root`; per-session chunk
/// directories live under `root/<temp_dir>/<session_id>/`. Keeping the
/// temporary partition inside the root lets a completed-files listing
/// exclude it by name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the storage area.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Name of the temporary partition under the root.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_temp_dir() -> String {
    "temp".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.temp_dir.is_empty() {
            return Err("storage.temp_dir must not be empty".to_string());
        }
        if self.temp_dir.contains(['/', '\\']) || self.temp_dir == "." || self.temp_dir == ".." {
            return Err(format!(
                "storage.temp_dir must be a single path component: {:?}",
                self.temp_dir
            ));
        }
        Ok(())
    }

    /// Path of the temporary partition.
    pub fn temp_root(&self) -> PathBuf {
        self.root.join(&self.temp_dir)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage area configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at the given directory.
    ///
    /// **For testing only.**
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                root: root.into(),
                temp_dir: default_temp_dir(),
            },
        }
    }
}
