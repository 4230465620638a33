//! Engine configuration, loaded from RON.
//!
//! ```ron
//! (
//!     debounce_ms: 1000,
//!     paste_dedup_ms: 200,
//!     remote_timeout_ms: 10000,
//!     image_bucket: "images",
//! )
//! ```
//!
//! Every field is optional; omitted fields take the values in
//! [`crate::constants`]. A missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEBOUNCE_WINDOW, DEFAULT_IMAGE_BUCKET, PASTE_DEDUP_WINDOW, REMOTE_CALL_TIMEOUT,
};

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RON parse error in {path}: {source}")]
    Ron {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// Tunables for one editor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Debounce window for per-block writes, in milliseconds.
    pub debounce_ms: u64,
    /// Duplicate-paste suppression window, in milliseconds.
    pub paste_dedup_ms: u64,
    /// Timeout applied to every remote call, in milliseconds.
    pub remote_timeout_ms: u64,
    /// Storage bucket for pasted images.
    pub image_bucket: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_WINDOW.as_millis() as u64,
            paste_dedup_ms: PASTE_DEDUP_WINDOW.as_millis() as u64,
            remote_timeout_ms: REMOTE_CALL_TIMEOUT.as_millis() as u64,
            image_bucket: DEFAULT_IMAGE_BUCKET.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn paste_dedup(&self) -> Duration {
        Duration::from_millis(self.paste_dedup_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Default config file: `<config_dir>/zenote/sync.ron`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("zenote").join("sync.ron"))
    }

    /// Parse from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no sync config, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_ron(&text).map_err(|source| ConfigError::Ron {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the default location, or defaults if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}
