//! Durable delivery state.
//!
//! The relay remembers what it has already forwarded in a small JSON file so
//! that a restart does not re-send the whole feed.  Two pieces of information
//! are kept:
//!
//! * `last_guid` — the identifier of the most recently delivered item.
//! * `sent_guids` — the last [`MAX_SENT_GUIDS`] delivered identifiers,
//!   oldest first.
//!
//! ## For contributors
//!
//! [`StateStore::save`] writes to a sibling temp file and renames it over the
//! real one, so a crash mid-write can lose the write but never leaves a
//! half-written record behind.  Keep it that way if you change the format.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// How many delivered identifiers are remembered beyond `last_guid`.
pub const MAX_SENT_GUIDS: usize = 200;

/// What has been delivered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_guid: Option<String>,

    #[serde(default)]
    pub sent_guids: Vec<String>,
}

impl DeliveryState {
    /// Whether an item with this identifier should still be delivered.
    ///
    /// With no `last_guid` and an empty history every identifier is novel,
    /// which is what makes the first productive cycle flush the whole feed.
    pub fn is_novel(&self, id: &str) -> bool {
        self.last_guid.as_deref() != Some(id) && !self.sent_guids.iter().any(|g| g == id)
    }

    /// Record a successful delivery, evicting the oldest history entries
    /// beyond [`MAX_SENT_GUIDS`].
    pub fn record_delivery(&mut self, id: &str) {
        self.last_guid = Some(id.to_string());
        self.sent_guids.push(id.to_string());
        self.trim();
    }

    fn trim(&mut self) {
        if self.sent_guids.len() > MAX_SENT_GUIDS {
            let excess = self.sent_guids.len() - MAX_SENT_GUIDS;
            self.sent_guids.drain(..excess);
        }
    }
}

/// Errors raised while persisting state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// JSON file backing a [`DeliveryState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state.
    ///
    /// A missing file yields the default state.  So does an unreadable or
    /// malformed one, after logging a warning: losing the history only means
    /// the current feed window is delivered again.
    pub fn load(&self) -> DeliveryState {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                return DeliveryState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, starting fresh");
                return DeliveryState::default();
            }
        };

        match serde_json::from_str::<DeliveryState>(&data) {
            Ok(mut state) => {
                state.trim();
                state
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, starting fresh");
                DeliveryState::default()
            }
        }
    }

    /// Persist `state` (temp file → fsync → rename).
    pub fn save(&self, state: &DeliveryState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.tmp_path();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        file.write_all(json.as_bytes()).map_err(io_err(&tmp_path))?;
        file.sync_all().map_err(io_err(&tmp_path))?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            io_err(&self.path)(e)
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StateError {
    let path = path.to_path_buf();
    move |source| StateError::Io { path, source }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
