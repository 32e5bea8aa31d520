//! Persistence for the last successfully detected or connected device.
//!
//! The file holds a single TOML record. Saves write a sibling temp file and
//! rename it over the old one, so readers see either the old record or the
//! new one.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::models::DeviceSessionState;
use crate::error::DeviceError;

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

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<DeviceSessionState>, DeviceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e.to_string())),
        };

        toml::from_str(&content)
            .map(Some)
            .map_err(|e| self.error(format!("unreadable record: {}", e)))
    }

    pub fn save(&self, state: &DeviceSessionState) -> Result<(), DeviceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.error(e.to_string()))?;
        }

        let content = toml::to_string_pretty(state).map_err(|e| self.error(e.to_string()))?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(|e| self.error(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.error(e.to_string()))?;

        debug!(path = %self.path.display(), identifier = %state.identifier, "Saved device state");
        Ok(())
    }

    /// Forget the configured device. Returns false if there was none.
    pub fn reset(&self) -> Result<bool, DeviceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.error(e.to_string())),
        }
    }

    fn error(&self, reason: String) -> DeviceError {
        DeviceError::State {
            path: self.path.clone(),
            reason,
        }
    }
}
