#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use beamlog_kernel_contracts::species::{ClassifierState, Species};
use tracing::{debug, warn};

use crate::fs_io::{self, StorageError};

/// Last known species, carried between invocations for hysteresis.
#[derive(Debug, Clone)]
pub struct ClassifierStateStore {
    path: PathBuf,
}

impl ClassifierStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable, or corrupt state all mean "no prior species".
    pub fn load(&self) -> Option<Species> {
        let raw = match fs_io::read_text_if_exists(&self.path) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "classifier state unreadable");
                return None;
            }
        };
        match serde_json::from_str::<ClassifierState>(&raw) {
            Ok(state) => Some(state.species).filter(|s| s.is_known()),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "classifier state corrupt; ignoring");
                None
            }
        }
    }

    /// Persists a known species. `Unknown` is never written so it cannot erase a prior value.
    pub fn save(&self, species: Species) -> Result<(), StorageError> {
        if !species.is_known() {
            return Ok(());
        }
        let mut body = serde_json::to_string(&ClassifierState { species })?;
        body.push('\n');
        fs_io::atomic_write(&self.path, body.as_bytes())?;
        debug!(path = %self.path.display(), species = species.as_str(), "classifier state saved");
        Ok(())
    }
}
