#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use beamlog_kernel_contracts::sample::Sample;
use tracing::debug;

use crate::fs_io::{self, StorageError};

/// Writes the latest sample for direct consumption. Always overwrites, never deduplicates.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_latest(&self, sample: &Sample) -> Result<(), StorageError> {
        let mut body = serde_json::to_string_pretty(sample)?;
        body.push('\n');
        fs_io::atomic_write(&self.path, body.as_bytes())?;
        debug!(path = %self.path.display(), timestamp = sample.timestamp, "snapshot written");
        Ok(())
    }
}
