//! Persisted applied-patches cursor.
//!
//! The ordered list of patch names already applied on top of the upstream
//! reference, stored as a small TOML record at the working-repo root. This
//! is the primary answer to "which series entries are applied" — the
//! synchronizer reconciles it against the annotated commit run when the two
//! could have drifted (crash mid-restore, manual reset).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PlyError;

/// File name of the cursor record at the working-repo root.
pub const STATE_FILE: &str = ".ply-state";

/// The applied-patches cursor.
///
/// `applied` is ordered oldest-to-newest and must always equal a prefix of
/// the series; any deviation is corruption, surfaced by `check`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    /// Patch names applied to the working branch, in apply order.
    #[serde(default)]
    pub applied: Vec<String>,
}

impl AppliedState {
    /// Load the cursor from `path`. A missing file is an empty cursor.
    pub fn load(path: &Path) -> Result<Self, PlyError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&raw).map_err(|e| PlyError::State {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Persist the cursor to `path`.
    pub fn store(&self, path: &Path) -> Result<(), PlyError> {
        let raw = toml::to_string(self).map_err(|e| PlyError::State {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Number of applied patches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    /// Whether no patches are applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Whether `name` is already applied.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.applied.iter().any(|n| n == name)
    }

    /// Record one more applied patch and persist.
    pub fn push(&mut self, name: String, path: &Path) -> Result<(), PlyError> {
        self.applied.push(name);
        self.store(path)
    }

    /// Drop all applied entries and persist.
    pub fn clear(&mut self, path: &Path) -> Result<(), PlyError> {
        self.applied.clear();
        self.store(path)
    }
}
