//! Conflict marker state machine.
//!
//! While a `restore` is stopped on a patch that did not apply cleanly, the
//! name of that patch lives in a single-line `.patch-conflict` file at the
//! working-repo root. The file outlives the process, so a later `resolve`
//! recovers the outstanding name from disk rather than from memory. The
//! file's presence is modeled as an explicit two-state machine with typed
//! transitions instead of ad hoc existence checks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PlyError;

/// File name of the conflict marker at the working-repo root.
pub const MARKER_FILE: &str = ".patch-conflict";

/// Whether a patch application is awaiting manual resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictState {
    /// No conflict in progress.
    Clean,
    /// The named patch failed to apply and has not been resolved yet.
    Conflicted(String),
}

/// Handle to the marker file.
#[derive(Debug)]
pub struct ConflictMarker {
    path: PathBuf,
}

impl ConflictMarker {
    /// Marker handle for the working repo rooted at `working_root`.
    pub fn new(working_root: &Path) -> Self {
        Self {
            path: working_root.join(MARKER_FILE),
        }
    }

    /// Path of the marker file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current state from disk.
    pub fn state(&self) -> Result<ConflictState, PlyError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(ConflictState::Conflicted(contents.trim().to_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConflictState::Clean),
            Err(e) => Err(e.into()),
        }
    }

    /// Transition Clean → Conflicted: record the patch under resolution.
    pub fn begin_conflict(&self, patch_name: &str) -> Result<(), PlyError> {
        fs::write(&self.path, format!("{patch_name}\n"))?;
        Ok(())
    }

    /// Transition Conflicted → Clean: consume the marker and return the
    /// patch name it recorded. Calling this with no conflict in progress is
    /// caller misuse ([`PlyError::NoConflict`]).
    pub fn resolve_conflict(&self) -> Result<String, PlyError> {
        match self.state()? {
            ConflictState::Conflicted(name) => {
                fs::remove_file(&self.path)?;
                Ok(name)
            }
            ConflictState::Clean => Err(PlyError::NoConflict {
                path: self.path.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn starts_clean() {
        let dir = TempDir::new().unwrap();
        let marker = ConflictMarker::new(dir.path());
        assert_eq!(marker.state().unwrap(), ConflictState::Clean);
    }

    #[test]
    fn begin_then_resolve_round_trips_the_name() {
        let dir = TempDir::new().unwrap();
        let marker = ConflictMarker::new(dir.path());

        marker.begin_conflict("sub/P.patch").unwrap();
        assert_eq!(
            marker.state().unwrap(),
            ConflictState::Conflicted("sub/P.patch".to_owned())
        );

        let name = marker.resolve_conflict().unwrap();
        assert_eq!(name, "sub/P.patch");
        assert_eq!(marker.state().unwrap(), ConflictState::Clean);
        assert!(!marker.path().exists());
    }

    #[test]
    fn resolve_without_conflict_is_caller_misuse() {
        let dir = TempDir::new().unwrap();
        let marker = ConflictMarker::new(dir.path());

        let err = marker.resolve_conflict().unwrap_err();
        assert!(matches!(err, PlyError::NoConflict { .. }), "got {err:?}");
    }

    #[test]
    fn marker_survives_a_new_handle() {
        // Crash resilience: a fresh process reads the same state.
        let dir = TempDir::new().unwrap();
        ConflictMarker::new(dir.path())
            .begin_conflict("P.patch")
            .unwrap();

        let later = ConflictMarker::new(dir.path());
        assert_eq!(
            later.state().unwrap(),
            ConflictState::Conflicted("P.patch".to_owned())
        );
    }
}
