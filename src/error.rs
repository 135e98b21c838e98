//! Crate-level error type.
//!
//! [`PlyError`] is the single error returned by the synchronizer and the
//! patch repository. Variants are matchable so callers can distinguish the
//! one expected recoverable failure (a patch that did not apply cleanly)
//! from caller misuse and from real corruption, without parsing messages.

use std::path::PathBuf;

use thiserror::Error;

use crate::git::GitError;

/// Errors returned by patch-stack operations.
#[derive(Debug, Error)]
pub enum PlyError {
    /// A git invocation failed. [`GitError::PatchDidNotApplyCleanly`] is the
    /// merge-conflict condition: expected, recoverable, surfaced to the user
    /// for manual resolution followed by `resolve`.
    #[error(transparent)]
    Git(#[from] GitError),

    /// An I/O error outside any git subprocess.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `resolve` was called with no conflict in progress. Caller misuse,
    /// not a VCS conflict.
    #[error("no patch conflict in progress (no marker at {})", path.display())]
    NoConflict {
        /// Where the conflict marker was expected.
        path: PathBuf,
    },

    /// The working repo has no usable `.PATCH_REPO` reference.
    #[error("patch repo not linked: {} is missing or unreadable\n  Link one: ply link <patch-repo-path>", path.display())]
    PatchRepoNotLinked {
        /// The link path that failed to resolve.
        path: PathBuf,
    },

    /// The series names a patch whose file is absent from the patch repo.
    #[error("series entry `{name}` has no patch file at {}", path.display())]
    PatchMissing {
        /// The series entry.
        name: String,
        /// Expected patch file location.
        path: PathBuf,
    },

    /// `save` found no commit range to turn into a patch.
    #[error("nothing to save: `git format-patch {since}` produced no patch")]
    NothingToSave {
        /// The range start that was requested.
        since: String,
    },

    /// The applied-state record could not be read or parsed.
    #[error("invalid state record at {}: {detail}", path.display())]
    State {
        /// Path to the state file.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },

    /// The working repo's annotated history disagrees with the applied
    /// cursor or the series order. This is corruption, not a recoverable
    /// condition.
    #[error("applied patches diverge from the series: {detail}")]
    SeriesDiverged {
        /// Human-readable description of the inconsistency.
        detail: String,
    },

    /// `diff -U0` exited with a status other than 0 (identical) or 1
    /// (differences found).
    #[error("`diff -U0` exited with unexpected status {status}")]
    DiffFailed {
        /// The unexpected exit status (or -1 when terminated by signal).
        status: i32,
    },
}

impl PlyError {
    /// Whether this is the merge-conflict condition raised by the apply
    /// step — the only failure `resolve` is meant to follow.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Git(GitError::PatchDidNotApplyCleanly { .. }))
    }
}
