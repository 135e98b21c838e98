//! Thin provider over the `git` CLI.
//!
//! [`Git`] holds an explicit repository path and runs every command with
//! `Command::current_dir` — no ambient working-directory mutation anywhere.
//! Each invocation is assumed atomic at the single-command level; there is
//! no retry logic here or above.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Errors from git invocations.
#[derive(Debug, Error)]
pub enum GitError {
    /// `git am` could not apply a patch cleanly. The working tree is left in
    /// a resumable conflicted state; the caller records the patch name and
    /// surfaces the conflict for manual resolution.
    #[error("patch {} did not apply cleanly: {stderr}", patch.display())]
    PatchDidNotApplyCleanly {
        /// The patch file that failed to apply.
        patch: PathBuf,
        /// Captured git output describing the failure.
        stderr: String,
    },

    /// Any other git command failed.
    #[error("`{command}` failed{}: {stderr}", exit_code.map_or_else(String::new, |c| format!(" (exit code {c})")))]
    Command {
        /// The command that was run (e.g. `"git reset --hard HEAD^"`).
        command: String,
        /// Captured stderr, trimmed.
        stderr: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// The git process could not be spawned.
    #[error("I/O error running git: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to one git repository.
///
/// Comparable to a `git -C <root>` prefix: the repository path travels with
/// the handle instead of living in process state.
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    /// Create a handle for the repository rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The repository root this handle operates on.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a git command and return its stdout on success.
    fn run_capture(&self, args: &[&str]) -> Result<String, GitError> {
        debug!(root = %self.root.display(), "git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GitError::Command {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                exit_code: output.status.code(),
            })
        }
    }

    /// Run a git command, ignoring stdout.
    fn run(&self, args: &[&str]) -> Result<(), GitError> {
        self.run_capture(args)?;
        Ok(())
    }

    /// `git init` in the repository root. Idempotent.
    pub fn init(&self) -> Result<(), GitError> {
        self.run(&["init", "--quiet"])
    }

    /// Stage a path (relative to the repository root).
    pub fn add(&self, path: &str) -> Result<(), GitError> {
        self.run(&["add", "--", path])
    }

    /// `git log -<count> --skip=<skip> --pretty=<format>`, stdout trimmed
    /// of trailing whitespace.
    pub fn log(&self, count: usize, skip: usize, format: &str) -> Result<String, GitError> {
        let count = format!("-{count}");
        let skip = format!("--skip={skip}");
        let pretty = format!("--pretty={format}");
        let out = self.run_capture(&["log", &count, &skip, &pretty])?;
        Ok(out.trim_end().to_owned())
    }

    /// Commit staged changes, or amend the last commit's message in place.
    pub fn commit(&self, message: &str, amend: bool) -> Result<(), GitError> {
        if amend {
            self.run(&["commit", "--quiet", "--amend", "-m", message])
        } else {
            self.run(&["commit", "--quiet", "-m", message])
        }
    }

    /// `git format-patch <since> -o <out_dir>`; returns the generated patch
    /// file paths, one per commit in the range.
    pub fn format_patch_into(
        &self,
        since: &str,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, GitError> {
        let dir = out_dir.to_string_lossy().into_owned();
        let out = self.run_capture(&["format-patch", since, "-o", &dir])?;
        Ok(out.lines().map(PathBuf::from).collect())
    }

    /// Apply a mailbox patch as a new commit via `git am`.
    ///
    /// With `three_way`, falls back to a three-way merge against the blobs
    /// recorded in the patch, which avoids spurious conflicts when the
    /// surrounding context has drifted. Failure is the distinguished
    /// [`GitError::PatchDidNotApplyCleanly`] condition and leaves the
    /// repository mid-`am`, ready for manual resolution.
    pub fn apply_patch(&self, patch: &Path, three_way: bool) -> Result<(), GitError> {
        let patch_arg = patch.to_string_lossy().into_owned();
        let mut args = vec!["am", "--quiet"];
        if three_way {
            args.push("--3way");
        }
        args.push(&patch_arg);

        match self.run(&args) {
            Ok(()) => Ok(()),
            Err(GitError::Command { stderr, .. }) => Err(GitError::PatchDidNotApplyCleanly {
                patch: patch.to_path_buf(),
                stderr,
            }),
            Err(e) => Err(e),
        }
    }

    /// Finalize an in-progress `git am` conflict resolution into a commit
    /// (`git am --resolved`). The caller must have staged the resolution.
    pub fn continue_apply(&self) -> Result<(), GitError> {
        self.run(&["am", "--quiet", "--resolved"])
    }

    /// `git reset --hard <refspec>`. Discards uncommitted changes.
    pub fn reset_hard(&self, refspec: &str) -> Result<(), GitError> {
        self.run(&["reset", "--hard", "--quiet", refspec])
    }

    /// Whether the index holds staged changes (`git diff --cached --quiet`).
    pub fn has_staged_changes(&self) -> Result<bool, GitError> {
        match self.run(&["diff", "--cached", "--quiet"]) {
            Ok(()) => Ok(false),
            Err(GitError::Command {
                exit_code: Some(1), ..
            }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Lazy backward walk over commit messages, newest first.
    ///
    /// Each step is one `git log -1 --skip=<n>` invocation; nothing is
    /// materialized up front and a fresh walker restarts from HEAD.
    #[must_use]
    pub const fn commit_messages(&self) -> CommitMessages<'_> {
        CommitMessages {
            git: self,
            skip: 0,
            done: false,
        }
    }
}

/// Iterator over commit messages walking backward from HEAD.
///
/// Terminates when the walk runs past the root commit (`git log --skip`
/// beyond the end of history prints nothing).
pub struct CommitMessages<'a> {
    git: &'a Git,
    skip: usize,
    done: bool,
}

impl Iterator for CommitMessages<'_> {
    type Item = Result<String, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.git.log(1, self.skip, "%B") {
            Ok(msg) if msg.is_empty() => {
                self.done = true;
                None
            }
            Ok(msg) => {
                self.skip += 1;
                Some(Ok(msg))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
