//! The patch repository: versioned patch files plus the series.
//!
//! A patch repo is itself a git repository so that every change to a patch
//! or to the apply order is auditable. The `series` file holds one relative
//! patch path per line; order is apply order; membership is exactly-once
//! and append-only — reordering or deleting entries is manual file editing,
//! deliberately unsupported here.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::annotation;
use crate::diff::{normalize_patch, significant_change};
use crate::error::PlyError;
use crate::git::Git;

/// File name of the series at the patch-repo root.
pub const SERIES_FILE: &str = "series";

/// Handle to a patch repository.
#[derive(Debug)]
pub struct PatchRepo {
    root: PathBuf,
    git: Git,
}

impl PatchRepo {
    /// Handle for the patch repo rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let git = Git::new(&root);
        Self { root, git }
    }

    /// The patch-repo root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the series file.
    #[must_use]
    pub fn series_path(&self) -> PathBuf {
        self.root.join(SERIES_FILE)
    }

    /// Absolute path of a patch file named in the series.
    #[must_use]
    pub fn patch_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Initialize the patch repo. Idempotent: the directory and git repo are
    /// (re)initialized, but the series file and its `Ply init` commit are
    /// only created when no series exists yet — a pre-existing series is
    /// left untouched.
    pub fn initialize(&self) -> Result<(), PlyError> {
        fs::create_dir_all(&self.root)?;
        self.git.init()?;

        if !self.series_path().exists() {
            fs::write(self.series_path(), "")?;
            self.git.add(SERIES_FILE)?;
            self.git.commit("Ply init", false)?;
            info!(root = %self.root.display(), "initialized patch repo");
        }
        Ok(())
    }

    /// Lazy walk over the series, in file order. Restartable: each call
    /// opens the file fresh.
    pub fn series(&self) -> Result<Series, PlyError> {
        let file = File::open(self.series_path())?;
        Ok(Series {
            lines: BufReader::new(file).lines(),
        })
    }

    /// Append `name` to the series unless already present, staging the
    /// change. Returns whether the series grew.
    pub fn append_if_absent(&self, name: &str) -> Result<bool, PlyError> {
        for entry in self.series()? {
            if entry? == name {
                return Ok(false);
            }
        }

        let mut file = OpenOptions::new().append(true).open(self.series_path())?;
        writeln!(file, "{name}")?;
        self.git.add(SERIES_FILE)?;
        Ok(true)
    }

    /// Store a freshly generated patch under `name`, normalized for stable
    /// storage. When a stored version exists and the regeneration is only
    /// cosmetic (hash/offset churn), the stored file is kept and nothing is
    /// staged. Returns whether the stored patch changed.
    pub fn write_patch(&self, name: &str, source: &Path) -> Result<bool, PlyError> {
        let normalized = normalize_patch(&fs::read_to_string(source)?);
        let dest = self.patch_path(name);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if dest.exists() {
            let mut scratch = tempfile::NamedTempFile::new()?;
            scratch.write_all(normalized.as_bytes())?;
            if !significant_change(&dest, scratch.path())? {
                debug!(patch = name, "regenerated patch is cosmetic churn, keeping stored file");
                return Ok(false);
            }
        }

        fs::write(&dest, normalized)?;
        self.git.add(name)?;
        info!(patch = name, "stored patch");
        Ok(true)
    }

    /// Commit staged series/patch changes with a `Ply-Based-On` trailer
    /// naming the working-repo commit the patches were verified against.
    /// No-op (returns `false`) when nothing is staged, so that a run of
    /// cosmetic refreshes leaves no history entry.
    pub fn commit(&self, message: &str, based_on: &str) -> Result<bool, PlyError> {
        if !self.git.has_staged_changes()? {
            return Ok(false);
        }
        self.git
            .commit(&annotation::stamp_provenance(message, based_on), false)?;
        info!(message, based_on, "committed patch repo");
        Ok(true)
    }
}

/// Lazy iterator over series entries; blank lines are skipped.
pub struct Series {
    lines: io::Lines<BufReader<File>>,
}

impl Iterator for Series {
    type Item = Result<String, PlyError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    let name = line.trim();
                    if !name.is_empty() {
                        return Some(Ok(name.to_owned()));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
