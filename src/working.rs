//! The working repository synchronizer.
//!
//! [`WorkingRepo`] orchestrates the three user-facing operations over the
//! patch repo, the annotation protocol, and the git provider:
//!
//! - `save`: turn the newest commit into a patch file, then rebuild the
//!   branch by replaying the whole series so annotations are only ever
//!   produced by the apply step.
//! - `restore`: apply every series entry not yet on the branch, one commit
//!   per patch, stopping at the first conflict.
//! - `resolve`: finish a manually resolved conflict, refresh the affected
//!   patch, and resume the restore.
//!
//! All of it is synchronous and single-process: one git subprocess at a
//! time, no locking, at most one invocation per working tree.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::annotation;
use crate::conflict::{ConflictMarker, ConflictState};
use crate::error::PlyError;
use crate::git::{Git, GitError};
use crate::patch_repo::PatchRepo;
use crate::state::{AppliedState, STATE_FILE};

/// Name of the patch-repo reference at the working-repo root.
pub const PATCH_REPO_LINK: &str = ".PATCH_REPO";

/// Handle to the working repository — the mutable checkout where patches
/// are applied as commits and conflicts are resolved.
#[derive(Debug)]
pub struct WorkingRepo {
    root: PathBuf,
    git: Git,
}

impl WorkingRepo {
    /// Handle for the working repo rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let git = Git::new(&root);
        Self { root, git }
    }

    /// The working-repo root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn link_path(&self) -> PathBuf {
        self.root.join(PATCH_REPO_LINK)
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    fn marker(&self) -> ConflictMarker {
        ConflictMarker::new(&self.root)
    }

    /// Point this working repo at a patch repo by (re)creating the
    /// `.PATCH_REPO` reference.
    pub fn link(&self, patch_repo_root: &Path) -> Result<(), PlyError> {
        let link = self.link_path();
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(patch_repo_root, &link)?;
        #[cfg(not(unix))]
        fs::write(&link, patch_repo_root.to_string_lossy().as_ref())?;
        Ok(())
    }

    /// Remove the `.PATCH_REPO` reference. Idempotent.
    pub fn unlink(&self) -> Result<(), PlyError> {
        match fs::remove_file(self.link_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The patch repo this working repo is linked to.
    ///
    /// `.PATCH_REPO` is a symlink where available, or a plain text file
    /// holding the path; relative targets resolve against the working-repo
    /// root.
    pub fn patch_repo(&self) -> Result<PatchRepo, PlyError> {
        let link = self.link_path();
        let target = fs::read_link(&link)
            .or_else(|_| fs::read_to_string(&link).map(|s| PathBuf::from(s.trim())))
            .map_err(|_| PlyError::PatchRepoNotLinked { path: link.clone() })?;

        let resolved = if target.is_absolute() {
            target
        } else {
            self.root.join(target)
        };
        Ok(PatchRepo::open(resolved))
    }

    /// The applied-patches view: the run of patches already applied on top
    /// of the upstream reference, oldest first.
    ///
    /// The persisted cursor is the primary answer; it is validated against
    /// HEAD's annotation and, on disagreement (crash mid-restore, manual
    /// reset), rebuilt from a lazy backward walk over the annotated commit
    /// run and re-persisted.
    pub fn applied_patches(&self) -> Result<AppliedState, PlyError> {
        let path = self.state_path();
        let state = AppliedState::load(&path)?;
        let head = self.head_annotation()?;

        let consistent = match (state.applied.last(), head.as_deref()) {
            (None, None) => true,
            (Some(last), Some(found)) => last == found,
            _ => false,
        };
        if consistent {
            return Ok(state);
        }

        debug!("applied cursor disagrees with HEAD annotation, rebuilding from history");
        let mut newest_first = Vec::new();
        for message in self.git.commit_messages() {
            match annotation::extract(&message?) {
                Some(name) => newest_first.push(name.to_owned()),
                None => break,
            }
        }
        newest_first.reverse();

        let state = AppliedState {
            applied: newest_first,
        };
        state.store(&path)?;
        Ok(state)
    }

    /// Hash of the upstream reference: the commit immediately below the
    /// applied run.
    pub fn upstream_reference(&self) -> Result<String, PlyError> {
        let applied = self.applied_patches()?;
        Ok(self.git.log(1, applied.len(), "%H")?)
    }

    /// Save the newest commit as a patch in the patch repo, then rebuild
    /// the branch from the series. Returns the patch name.
    ///
    /// `since` marks the start of the new, unannotated work (default
    /// `HEAD^`); `prefix` is an optional subdirectory within the patch
    /// repo. Both hard resets destroy uncommitted changes — the caller is
    /// responsible for a clean tree. A subject that slugifies to an
    /// existing patch name overwrites that patch.
    pub fn save(&self, since: &str, prefix: Option<&str>) -> Result<String, PlyError> {
        let name = self.patch_name(prefix)?;
        let patch_repo = self.patch_repo()?;
        self.generate_patch(&patch_repo, &name)?;

        // Roll the branch back to the upstream reference. Annotations are
        // only ever written by the apply step, which keeps renames and
        // moves in the patch repo cheap — the name is never embedded in
        // the patch itself.
        debug!(since, "discarding unannotated commits");
        self.git.reset_hard(since)?;

        let mut state = self.applied_patches()?;
        if !state.is_empty() {
            self.git.reset_hard(&format!("HEAD~{}", state.len()))?;
        }
        state.clear(&self.state_path())?;

        let based_on = self.git.log(1, 0, "%H")?;
        patch_repo.commit(&format!("Adding {name}"), &based_on)?;

        self.restore(true)?;
        info!(patch = %name, "saved");
        Ok(name)
    }

    /// Apply every series entry not yet on the branch, in series order,
    /// one commit per patch.
    ///
    /// On the first patch that does not apply cleanly, the conflict marker
    /// records its name and the distinguished condition propagates;
    /// remaining patches stay unapplied until `resolve`. A no-op when the
    /// applied view already equals the full series.
    pub fn restore(&self, three_way: bool) -> Result<(), PlyError> {
        let patch_repo = self.patch_repo()?;
        let mut state = self.applied_patches()?;
        let state_path = self.state_path();

        for entry in patch_repo.series()? {
            let name = entry?;
            if state.contains(&name) {
                continue;
            }

            let patch_path = patch_repo.patch_path(&name);
            if !patch_path.exists() {
                return Err(PlyError::PatchMissing {
                    name,
                    path: patch_path,
                });
            }

            info!(patch = %name, "applying");
            if let Err(e) = self.git.apply_patch(&patch_path, three_way) {
                if matches!(e, GitError::PatchDidNotApplyCleanly { .. }) {
                    self.marker().begin_conflict(&name)?;
                }
                return Err(e.into());
            }

            self.annotate_head(&name)?;
            state.push(name, &state_path)?;
        }
        Ok(())
    }

    /// Finish a manually resolved conflict and resume the restore.
    ///
    /// Precondition: a conflict marker exists — otherwise
    /// [`PlyError::NoConflict`], before any git mutation. The resolved
    /// patch is regenerated in the patch repo (the file now reflects the
    /// resolved content), remaining patches are applied, and only once the
    /// whole series applies cleanly does the patch repo receive a single
    /// `Refreshing patches` commit. A further conflict propagates
    /// unchanged, so `resolve` is invoked once per conflict until done.
    pub fn resolve(&self) -> Result<(), PlyError> {
        let marker = self.marker();
        let name = match marker.state()? {
            ConflictState::Conflicted(name) => name,
            ConflictState::Clean => {
                return Err(PlyError::NoConflict {
                    path: marker.path().to_path_buf(),
                });
            }
        };

        self.git.continue_apply()?;
        // Consume the marker only after the resolution commit exists, so a
        // failed `am --resolved` leaves the state recoverable.
        marker.resolve_conflict()?;

        self.annotate_head(&name)?;
        let mut state = AppliedState::load(&self.state_path())?;
        state.push(name.clone(), &self.state_path())?;

        let patch_repo = self.patch_repo()?;
        self.generate_patch(&patch_repo, &name)?;
        info!(patch = %name, "resolved");

        self.restore(true)?;

        let based_on = self.upstream_reference()?;
        patch_repo.commit("Refreshing patches", &based_on)?;
        Ok(())
    }

    /// Verify the consistency invariant: the cursor must be a prefix of the
    /// series, and the annotated commit run at HEAD must equal the cursor
    /// newest-to-oldest with an unannotated commit directly below it.
    pub fn check(&self) -> Result<(), PlyError> {
        let state = AppliedState::load(&self.state_path())?;

        let series: Vec<String> = self.patch_repo()?.series()?.collect::<Result<_, _>>()?;
        if !series.starts_with(&state.applied) {
            return Err(PlyError::SeriesDiverged {
                detail: format!(
                    "cursor {:?} is not a prefix of the series {series:?}",
                    state.applied
                ),
            });
        }

        let mut walker = self.git.commit_messages();
        for expected in state.applied.iter().rev() {
            let Some(message) = walker.next() else {
                return Err(PlyError::SeriesDiverged {
                    detail: format!("history ends inside the applied run (expected `{expected}`)"),
                });
            };
            match annotation::extract(&message?) {
                Some(found) if found == expected => {}
                Some(found) => {
                    return Err(PlyError::SeriesDiverged {
                        detail: format!(
                            "commit annotated `{found}` where the cursor expects `{expected}`"
                        ),
                    });
                }
                None => {
                    return Err(PlyError::SeriesDiverged {
                        detail: format!("unannotated commit where the cursor expects `{expected}`"),
                    });
                }
            }
        }

        if let Some(message) = walker.next() {
            if let Some(found) = annotation::extract(&message?) {
                return Err(PlyError::SeriesDiverged {
                    detail: format!("annotated commit `{found}` below the applied run"),
                });
            }
        }
        Ok(())
    }

    /// Derive the patch name from HEAD's subject: keep alphanumerics and
    /// spaces, spaces become hyphens, `.patch` appended; joined under
    /// `prefix` when given.
    pub fn patch_name(&self, prefix: Option<&str>) -> Result<String, PlyError> {
        let message = self.git.log(1, 0, "%B")?;
        let name = slugify(message.lines().next().unwrap_or_default());
        Ok(match prefix {
            Some(p) => format!("{}/{name}", p.trim_matches('/')),
            None => name,
        })
    }

    /// Generate the patch for `HEAD^..HEAD` into a scratch dir and store it
    /// under `name` in the patch repo, registering it in the series.
    fn generate_patch(&self, patch_repo: &PatchRepo, name: &str) -> Result<bool, PlyError> {
        let scratch = tempfile::tempdir()?;
        let files = self.git.format_patch_into("HEAD^", scratch.path())?;
        let source = files.first().ok_or_else(|| PlyError::NothingToSave {
            since: "HEAD^".to_owned(),
        })?;

        let changed = patch_repo.write_patch(name, source)?;
        patch_repo.append_if_absent(name)?;
        Ok(changed)
    }

    fn annotate_head(&self, name: &str) -> Result<(), PlyError> {
        let message = self.git.log(1, 0, "%B")?;
        self.git
            .commit(&annotation::annotate(&message, name), true)?;
        Ok(())
    }

    fn head_annotation(&self) -> Result<Option<String>, PlyError> {
        let message = self.git.log(1, 0, "%B")?;
        Ok(annotation::extract(&message).map(str::to_owned))
    }
}

/// Slugify a commit subject into a patch file name.
fn slugify(subject: &str) -> String {
    let kept: String = subject
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    let mut name = kept.replace(' ', "-");
    name.push_str(".patch");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn slugify_keeps_alphanumerics_and_hyphenates_spaces() {
        assert_eq!(slugify("Fix login bug!!"), "Fix-login-bug.patch");
        assert_eq!(slugify("Add quota support"), "Add-quota-support.patch");
        assert_eq!(slugify("v2.1: rework (again)"), "v21-rework-again.patch");
        assert_eq!(slugify(""), ".patch");
    }

    #[test]
    fn patch_repo_link_round_trips() {
        let working = TempDir::new().unwrap();
        let patches = TempDir::new().unwrap();
        let repo = WorkingRepo::open(working.path());

        repo.link(patches.path()).unwrap();
        assert_eq!(repo.patch_repo().unwrap().root(), patches.path());

        // Relinking replaces the old reference.
        let other = TempDir::new().unwrap();
        repo.link(other.path()).unwrap();
        assert_eq!(repo.patch_repo().unwrap().root(), other.path());

        repo.unlink().unwrap();
        repo.unlink().unwrap(); // idempotent
        let err = repo.patch_repo().unwrap_err();
        assert!(matches!(err, PlyError::PatchRepoNotLinked { .. }));
    }

    #[test]
    fn relative_link_resolves_against_working_root() {
        let working = TempDir::new().unwrap();
        let repo = WorkingRepo::open(working.path());

        repo.link(Path::new("../patches")).unwrap();
        assert_eq!(
            repo.patch_repo().unwrap().root(),
            working.path().join("../patches")
        );
    }

    #[test]
    fn plain_file_link_is_accepted() {
        // Fallback form: .PATCH_REPO as a text file holding the path.
        let working = TempDir::new().unwrap();
        let repo = WorkingRepo::open(working.path());
        fs::write(working.path().join(PATCH_REPO_LINK), "/srv/patches\n").unwrap();

        assert_eq!(
            repo.patch_repo().unwrap().root(),
            Path::new("/srv/patches")
        );
    }
}
