//! Commit-message trailer protocol.
//!
//! Working-repo commits that were produced by applying a patch carry a
//! `Ply-Patch: <name>` trailer; patch-repo commits carry a
//! `Ply-Based-On: <hash>` trailer recording the upstream commit the patches
//! were verified against. Pure string manipulation — no I/O, no git.

/// Trailer label linking a working-repo commit to its patch file.
pub const PATCH_TRAILER: &str = "Ply-Patch";

/// Trailer label recording working-repo provenance on patch-repo commits.
pub const BASED_ON_TRAILER: &str = "Ply-Based-On";

/// Append a `Ply-Patch` trailer to a commit message.
///
/// The trailer is separated from the body by exactly one blank line. The
/// caller amends the commit with the returned message so only the message
/// changes, never the tree.
#[must_use]
pub fn annotate(message: &str, patch_name: &str) -> String {
    format!("{}\n\n{PATCH_TRAILER}: {patch_name}", message.trim_end())
}

/// Append a `Ply-Based-On` trailer to a patch-repo commit message.
#[must_use]
pub fn stamp_provenance(message: &str, commit_hash: &str) -> String {
    format!("{}\n\n{BASED_ON_TRAILER}: {commit_hash}", message.trim_end())
}

/// Extract the patch name from a commit message's `Ply-Patch` trailer.
///
/// First match wins; an unannotated message yields `None`, never an error.
#[must_use]
pub fn extract(message: &str) -> Option<&str> {
    message
        .lines()
        .find_map(|line| line.strip_prefix("Ply-Patch: "))
        .map(str::trim)
}
