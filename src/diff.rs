//! Patch-churn suppression.
//!
//! Regenerating a patch almost always perturbs it: blob hashes in `index`
//! lines change, hunk offsets shift, the git version trailer moves. None of
//! that is worth a patch-repo commit. Two passes keep the noise down:
//!
//! 1. [`normalize_patch`] strips the volatile parts of a freshly generated
//!    mailbox patch before it is stored.
//! 2. [`meaningful_diff`] classifies a zero-context diff between the stored
//!    and regenerated patch as cosmetic or meaningful; only meaningful
//!    changes overwrite the stored file.

use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::PlyError;

/// Classify a zero-context unified diff between two patch files.
///
/// Returns `true` iff the change is semantically meaningful. Hunk headers
/// and file headers are skipped; a removed `index` line paired with an
/// added `index` line carrying the same permission token is cosmetic (the
/// blob hashes changed, nothing else); any other content line is
/// immediately meaningful.
///
/// # Panics
///
/// An added `index` line with no pending removed `index` line, or a content
/// line while a removed `index` line is still pending, violates the pairing
/// contract — the diff stream is malformed or hand-crafted, which is not a
/// recoverable classification outcome.
#[must_use]
pub fn meaningful_diff(diff_output: &str) -> bool {
    let mut last_index_perms: Option<&str> = None;

    for line in diff_output.lines() {
        let line = line.trim();

        if line.is_empty()
            || line.starts_with("@@")
            || line.starts_with("-@@")
            || line.starts_with("+@@")
            || line.starts_with("---")
            || line.starts_with("+++")
        {
            continue;
        }

        if line.starts_with("-index") {
            last_index_perms = line.split_whitespace().last();
        } else if line.starts_with("+index") {
            let pending = last_index_perms.take();
            assert!(
                pending.is_some(),
                "added index line without a preceding removed index line: {line}"
            );
            if line.split_whitespace().last() != pending {
                // Permission token changed — a real mode change.
                return true;
            }
        } else {
            assert!(
                last_index_perms.is_none(),
                "removed index line without a matching added index line"
            );
            return true;
        }
    }

    false
}

/// Whether the regenerated patch at `fresh` differs meaningfully from the
/// stored patch at `stored`.
///
/// Spawns `diff -U0 <stored> <fresh>`: exit 0 means identical, exit 1 means
/// the output is classified by [`meaningful_diff`], anything else is an
/// error. When no `diff` binary is available, falls back to a byte
/// comparison — any difference counts as meaningful, so a real change is
/// never suppressed.
pub fn significant_change(stored: &Path, fresh: &Path) -> Result<bool, PlyError> {
    let output = match Command::new("diff")
        .arg("-U0")
        .arg(stored)
        .arg(fresh)
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(fs::read(stored)? != fs::read(fresh)?);
        }
        Err(e) => return Err(e.into()),
    };

    match output.status.code() {
        Some(0) => Ok(false),
        Some(1) => Ok(meaningful_diff(&String::from_utf8_lossy(&output.stdout))),
        code => Err(PlyError::DiffFailed {
            status: code.unwrap_or(-1),
        }),
    }
}

/// Normalize a freshly generated mailbox patch for stable storage.
///
/// Three rewrites, each targeting a token that changes on every
/// `format-patch` run without changing the patch's meaning:
/// - the mbox separator `From <40-hex-hash> <date>` becomes `From ply <date>`
/// - runs of blank lines collapse to a single blank line
/// - the version line after the `-- ` signature separator keeps only its
///   first three dot-components (`1.8.3.1.245.g39fd762` → `1.8.3`)
#[must_use]
pub fn normalize_patch(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_blank = false;
    let mut after_signature = false;

    for raw in text.lines() {
        let line: Cow<'_, str> = match raw.strip_prefix("From ") {
            Some(rest) => match rest.split_once(' ') {
                Some((hash, tail))
                    if hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit()) =>
                {
                    Cow::Owned(format!("From ply {tail}"))
                }
                _ => Cow::Borrowed(raw),
            },
            None if after_signature
                && raw.chars().next().is_some_and(|c| c.is_ascii_digit()) =>
            {
                Cow::Owned(raw.split('.').take(3).collect::<Vec<_>>().join("."))
            }
            None => Cow::Borrowed(raw),
        };

        after_signature = line == "-- ";

        let blank = line.is_empty();
        if blank && prev_blank {
            continue;
        }
        prev_blank = blank;

        out.push_str(&line);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_offset_churn_is_not_meaningful() {
        let diff_output = "\
--- 0061-Add-support-for-quotas-per-flavor-class.patch  2014-10-14 23:10:02.000000000 -0500
+++ ../nova-rax-patches/Add-support-for-quotas-per-flavor-class.patch   2014-10-14 23:08:42.000000000 -0500
@@ -26 +26 @@
-index 9c36fdf..a5e77a5 100644
+index f003fe4..a8a54b3 100644
@@ -145 +145 @@
-@@ -2491,8 +2519,8 @@ class API(base.Base):
+@@ -2490,8 +2518,8 @@ class API(base.Base):
@@ -190 +190 @@
-index dddd8bb..43589b4 100644
+index 83e3ae7..640bef8 100644
@@ -296 +296 @@
-@@ -2919,13 +2972,16 @@ def quota_get_all(context, project_id):
+@@ -2908,13 +2961,16 @@ def quota_get_all(context, project_id):
@@ -614 +614 @@
-index a0aa98e..3b42577 100644
+index 870641c..d230d5a 100644
";
        assert!(!meaningful_diff(diff_output));
    }

    #[test]
    fn permission_change_is_meaningful() {
        let diff_output = "\
-index bb67d0c..d9036a9 100644
+index dc13c14..7273178 100744
";
        assert!(meaningful_diff(diff_output));
    }

    #[test]
    fn content_line_is_meaningful() {
        let diff_output = "\
@@ -4 +4 @@
-SUBJECT = 'old subject'
+SUBJECT = 'new subject'
";
        assert!(meaningful_diff(diff_output));
    }

    #[test]
    fn empty_diff_is_not_meaningful() {
        assert!(!meaningful_diff(""));
        assert!(!meaningful_diff("\n\n"));
    }

    #[test]
    #[should_panic(expected = "added index line without a preceding removed index line")]
    fn unpaired_added_index_line_is_a_contract_violation() {
        meaningful_diff("+index dc13c14..7273178 100644\n");
    }

    #[test]
    #[should_panic(expected = "removed index line without a matching added index line")]
    fn dangling_removed_index_line_is_a_contract_violation() {
        meaningful_diff("-index bb67d0c..d9036a9 100644\n+some content\n");
    }

    #[test]
    fn normalize_strips_hash_collapses_blanks_and_truncates_version() {
        let original = "\
From 15f7e0465065ad2140c0a3bcb45a74cb99763a14 Mon Sep 17 00:00:00 2001
From: Rick Harris <rconradharris@gmail.com>
Date: Mon, 17 Jun 2013 11:35:48 -0500
Subject: Bar


diff --git a/README b/README
index bc56c4d..ebd7525 100644
--- a/README
+++ b/README
@@ -1 +1 @@
-Foo
+Bar
-- 
1.8.3.1.245.g39fd762

";
        let expected = "\
From ply Mon Sep 17 00:00:00 2001
From: Rick Harris <rconradharris@gmail.com>
Date: Mon, 17 Jun 2013 11:35:48 -0500
Subject: Bar

diff --git a/README b/README
index bc56c4d..ebd7525 100644
--- a/README
+++ b/README
@@ -1 +1 @@
-Foo
+Bar
-- 
1.8.3

";
        assert_eq!(normalize_patch(original), expected);
    }

    #[test]
    fn normalize_is_stable() {
        let once = normalize_patch("From ply Mon Sep 17 00:00:00 2001\nSubject: X\n\nbody\n");
        assert_eq!(normalize_patch(&once), once);
    }

    #[test]
    fn normalize_leaves_author_lines_alone() {
        // "From: " header lines are not the mbox separator.
        let text = "From: Someone <s@example.com>\n";
        assert_eq!(normalize_patch(text), text);
    }

    #[test]
    fn significant_change_detects_content_edits() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.patch");
        let b = dir.path().join("b.patch");

        fs::write(&a, "@@ -1 +1 @@\n-Foo\n+Bar\n").unwrap();
        fs::write(&b, "@@ -1 +1 @@\n-Foo\n+Baz\n").unwrap();
        assert!(significant_change(&a, &b).unwrap());

        fs::write(&b, "@@ -1 +1 @@\n-Foo\n+Bar\n").unwrap();
        assert!(!significant_change(&a, &b).unwrap());
    }
}
