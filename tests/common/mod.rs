//! Shared test helpers for ply integration tests.
//!
//! All tests run against real git repositories in temp directories — no
//! side effects outside the tempdir. Each fixture holds a working repo and
//! an initialized, linked patch repo with local git identity configured
//! (tests must not depend on global git config).

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use ply::{PatchRepo, WorkingRepo};

/// A working repo plus its linked patch repo, both under one tempdir.
pub struct Fixture {
    pub dir: TempDir,
    pub working: WorkingRepo,
    pub patches: PatchRepo,
}

impl Fixture {
    pub fn working_dir(&self) -> PathBuf {
        self.dir.path().join("working")
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.dir.path().join("patches")
    }
}

/// Run a git command, asserting success; returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// `git init` plus the local identity config every commit needs.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "--quiet"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Write a file and commit it.
pub fn commit_file(dir: &Path, file: &str, contents: &str, message: &str) {
    fs::write(dir.join(file), contents).expect("failed to write file");
    git(dir, &["add", file]);
    git(dir, &["commit", "--quiet", "-m", message]);
}

pub fn head_hash(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"])
}

pub fn head_message(dir: &Path) -> String {
    git(dir, &["log", "-1", "--pretty=%B"])
}

pub fn message_at(dir: &Path, skip: usize) -> String {
    git(dir, &["log", "-1", &format!("--skip={skip}"), "--pretty=%B"])
}

pub fn commit_count(dir: &Path) -> usize {
    git(dir, &["rev-list", "--count", "HEAD"])
        .parse()
        .expect("rev-list count")
}

/// Fresh fixture: working repo with one upstream commit, patch repo
/// initialized and linked.
pub fn setup() -> Fixture {
    let dir = TempDir::new().expect("failed to create temp dir");
    let working_dir = dir.path().join("working");
    let patches_dir = dir.path().join("patches");
    fs::create_dir_all(&working_dir).expect("mkdir working");
    fs::create_dir_all(&patches_dir).expect("mkdir patches");

    init_repo(&working_dir);
    init_repo(&patches_dir);

    let patches = PatchRepo::open(&patches_dir);
    patches.initialize().expect("initialize patch repo");

    let working = WorkingRepo::open(&working_dir);
    working.link(&patches_dir).expect("link patch repo");

    commit_file(&working_dir, "README", "upstream\n", "Initial upstream commit");

    Fixture {
        dir,
        working,
        patches,
    }
}
