//! ply library crate — re-exports for integration tests.
//!
//! The primary interface is the `ply` binary. This lib.rs exposes the
//! internal modules so integration tests can drive the synchronizer, the
//! patch repo, and the git provider directly without going through the CLI.

pub mod annotation;
pub mod conflict;
pub mod diff;
pub mod error;
pub mod git;
pub mod patch_repo;
pub mod state;
pub mod working;

pub use error::PlyError;
pub use patch_repo::PatchRepo;
pub use working::WorkingRepo;
