use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use ply::{PatchRepo, WorkingRepo};

mod telemetry;

/// Patch-stack manager for git
///
/// ply keeps your local modifications as an ordered series of patch files
/// in a separate, version-controlled patch repository, while applying them
/// as commits on top of your working checkout. Rebase onto a moving
/// upstream without losing the ability to edit or regenerate individual
/// patches.
///
/// QUICK START:
///
///   ply init ../my-patches        # create the patch repo
///   ply link ../my-patches        # point this checkout at it
///   git commit -m "Fix something" # author a change as usual
///   ply save                      # store it as Fix-something.patch
///
/// After pulling new upstream: ply restore. On a conflict, fix the files,
/// git add them, then ply resolve — once per conflicting patch.
#[derive(Parser)]
#[command(name = "ply")]
#[command(version, about)]
#[command(after_help = "See 'ply <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a patch repository
    ///
    /// Creates the directory, a git repo, and an empty series file with an
    /// initial commit. Safe to run multiple times — an existing series is
    /// left untouched.
    Init {
        /// Patch repository path
        path: PathBuf,
    },

    /// Link this working repo to a patch repository
    Link {
        /// Patch repository path
        path: PathBuf,
    },

    /// Remove the patch-repository link
    Unlink,

    /// Save the newest commit as a patch
    Save(SaveArgs),

    /// Apply the patch series on top of the current branch
    ///
    /// Each patch becomes one annotated commit. Stops at the first patch
    /// that does not apply cleanly; fix the conflict, stage the files, and
    /// run 'ply resolve'.
    Restore(RestoreArgs),

    /// Finish a conflict resolution and resume the restore
    Resolve,

    /// Verify that the applied patches agree with the series
    Check,
}

/// Save the newest commit as a patch
///
/// The patch name is the commit subject, slugified (alphanumerics kept,
/// spaces become hyphens, '.patch' appended). The working branch is then
/// rebuilt by replaying the whole series, so run this with a clean tree —
/// uncommitted changes are destroyed.
#[derive(Args, Debug)]
struct SaveArgs {
    /// Start of the new, unannotated work
    #[arg(long, default_value = "HEAD^")]
    since: String,

    /// Subdirectory within the patch repository
    #[arg(long)]
    prefix: Option<String>,
}

#[derive(Args, Debug)]
struct RestoreArgs {
    /// Apply patches without three-way merge fallback
    #[arg(long)]
    no_three_way: bool,
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            let repo = PatchRepo::open(&path);
            repo.initialize()?;
            println!("Initialized patch repo at {}", path.display());
            println!("Next: ply link {}", path.display());
            Ok(())
        }
        Commands::Link { path } => {
            let working = working_repo()?;
            working.link(&path)?;
            println!("Linked to patch repo at {}", path.display());
            Ok(())
        }
        Commands::Unlink => {
            working_repo()?.unlink()?;
            println!("Unlinked patch repo");
            Ok(())
        }
        Commands::Save(args) => {
            let working = working_repo()?;
            let name = working.save(&args.since, args.prefix.as_deref())?;
            println!("Saved {name}");
            Ok(())
        }
        Commands::Restore(args) => {
            let working = working_repo()?;
            surface_conflict(working.restore(!args.no_three_way))
        }
        Commands::Resolve => {
            let working = working_repo()?;
            surface_conflict(working.resolve())
        }
        Commands::Check => {
            working_repo()?.check()?;
            println!("Applied patches agree with the series");
            Ok(())
        }
    }
}

fn working_repo() -> Result<WorkingRepo> {
    let cwd = env::current_dir().context("Failed to determine current directory")?;
    Ok(WorkingRepo::open(cwd))
}

/// Turn the merge-conflict condition into guidance for the interactive
/// user; everything else propagates as-is.
fn surface_conflict(result: Result<(), ply::PlyError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_conflict() => {
            eprintln!("A patch did not apply cleanly.");
            eprintln!("  Fix the conflicts, stage the files with 'git add', then:");
            eprintln!("  Next: ply resolve");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
