//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// vendo - Declaratively vendor external content into a directory tree
#[derive(Parser, Debug)]
#[command(name = "vendo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Sync every directory of a manifest
    ///
    /// Examples:
    ///   vendo sync                        # Use vendo.yml in the current directory
    ///   vendo sync -f deps.yml --locked   # Replay the lock file exactly
    ///   cat vendo.yml | vendo sync -f -   # Read the manifest from stdin
    Sync(SyncArgs),
}

/// Arguments of `vendo sync`
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SyncArgs {
    /// Manifest file, or '-' for stdin
    #[arg(short, long, default_value = "vendo.yml")]
    pub file: String,

    /// Change to this directory before doing anything
    #[arg(long)]
    pub chdir: Option<PathBuf>,

    /// Fetch exactly what the lock file records
    #[arg(long)]
    pub locked: bool,

    /// Lock file path (default: vendo.lock.yml next to the manifest)
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// Output one JSON object per action
    #[arg(long)]
    pub json: bool,

    /// Report a failed sync but exit successfully
    #[arg(long)]
    pub allow_errors: bool,

    /// Cache directory; caching is disabled if unset
    #[arg(long, env = "VENDO_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache size budget, e.g. 500Mi or 2G
    #[arg(long, env = "VENDO_CACHE_MAX_SIZE", default_value = vendo_cache::DEFAULT_MAX_SIZE)]
    pub cache_max_size: String,
}
