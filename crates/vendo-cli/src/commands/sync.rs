//! The sync command
//!
//! Loads the manifest, builds [`SyncOptions`] from flags and environment,
//! and streams every action to stdout as it happens.

use std::io::Read;
use std::path::{Path, PathBuf};

use colored::Colorize;

use vendo_cache::CacheConfig;
use vendo_core::{ActionKind, DEFAULT_LOCK_FILE, SyncAction, SyncEngine, SyncOptions, ToolPaths};
use vendo_meta::Manifest;

use crate::cli::SyncArgs;
use crate::error::{CliError, Result};

/// Manifest file name that means "read standard input".
const STDIN_MARKER: &str = "-";

/// Run the sync command
pub fn run_sync(args: &SyncArgs) -> Result<()> {
    match sync(args) {
        Ok(()) => Ok(()),
        Err(e) => {
            if args.json {
                print_action(&SyncAction::new(ActionKind::Error, e.to_string()), true);
            }
            if args.allow_errors {
                eprintln!("{}: {}", "error".red().bold(), e);
                tracing::debug!("Ignoring sync failure (--allow-errors)");
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

fn sync(args: &SyncArgs) -> Result<()> {
    if let Some(dir) = &args.chdir {
        std::env::set_current_dir(dir).map_err(|e| {
            CliError::user(format!("Cannot change directory to {}: {}", dir.display(), e))
        })?;
    }
    let root = dunce::canonicalize(std::env::current_dir()?)?;

    let (manifest, manifest_dir) = load_manifest(&args.file, &root)?;
    let lock_path = match &args.lock_file {
        Some(path) => root.join(path),
        None => manifest_dir.join(DEFAULT_LOCK_FILE),
    };
    let cache = match &args.cache_dir {
        Some(dir) => Some(CacheConfig::from_parts(root.join(dir), &args.cache_max_size)?),
        None => None,
    };
    tracing::debug!(
        root = %root.display(),
        lock = %lock_path.display(),
        cache = cache.is_some(),
        locked = args.locked,
        "Starting sync"
    );

    let options = SyncOptions {
        locked: args.locked,
        lock_path: Some(lock_path),
        cache,
        registry: None,
        tools: ToolPaths::from_env(),
    };
    let engine = SyncEngine::new(&root, options);
    let report = engine.sync_with(&manifest, |action| print_action(action, args.json))?;

    if !args.json {
        let placed = report.of_kind(ActionKind::Place).count();
        println!(
            "{} Synced {} {}.",
            "OK".green().bold(),
            placed,
            if placed == 1 { "directory" } else { "directories" }
        );
    }
    Ok(())
}

/// Read the manifest from `file` (or stdin) and return it with the
/// directory its lock file defaults to.
fn load_manifest(file: &str, root: &Path) -> Result<(Manifest, PathBuf)> {
    if file == STDIN_MARKER {
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        return Ok((Manifest::from_yaml_str(&content)?, root.to_path_buf()));
    }

    let path = root.join(file);
    if !path.is_file() {
        return Err(CliError::user(format!("Manifest not found: {}", path.display())));
    }
    let manifest = Manifest::load(&path)?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    Ok((manifest, dir))
}

fn print_action(action: &SyncAction, json: bool) {
    if json {
        match serde_json::to_string(action) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize action"),
        }
        return;
    }

    let marker = match action.action {
        ActionKind::Fetch => "=>".blue().bold(),
        ActionKind::Pull => "  pull".cyan(),
        ActionKind::Unbundle => "  unbundle".cyan(),
        ActionKind::CacheStore => "  cache".dimmed(),
        ActionKind::CacheSkip => "  cache".yellow(),
        ActionKind::Place => "+".green().bold(),
        ActionKind::Lock => "+".green().bold(),
        ActionKind::Error => "!".red().bold(),
    };
    println!("{} {}", marker, action.message);
}
