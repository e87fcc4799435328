//! SyncEngine implementation
//!
//! Runs a manifest: every content entry is fetched into a private staging
//! area under `.vendo-tmp`, filtered into its directory's assembly tree,
//! and each directory is swapped into place once all of its contents
//! succeeded. The lock document is written last.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vendo_cache::{CacheConfig, ContentCache};
use vendo_fs::{NormalizedPath, PathFilter};
use vendo_meta::{ContentSpec, DirectorySpec, LockConfig, Manifest, SourceSpec};
use vendo_oci::Registry;

use super::report::{ActionKind, SyncAction, SyncReport};
use crate::fetch::{self, FetchContext, FetchResult, ToolPaths};
use crate::lock::LockRecorder;
use crate::{Error, Result};

/// Scratch directory for in-progress fetches, relative to the root.
pub const STAGING_DIR: &str = ".vendo-tmp";

/// Default lock file name, relative to the root.
pub const DEFAULT_LOCK_FILE: &str = "vendo.lock.yml";

/// Options for a sync run
#[derive(Clone, Default)]
pub struct SyncOptions {
    /// Pin every content to its entry in the existing lock file
    pub locked: bool,
    /// Lock file location; [`DEFAULT_LOCK_FILE`] under the root if unset
    pub lock_path: Option<PathBuf>,
    /// Content cache; caching is disabled if unset
    pub cache: Option<CacheConfig>,
    /// Registry used for every OCI source instead of the network
    pub registry: Option<Arc<dyn Registry>>,
    pub tools: ToolPaths,
}

/// Engine for syncing a manifest into a root directory
pub struct SyncEngine {
    root: PathBuf,
    options: SyncOptions,
}

/// Removes the staging root when the run ends, however it ends.
struct StagingGuard {
    path: PathBuf,
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        vendo_fs::io::remove_dir_best_effort(&self.path);
    }
}

impl SyncEngine {
    /// Create an engine syncing into `root`. Directory paths and local
    /// sources in the manifest are relative to `root`.
    pub fn new(root: impl Into<PathBuf>, options: SyncOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the lock file this engine reads and writes.
    pub fn lock_path(&self) -> PathBuf {
        self.options
            .lock_path
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_LOCK_FILE))
    }

    /// Sync `manifest`, discarding progress notifications.
    pub fn sync(&self, manifest: &Manifest) -> Result<SyncReport> {
        self.sync_with(manifest, |_| {})
    }

    /// Sync `manifest`, passing every action to `observer` as it happens.
    ///
    /// # Errors
    ///
    /// Stops at the first failing content. Directories completed before
    /// the failure stay placed; the failing directory is left untouched and
    /// no lock file is written. A lock file from an earlier run is kept as
    /// it was, so it may no longer describe the directories already placed
    /// by this run.
    pub fn sync_with(&self, manifest: &Manifest, mut observer: impl FnMut(&SyncAction)) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut emit = |action: SyncAction| {
            observer(&action);
            report.actions.push(action);
        };

        manifest.check_minimum_version(env!("CARGO_PKG_VERSION"))?;
        vendo_meta::validation::validate(manifest)?;
        self.check_engine_paths(manifest)?;

        let lock_path = self.lock_path();
        let previous_lock = if self.options.locked {
            if !lock_path.exists() {
                return Err(Error::LockFileMissing { path: lock_path });
            }
            Some(LockConfig::load(&lock_path)?)
        } else {
            None
        };

        let staging = self.root.join(STAGING_DIR);
        if staging.exists() {
            tracing::debug!(path = %staging.display(), "Removing stale staging directory");
            fs::remove_dir_all(&staging).map_err(|e| vendo_fs::Error::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| vendo_fs::Error::io(&staging, e))?;
        let _guard = StagingGuard { path: staging.clone() };

        let cache = self.open_cache();
        let ctx = FetchContext {
            manifest,
            root: &self.root,
            cache: cache.as_ref(),
            registry: self.options.registry.as_deref(),
            tools: &self.options.tools,
        };

        let mut recorder = LockRecorder::new();
        for (index, directory) in manifest.config.directories.iter().enumerate() {
            let directory_staging = staging.join(format!("dir-{index}"));
            let assembled = directory_staging.join("assembled");
            fs::create_dir_all(&assembled).map_err(|e| vendo_fs::Error::io(&assembled, e))?;

            for (content_index, content) in directory.contents.iter().enumerate() {
                let result = self.sync_content(
                    &ctx,
                    previous_lock.as_ref(),
                    directory,
                    content,
                    &directory_staging.join(format!("content-{content_index}")),
                    &assembled,
                    &mut emit,
                )?;
                recorder.record(directory, content, &result);
            }

            let dest = self.root.join(NormalizedPath::new(&directory.path).to_native());
            vendo_fs::place::replace_dir(&assembled, &dest).map_err(|source| Error::Placement {
                path: dest.clone(),
                source,
            })?;
            tracing::info!(directory = %directory.path, "Placed directory");
            emit(
                SyncAction::new(ActionKind::Place, format!("Placed {}", directory.path))
                    .at(&directory.path, None),
            );
        }

        recorder.finish().save(&lock_path)?;
        tracing::info!(path = %lock_path.display(), "Wrote lock file");
        emit(SyncAction::new(
            ActionKind::Lock,
            format!("Wrote lock file {}", lock_path.display()),
        ));

        Ok(report)
    }

    /// Fetch one content and filter it into `assembled`.
    #[allow(clippy::too_many_arguments)]
    fn sync_content(
        &self,
        ctx: &FetchContext<'_>,
        previous_lock: Option<&LockConfig>,
        directory: &DirectorySpec,
        content: &ContentSpec,
        staging: &Path,
        assembled: &Path,
        emit: &mut impl FnMut(SyncAction),
    ) -> Result<FetchResult> {
        let kind = content.source.kind_name();
        let wrap = |source: Error| Error::ContentFailed {
            directory: directory.path.clone(),
            path: content.path.clone(),
            kind,
            source: Box::new(source),
        };

        let mut source = content.source.clone();
        if let Some(lock) = previous_lock {
            let locked = lock
                .find(&directory.path, &content.path)
                .ok_or_else(|| Error::LockEntryMissing {
                    directory: directory.path.clone(),
                    path: content.path.clone(),
                })?;
            locked.pin(&mut source, &content.path)?;
            tracing::debug!(path = %content.path, locked = %locked.describe(), "Pinned to lock entry");
        }

        emit(
            SyncAction::new(ActionKind::Fetch, format!("Fetching {kind} into {}/{}", directory.path, content.path))
                .at(&directory.path, Some(&content.path)),
        );

        let fetched = staging.join("fetched");
        let result = fetch::fetch(ctx, &source, &staging.join("work"), &fetched).map_err(wrap)?;

        for event in &result.cache_events {
            if let Some(action) = SyncAction::from_cache_event(event) {
                emit(action.at(&directory.path, Some(&content.path)));
            }
        }
        if result.pulled {
            emit(
                SyncAction::new(ActionKind::Pull, format!("Pulled {}", result.locked.describe()))
                    .at(&directory.path, Some(&content.path)),
            );
        }

        // A fetcher that found nothing to write may not have created `fetched`
        fs::create_dir_all(&fetched).map_err(|e| vendo_fs::Error::io(&fetched, e))?;

        let filter = PathFilter::new(
            &content.include_paths,
            &content.exclude_paths,
            &content.legal_paths,
            content.new_root_path.as_deref(),
        )?;
        let content_path = NormalizedPath::new(&content.path);
        let target = if content_path.is_current() {
            // Sole content of its directory; take over the empty assembly root
            fs::remove_dir(assembled).map_err(|e| wrap(vendo_fs::Error::io(assembled, e).into()))?;
            assembled.to_path_buf()
        } else {
            assembled.join(content_path.to_native())
        };
        if filter.is_noop() {
            vendo_fs::copy::move_dir(&fetched, &target).map_err(|e| wrap(e.into()))?;
        } else {
            filter.apply(&fetched, &target).map_err(|e| wrap(e.into()))?;
        }

        Ok(result)
    }

    /// Reject directories that would swallow the engine's own files.
    fn check_engine_paths(&self, manifest: &Manifest) -> Result<()> {
        let staging = NormalizedPath::new(STAGING_DIR);
        let lock_path = self.lock_path();
        let lock_relative = lock_path
            .strip_prefix(&self.root)
            .ok()
            .map(NormalizedPath::new);

        let staging_root = fs::canonicalize(&self.root)
            .unwrap_or_else(|_| self.root.clone())
            .join(STAGING_DIR);

        for directory in &manifest.config.directories {
            for content in &directory.contents {
                if let SourceSpec::Directory(source) = &content.source
                    && let Ok(src) = fs::canonicalize(self.root.join(&source.path))
                    && staging_root.starts_with(&src)
                {
                    return Err(Error::ConfigConflict {
                        message: format!(
                            "directory source '{}' of '{}/{}' contains the staging directory {STAGING_DIR}",
                            source.path, directory.path, content.path
                        ),
                    });
                }
            }

            let path = NormalizedPath::new(&directory.path);
            if path.overlaps(&staging) {
                return Err(Error::ConfigConflict {
                    message: format!("directory '{}' overlaps the staging directory {STAGING_DIR}", directory.path),
                });
            }
            if let Some(lock) = &lock_relative
                && path.contains(lock)
            {
                return Err(Error::ConfigConflict {
                    message: format!(
                        "directory '{}' would replace the lock file {}",
                        directory.path,
                        lock_path.display()
                    ),
                });
            }
        }
        Ok(())
    }

    fn open_cache(&self) -> Option<ContentCache> {
        let config = self.options.cache.clone()?;
        match ContentCache::open(config) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "Content cache unavailable; continuing without it");
                None
            }
        }
    }
}
