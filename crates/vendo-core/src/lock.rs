//! Lock recording
//!
//! Projects the ordered results of a sync into a [`LockConfig`]. The
//! projection is pure: the same contents and results always give the same
//! document.

use vendo_meta::{ContentSpec, DirectorySpec, LockConfig, LockContent, LockDirectory};

use crate::fetch::FetchResult;

/// Accumulates lock entries in directory and content order.
#[derive(Debug, Default)]
pub struct LockRecorder {
    directories: Vec<LockDirectory>,
}

impl LockRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of fetching `content` of `directory`.
    pub fn record(&mut self, directory: &DirectorySpec, content: &ContentSpec, result: &FetchResult) {
        let entry = LockContent {
            path: content.path.clone(),
            source: result.locked.clone(),
        };
        match self.directories.last_mut() {
            Some(last) if last.path == directory.path => last.contents.push(entry),
            _ => self.directories.push(LockDirectory {
                path: directory.path.clone(),
                contents: vec![entry],
            }),
        }
    }

    pub fn finish(self) -> LockConfig {
        LockConfig::new(self.directories)
    }
}
