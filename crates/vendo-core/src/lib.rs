//! Core orchestration layer for vendo
//!
//! This crate ties the source crates together:
//!
//! - **Fetch dispatch**: one entry point over the closed set of source kinds,
//!   including the Mercurial, HTTP, Helm, inline and local directory sources
//! - **SyncEngine**: validate, fetch into staging, filter, place atomically
//! - **Lock recording**: the resolved identity of every content, in order
//!
//! # Architecture
//!
//! ```text
//!                      vendo-cli
//!                          |
//!                     vendo-core
//!                          |
//!     +---------+----------+----------+---------+
//!     |         |          |          |         |
//! vendo-fs vendo-meta vendo-cache vendo-git vendo-oci
//! ```

pub mod error;
pub mod fetch;
pub mod lock;
pub mod sync;

pub use error::{Error, Result};
pub use fetch::{CacheEvent, FetchContext, FetchResult, ToolPaths, fetch};
pub use lock::LockRecorder;
pub use sync::{
    ActionKind, DEFAULT_LOCK_FILE, STAGING_DIR, SyncAction, SyncEngine, SyncOptions, SyncReport,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_failure_keeps_root_cause_message() {
        let error = Error::ContentFailed {
            directory: "vendor".to_string(),
            path: "lib".to_string(),
            kind: "directory",
            source: Box::new(Error::InvalidSource {
                message: "directory 'src' does not exist".to_string(),
            }),
        };

        let display = error.to_string();
        assert!(display.contains("vendor/lib"), "{display}");
        assert!(display.contains("does not exist"), "{display}");
        assert!(matches!(error.root(), Error::InvalidSource { .. }));
        assert!(!error.is_verification());
    }
}
