//! Sync orchestration
//!
//! - **engine**: validate, fetch, filter, place and lock
//! - **report**: the actions a sync performed, for human and JSON output

mod engine;
mod report;

pub use engine::{DEFAULT_LOCK_FILE, STAGING_DIR, SyncEngine, SyncOptions};
pub use report::{ActionKind, SyncAction, SyncReport};
