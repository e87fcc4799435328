//! Content cache for vendo
//!
//! A key-addressed store of previously fetched artifacts (layer blobs,
//! bundle and repository snapshots) with least-recently-used eviction under
//! a total size budget. The cache directory may be shared by concurrent
//! `vendo` processes; the index and every admission/eviction decision are
//! serialized through an advisory lock file.
//!
//! ```text
//! <root>/
//!   .lock          advisory lock guarding index.json and blobs/
//!   index.json     key -> blob, size, last access
//!   blobs/<sha256(key)>
//! ```

pub mod config;
pub mod error;
mod index;
pub mod store;

pub use config::{CacheConfig, DEFAULT_MAX_SIZE, parse_size};
pub use error::{Error, Result};
pub use store::{CacheStatus, CachedArtifact, ContentCache, PutOutcome};
