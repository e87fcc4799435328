//! Filesystem primitives for vendo
//!
//! Provides the building blocks the sync engine stages content with:
//! atomic writes, archive unpacking, recursive copies, path filtering
//! and atomic directory placement.

pub mod archive;
pub mod checksum;
pub mod copy;
pub mod error;
pub mod filter;
pub mod io;
pub mod path;
pub mod place;

pub use archive::ArchiveKind;
pub use error::{Error, Result};
pub use filter::PathFilter;
pub use path::NormalizedPath;
