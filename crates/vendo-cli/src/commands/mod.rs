//! Command implementations for vendo-cli

pub mod sync;

pub use sync::run_sync;
