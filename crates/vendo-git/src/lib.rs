//! Git sources for vendo
//!
//! Fetches a repository into a scratch directory with git2, resolves the
//! requested reference, verifies its PGP signature against a trusted key
//! set when one is configured, checks it out and initializes submodules.
//! Fetched repositories can be snapshotted into the content cache keyed by
//! the remote's resolved object id.

pub mod error;
pub mod fetch;
pub mod resolve;
pub mod signature;
pub mod verify;

pub use error::{Error, Result};
pub use fetch::{Credentials, GitFetch, GitOutcome};
pub use signature::{ObjectKind, SignedObject};
pub use verify::{PgpPublicKey, SignatureCheck, Verifier};
