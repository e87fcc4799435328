//! Shared test fixtures for the vendo workspace.
//!
//! This crate is a dev-dependency only and never published.
//!
//! # Modules
//!
//! - [`git`] - upstream repositories built with the `git` CLI
//! - [`gpg`] - throwaway signing keys in an isolated `GNUPGHOME`
//! - [`http`] - a localhost file server for download tests

pub mod git;
pub mod gpg;
pub mod http;
