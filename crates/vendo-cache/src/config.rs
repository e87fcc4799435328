//! Cache location and budget

use std::path::PathBuf;

use crate::{Error, Result};

/// Budget used when none is configured.
pub const DEFAULT_MAX_SIZE: &str = "1Gi";

/// Where the cache lives and how large it may grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub root: PathBuf,
    /// Maximum total size of stored artifacts, in bytes
    pub max_size: u64,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            root: root.into(),
            max_size,
        }
    }

    /// Build from a directory and a human-readable size such as `10M`.
    pub fn from_parts(root: impl Into<PathBuf>, max_size: &str) -> Result<Self> {
        Ok(Self::new(root, parse_size(max_size)?))
    }
}

/// Parse a size: plain bytes, decimal suffixes `K M G T` or binary suffixes
/// `Ki Mi Gi Ti`, each optionally followed by `B`.
pub fn parse_size(input: &str) -> Result<u64> {
    let invalid = |reason: &str| Error::InvalidSize {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(invalid("expected a number"));
    }
    let value: u64 = digits.parse().map_err(|_| invalid("number out of range"))?;

    let suffix = suffix.trim();
    let suffix = suffix
        .strip_suffix('B')
        .or_else(|| suffix.strip_suffix('b'))
        .unwrap_or(suffix);
    let multiplier: u64 = match suffix {
        "" => 1,
        "K" | "k" => 1_000,
        "M" | "m" => 1_000_000,
        "G" | "g" => 1_000_000_000,
        "T" | "t" => 1_000_000_000_000,
        "Ki" | "ki" => 1 << 10,
        "Mi" | "mi" => 1 << 20,
        "Gi" | "gi" => 1 << 30,
        "Ti" | "ti" => 1 << 40,
        _ => return Err(invalid("unknown unit")),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("size out of range"))
}
