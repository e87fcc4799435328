//! Normalized relative paths
//!
//! Manifest paths and archive entries are compared using forward slashes
//! regardless of platform; conversion to native form happens at I/O time.

use std::path::{Component, Path, PathBuf};

/// A path normalized to use forward slashes internally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath {
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    ///
    /// Backslashes become forward slashes, `.` segments and duplicate or
    /// trailing separators are dropped.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let raw = path.as_ref().to_string_lossy().replace('\\', "/");
        let absolute = raw.starts_with('/');
        let segments: Vec<&str> = raw
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let mut inner = segments.join("/");
        if absolute {
            inner.insert(0, '/');
        }
        if inner.is_empty() {
            inner.push('.');
        }
        Self { inner }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Whether this path is the current directory (`.`).
    pub fn is_current(&self) -> bool {
        self.inner == "."
    }

    /// Whether the path is relative and never climbs above its base.
    pub fn is_contained(&self) -> bool {
        let path = Path::new(&self.inner);
        !path.is_absolute()
            && !self.inner.starts_with('/')
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    }

    /// Whether `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &NormalizedPath) -> bool {
        if self.is_current() {
            return true;
        }
        other.inner == self.inner
            || other
                .inner
                .strip_prefix(&self.inner)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Whether either path contains the other.
    pub fn overlaps(&self, other: &NormalizedPath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}
