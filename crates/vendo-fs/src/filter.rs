//! Include/exclude path filtering for fetched content
//!
//! Patterns are glob expressions matched against forward-slash paths
//! relative to the content root. `*` does not cross directory separators,
//! `**` does.

use std::fs;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::copy::copy_entry;
use crate::{Error, NormalizedPath, Result};

/// Legal files kept whenever include paths are in effect.
pub const DEFAULT_LEGAL_PATHS: &[&str] = &[
    "LICENSE*",
    "**/LICENSE*",
    "LICENCE*",
    "**/LICENCE*",
    "NOTICE*",
    "**/NOTICE*",
    "COPYING*",
    "**/COPYING*",
    "COPYRIGHT*",
    "**/COPYRIGHT*",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled path filter for one content entry.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    legal: Vec<Pattern>,
    new_root: Option<NormalizedPath>,
}

impl PathFilter {
    /// Compile a filter.
    ///
    /// An empty `legal` list falls back to [`DEFAULT_LEGAL_PATHS`].
    pub fn new(
        include: &[String],
        exclude: &[String],
        legal: &[String],
        new_root: Option<&str>,
    ) -> Result<Self> {
        let legal = if legal.is_empty() {
            compile(DEFAULT_LEGAL_PATHS.iter().copied())?
        } else {
            compile(legal.iter().map(String::as_str))?
        };
        Ok(Self {
            include: compile(include.iter().map(String::as_str))?,
            exclude: compile(exclude.iter().map(String::as_str))?,
            legal,
            new_root: new_root
                .map(NormalizedPath::new)
                .filter(|p| !p.is_current()),
        })
    }

    /// Whether applying this filter would keep every file unchanged.
    pub fn is_noop(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && self.new_root.is_none()
    }

    /// Whether a file at `relative` (forward slashes) is kept.
    pub fn keeps(&self, relative: &str) -> bool {
        let matches = |patterns: &[Pattern]| {
            patterns
                .iter()
                .any(|p| p.matches_with(relative, MATCH_OPTIONS))
        };

        if !self.include.is_empty() && !matches(&self.include) && !matches(&self.legal) {
            return false;
        }
        !matches(&self.exclude)
    }

    /// Copy the kept files of `src` into `dest`.
    ///
    /// When a new root path is configured, only content below it is
    /// considered and it becomes the root of `dest`.
    pub fn apply(&self, src: &Path, dest: &Path) -> Result<()> {
        let root = match &self.new_root {
            Some(new_root) => {
                let root = src.join(new_root.to_native());
                if !root.is_dir() {
                    return Err(Error::NewRootPathMissing {
                        path: new_root.to_string(),
                    });
                }
                root
            }
            None => src.to_path_buf(),
        };

        fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

        for entry in WalkDir::new(&root).follow_links(false).min_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&root).to_path_buf();
                Error::io(path, e.into())
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let relative = NormalizedPath::new(relative);
            if !self.keeps(relative.as_str()) {
                tracing::trace!(path = %relative, "Filtered out");
                continue;
            }
            copy_entry(entry.path(), &dest.join(relative.to_native()), entry.file_type())?;
        }
        Ok(())
    }
}

fn compile<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<Vec<Pattern>> {
    patterns
        .map(|raw| {
            Pattern::new(raw).map_err(|e| Error::InvalidPattern {
                pattern: raw.to_string(),
                message: e.msg.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_filter_is_noop_and_keeps_everything() {
        let filter = PathFilter::new(&[], &[], &[], None).unwrap();
        assert!(filter.is_noop());
        assert!(filter.keeps("any/file.txt"));
    }

    #[rstest]
    #[case("src/main.go", true)]
    #[case("src/nested/lib.go", true)]
    #[case("docs/readme.md", false)]
    #[case("LICENSE", true)]
    #[case("third_party/NOTICE.txt", true)]
    fn include_keeps_matches_and_legal(#[case] path: &str, #[case] kept: bool) {
        let filter = PathFilter::new(&strings(&["src/**/*"]), &[], &[], None).unwrap();
        assert_eq!(filter.keeps(path), kept);
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter =
            PathFilter::new(&strings(&["src/**/*"]), &strings(&["**/*_test.go"]), &[], None)
                .unwrap();
        assert!(filter.keeps("src/a.go"));
        assert!(!filter.keeps("src/a_test.go"));
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let filter = PathFilter::new(&strings(&["*.md"]), &[], &strings(&["NONE"]), None).unwrap();
        assert!(filter.keeps("README.md"));
        assert!(!filter.keeps("docs/guide.md"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = PathFilter::new(&strings(&["a/**b"]), &[], &[], None).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn apply_with_new_root_promotes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("charts/app")).unwrap();
        fs::write(src.join("charts/app/Chart.yaml"), "name: app").unwrap();
        fs::write(src.join("README.md"), "top").unwrap();

        let filter = PathFilter::new(&[], &[], &[], Some("charts")).unwrap();
        let dest = dir.path().join("dest");
        filter.apply(&src, &dest).unwrap();

        assert!(dest.join("app/Chart.yaml").exists());
        assert!(!dest.join("README.md").exists());
    }

    #[test]
    fn apply_missing_new_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let filter = PathFilter::new(&[], &[], &[], Some("missing")).unwrap();
        let err = filter.apply(dir.path(), &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::NewRootPathMissing { .. }));
    }
}
