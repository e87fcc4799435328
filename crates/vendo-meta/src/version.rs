//! Version constraints and tag selection.
//!
//! Tags are selected by filtering candidates against a constraint and
//! taking the highest match. Constraints are comparator lists separated by
//! commas or whitespace; all comparators must match.
//!
//! # Examples
//!
//! ```
//! use vendo_meta::version::VersionConstraint;
//!
//! let constraint = VersionConstraint::parse(">=1.2 <2.0.0").unwrap();
//! assert!(constraint.satisfies("v1.4.0"));
//! assert!(!constraint.satisfies("2.0.0"));
//! ```

use serde::Deserialize;

use crate::error::{Error, Result};

/// A single version comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    /// `>=`
    Gte,
    /// `>`
    Gt,
    /// `<=`
    Lte,
    /// `<`
    Lt,
    /// `=` or `==`
    Eq,
    /// `!=`
    Ne,
}

/// A single version specifier: an operator paired with a version.
#[derive(Debug, Clone)]
struct Specifier {
    op: CompareOp,
    version: semver::Version,
}

impl Specifier {
    fn matches(&self, candidate: &semver::Version) -> bool {
        match self.op {
            CompareOp::Gte => candidate >= &self.version,
            CompareOp::Gt => candidate > &self.version,
            CompareOp::Lte => candidate <= &self.version,
            CompareOp::Lt => candidate < &self.version,
            CompareOp::Eq => candidate == &self.version,
            CompareOp::Ne => candidate != &self.version,
        }
    }
}

/// A parsed version constraint that can be checked against concrete versions.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    specifiers: Vec<Specifier>,
    /// The original constraint string for display.
    raw: String,
}

impl VersionConstraint {
    /// Parse a constraint such as `>=1.0.0 <2.0.0` or `>1.2,!=1.3.0`.
    ///
    /// Version components can be `major.minor` (patch defaults to 0) or
    /// `major.minor.patch`, optionally prefixed with `v`.
    pub fn parse(constraint: &str) -> Result<Self> {
        let raw = constraint.to_string();
        let mut specifiers = Vec::new();

        for part in join_operators(constraint) {
            specifiers.push(parse_specifier(&part)?);
        }

        if specifiers.is_empty() {
            return Err(Error::VersionConstraintParse {
                constraint: raw,
                reason: "empty constraint".to_string(),
            });
        }

        Ok(Self { specifiers, raw })
    }

    /// Check if a version string satisfies this constraint.
    ///
    /// Returns `false` if the version string cannot be parsed.
    pub fn satisfies(&self, version: &str) -> bool {
        match normalize_version(version) {
            Ok(parsed) => self.satisfies_version(&parsed),
            Err(_) => false,
        }
    }

    /// Check if a `semver::Version` satisfies this constraint.
    pub fn satisfies_version(&self, version: &semver::Version) -> bool {
        self.specifiers.iter().all(|spec| spec.matches(version))
    }

    /// Return the original constraint string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// `tagSelection` / `refSelection` block of a source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionSelection {
    #[serde(default)]
    pub semver: Option<SemverSelection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemverSelection {
    #[serde(default)]
    pub constraints: String,
    /// Present: pre-releases are eligible (filtered by identifiers if any)
    #[serde(default)]
    pub prereleases: Option<PrereleaseSelection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrereleaseSelection {
    #[serde(default)]
    pub identifiers: Vec<String>,
}

impl VersionSelection {
    /// Pick the highest candidate tag satisfying this selection.
    ///
    /// Tags that are not versions are ignored. Returns the tag exactly as
    /// given (including any `v` prefix).
    pub fn select<'a>(&self, candidates: &'a [String]) -> Result<&'a str> {
        let semver = self.semver.clone().unwrap_or_default();
        let constraint = if semver.constraints.trim().is_empty() {
            None
        } else {
            Some(VersionConstraint::parse(&semver.constraints)?)
        };

        let best = candidates
            .iter()
            .filter_map(|tag| normalize_version(tag).ok().map(|v| (v, tag.as_str())))
            .filter(|(v, _)| prerelease_allowed(v, semver.prereleases.as_ref()))
            .filter(|(v, _)| constraint.as_ref().is_none_or(|c| c.satisfies_version(v)))
            .max_by(|(a, _), (b, _)| a.cmp(b));

        tracing::debug!(
            constraint = %semver.constraints,
            candidates = candidates.len(),
            selected = ?best.as_ref().map(|(_, tag)| *tag),
            "Selected version"
        );

        best.map(|(_, tag)| tag).ok_or_else(|| Error::NoMatchingVersion {
            constraint: semver.constraints.clone(),
            candidates: candidates.len(),
        })
    }
}

fn prerelease_allowed(version: &semver::Version, policy: Option<&PrereleaseSelection>) -> bool {
    if version.pre.is_empty() {
        return true;
    }
    match policy {
        None => false,
        Some(policy) if policy.identifiers.is_empty() => true,
        Some(policy) => version
            .pre
            .as_str()
            .split('.')
            .any(|id| policy.identifiers.iter().any(|allowed| allowed == id)),
    }
}

/// Split a constraint into comparator strings, re-attaching operators that
/// were separated from their version by whitespace (`>= 1.0`).
fn join_operators(constraint: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in constraint
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '!')) {
            pending_op = Some(token.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => parts.push(format!("{op}{token}")),
            None => parts.push(token.to_string()),
        }
    }
    parts
}

/// Parse a single specifier like `>=1.2` or `<1.3.0`.
fn parse_specifier(s: &str) -> Result<Specifier> {
    let (op, version_str) = if let Some(rest) = s.strip_prefix(">=") {
        (CompareOp::Gte, rest)
    } else if let Some(rest) = s.strip_prefix("<=") {
        (CompareOp::Lte, rest)
    } else if let Some(rest) = s.strip_prefix("!=") {
        (CompareOp::Ne, rest)
    } else if let Some(rest) = s.strip_prefix("==") {
        (CompareOp::Eq, rest)
    } else if let Some(rest) = s.strip_prefix('=') {
        (CompareOp::Eq, rest)
    } else if let Some(rest) = s.strip_prefix('>') {
        (CompareOp::Gt, rest)
    } else if let Some(rest) = s.strip_prefix('<') {
        (CompareOp::Lt, rest)
    } else {
        // Bare version implies ==
        (CompareOp::Eq, s)
    };

    let version_str = version_str.trim();
    let version = normalize_version(version_str).map_err(|_| Error::VersionConstraintParse {
        constraint: s.to_string(),
        reason: format!("invalid version: {version_str}"),
    })?;

    Ok(Specifier { op, version })
}

/// Normalize a version string to semver.
///
/// - `"v1.2.3"` -> `"1.2.3"`
/// - `"1.2"` -> `"1.2.0"`
/// - `"1"` -> error
fn normalize_version(s: &str) -> std::result::Result<semver::Version, String> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);

    if let Ok(v) = semver::Version::parse(s) {
        return Ok(v);
    }

    // major.minor, keeping any pre-release/build suffix in place
    let split = s.find(['-', '+']).unwrap_or(s.len());
    let (core, suffix) = s.split_at(split);
    if core.split('.').count() == 2 {
        let with_patch = format!("{core}.0{suffix}");
        return semver::Version::parse(&with_patch)
            .map_err(|e| format!("invalid version '{s}': {e}"));
    }
    Err(format!("invalid version '{s}'"))
}
