//! Version constraints for declared dependencies
//!
//! A constraint is either a literal version, which must match exactly, or a
//! range expression. Ranges accept the usual semver operators plus a few
//! Helm-style forms:
//!
//! - `>= 1.0 < 2.0` (whitespace-separated comparators)
//! - `1.2 - 1.4.5` (hyphen range, inclusive)
//! - `^1.0 || ~2.3` (alternatives)

use semver::{Version, VersionReq};
use std::fmt;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Literal version string; only that version matches
    Exact { raw: String, version: Version },

    /// One or more alternatives, any of which may match
    Range {
        raw: String,
        alternatives: Vec<VersionReq>,
    },
}

impl VersionConstraint {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(CoreError::InvalidConstraint {
                constraint: input.to_string(),
                reason: "empty constraint".to_string(),
            });
        }

        if let Ok(version) = Version::parse(raw.strip_prefix('v').unwrap_or(raw)) {
            return Ok(Self::Exact {
                raw: raw.to_string(),
                version,
            });
        }

        let alternatives = raw
            .split("||")
            .map(|alt| {
                let normalized = normalize_alternative(alt.trim());
                VersionReq::parse(&normalized).map_err(|e| CoreError::InvalidConstraint {
                    constraint: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::Range {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// Whether `version` satisfies this constraint
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            Self::Exact { version: wanted, .. } => wanted == version,
            Self::Range { alternatives, .. } => alternatives.iter().any(|req| req.matches(version)),
        }
    }

    /// Match against a version string as published in an index
    ///
    /// Strings that are not semver only ever match an exact constraint
    /// written the same way.
    pub fn satisfies_str(&self, version: &str) -> bool {
        if let Self::Exact { raw, .. } = self
            && raw == version
        {
            return true;
        }

        match Version::parse(version.strip_prefix('v').unwrap_or(version)) {
            Ok(parsed) => self.satisfies(&parsed),
            Err(_) => false,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact { .. })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact { raw, .. } | Self::Range { raw, .. } => raw,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewrite whitespace-separated comparators and hyphen ranges into the
/// comma-separated form `semver` understands
fn normalize_alternative(alt: &str) -> String {
    if alt.contains(',') {
        return alt
            .split(',')
            .map(|part| pin_bare_version(part.trim()))
            .collect::<Vec<_>>()
            .join(", ");
    }

    let tokens: Vec<&str> = alt.split_whitespace().collect();

    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={}, <={}", low, high);
    }

    // Glue bare operators to the version that follows them
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| "<>=~^!".contains(c)) {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => comparators.push(format!("{}{}", op, token)),
            None => comparators.push(pin_bare_version(token)),
        }
    }
    if let Some(op) = pending_op {
        comparators.push(op.to_string());
    }

    comparators.join(", ")
}

/// An operator-less version matches exactly, as a standalone literal does.
/// `semver` would otherwise read it as a caret requirement. Wildcards such as
/// `1.x` or `*` are left alone.
fn pin_bare_version(token: &str) -> String {
    let version = token.strip_prefix('v').unwrap_or(token);
    let is_bare = version.starts_with(|c: char| c.is_ascii_digit())
        && !version.contains(['x', 'X', '*']);

    if is_bare {
        format!("={}", version)
    } else {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_literal_is_exact() {
        let c = VersionConstraint::parse("0.1.0").unwrap();
        assert!(c.is_exact());
        assert!(c.satisfies(&v("0.1.0")));
        assert!(!c.satisfies(&v("0.1.1")));
        assert!(!c.satisfies(&v("0.3.0")));
    }

    #[test]
    fn test_v_prefix_literal() {
        let c = VersionConstraint::parse("v1.2.3").unwrap();
        assert!(c.is_exact());
        assert!(c.satisfies(&v("1.2.3")));
        assert!(c.satisfies_str("v1.2.3"));
        assert!(c.satisfies_str("1.2.3"));
    }

    #[test]
    fn test_caret_and_tilde() {
        let caret = VersionConstraint::parse("^0.1.0").unwrap();
        assert!(!caret.is_exact());
        assert!(caret.satisfies(&v("0.1.5")));
        assert!(!caret.satisfies(&v("0.2.0")));

        let tilde = VersionConstraint::parse("~1.2.0").unwrap();
        assert!(tilde.satisfies(&v("1.2.9")));
        assert!(!tilde.satisfies(&v("1.3.0")));
    }

    #[test]
    fn test_comma_and_whitespace_ranges() {
        let comma = VersionConstraint::parse(">=1.0.0, <2.0.0").unwrap();
        let spaced = VersionConstraint::parse(">= 1.0.0 < 2.0.0").unwrap();

        for c in [&comma, &spaced] {
            assert!(c.satisfies(&v("1.5.0")));
            assert!(!c.satisfies(&v("2.0.0")));
            assert!(!c.satisfies(&v("0.9.0")));
        }
    }

    #[test]
    fn test_hyphen_range() {
        let c = VersionConstraint::parse("1.2.0 - 1.4.5").unwrap();
        assert!(c.satisfies(&v("1.2.0")));
        assert!(c.satisfies(&v("1.4.5")));
        assert!(!c.satisfies(&v("1.4.6")));
    }

    #[test]
    fn test_alternatives() {
        let c = VersionConstraint::parse("^1.0.0 || ^3.0.0").unwrap();
        assert!(c.satisfies(&v("1.9.0")));
        assert!(!c.satisfies(&v("2.0.0")));
        assert!(c.satisfies(&v("3.1.0")));
    }

    #[test]
    fn test_bare_versions_in_alternatives_are_exact() {
        let c = VersionConstraint::parse("1.0.0 || 2.0.0").unwrap();
        assert!(c.satisfies(&v("1.0.0")));
        assert!(c.satisfies(&v("2.0.0")));
        assert!(!c.satisfies(&v("1.5.0")));
        assert!(!c.satisfies(&v("2.0.1")));

        let prefixed = VersionConstraint::parse("v1.0.0 || ^3.0.0").unwrap();
        assert!(prefixed.satisfies(&v("1.0.0")));
        assert!(!prefixed.satisfies(&v("1.1.0")));
        assert!(prefixed.satisfies(&v("3.2.0")));

        let spaced = VersionConstraint::parse(">=1.0.0 1.2.0").unwrap();
        assert!(spaced.satisfies(&v("1.2.0")));
        assert!(!spaced.satisfies(&v("1.3.0")));

        let comma = VersionConstraint::parse(">=1.0.0, 1.2.0").unwrap();
        assert!(comma.satisfies(&v("1.2.0")));
        assert!(!comma.satisfies(&v("1.9.0")));
    }

    #[test]
    fn test_wildcards() {
        let c = VersionConstraint::parse("0.x").unwrap();
        assert!(c.satisfies(&v("0.3.0")));
        assert!(!c.satisfies(&v("1.0.0")));

        let any = VersionConstraint::parse("*").unwrap();
        assert!(any.satisfies(&v("12.4.1")));
    }

    #[test]
    fn test_prerelease_excluded_from_ranges() {
        let c = VersionConstraint::parse(">=1.0.0").unwrap();
        assert!(!c.satisfies(&v("2.0.0-rc.1")));

        let exact = VersionConstraint::parse("2.0.0-rc.1").unwrap();
        assert!(exact.satisfies(&v("2.0.0-rc.1")));
    }

    #[test]
    fn test_non_semver_index_versions() {
        let range = VersionConstraint::parse("^1.0.0").unwrap();
        assert!(!range.satisfies_str("latest"));

        let c = VersionConstraint::parse("1.0.0").unwrap();
        assert!(!c.satisfies_str("not-a-version"));
    }

    #[test]
    fn test_invalid_constraints() {
        assert!(matches!(
            VersionConstraint::parse("   "),
            Err(CoreError::InvalidConstraint { .. })
        ));
        assert!(VersionConstraint::parse(">=banana").is_err());
    }

    #[test]
    fn test_display_keeps_raw() {
        let c = VersionConstraint::parse(" >= 1.0 < 2.0 ").unwrap();
        assert_eq!(c.to_string(), ">= 1.0 < 2.0");
    }
}
