//! Version-range resolution
//!
//! Pure resolution of a dependency range against a candidate version set.
//! The supported grammar:
//!
//! - `latest` (or an absent range): highest available version
//! - exact versions: `3.2.0`, `4.0.1-ballot`
//! - trailing-wildcard segments: `1.x`, `1.2.x`, `1.*`
//! - comparators, space-conjoined: `>=1.0.0`, `>=1.0.0 <2.0.0`
//! - hyphen ranges, inclusive: `1.0.0 - 2.0.0`
//! - pipe-separated alternatives: `1.x || 2.x`
//!
//! Malformed range strings never error: they match nothing, which the
//! caller surfaces as a missing dependency. Resolution is deterministic,
//! always selecting the maximum satisfying version. Numbered versions order
//! above purely textual labels, so a published `current` build never beats
//! a numbered release for `latest` or comparator ranges.

use crate::domain::{PackageDependency, PackageReference, PackageVersion, VersionSegment};

/// A parsed version-range expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRange {
    /// Highest available version.
    Latest,
    /// Exact version string match.
    Exact(String),
    /// Leading numeric segments; the remaining segments are wildcards.
    Wildcard(Vec<u64>),
    /// Conjunction of comparators, all of which must hold.
    Comparators(Vec<Comparator>),
    /// Disjunction: satisfied when any alternative is.
    Any(Vec<VersionRange>),
}

/// A single comparator such as `>=1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: ComparatorOp,
    pub version: PackageVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl VersionRange {
    /// Parses a range expression. Returns `None` for malformed input;
    /// callers treat that as "matches nothing".
    pub fn parse(range: &str) -> Option<Self> {
        let range = range.trim();
        if range.is_empty() || range.eq_ignore_ascii_case("latest") {
            return Some(Self::Latest);
        }

        if range.contains("||") {
            let alternatives = range
                .split("||")
                .map(|part| Self::parse_single(part.trim()))
                .collect::<Option<Vec<_>>>()?;
            return Some(Self::Any(alternatives));
        }

        Self::parse_single(range)
    }

    fn parse_single(range: &str) -> Option<Self> {
        if range.is_empty() {
            return None;
        }

        // Hyphen range: inclusive on both ends.
        if let Some((low, high)) = range.split_once(" - ") {
            let (low, high) = (low.trim(), high.trim());
            if !is_plain_version(low) || !is_plain_version(high) {
                return None;
            }
            return Some(Self::Comparators(vec![
                Comparator {
                    op: ComparatorOp::Gte,
                    version: PackageVersion::parse(low),
                },
                Comparator {
                    op: ComparatorOp::Lte,
                    version: PackageVersion::parse(high),
                },
            ]));
        }

        if range.starts_with(['>', '<', '=']) {
            let comparators = range
                .split_whitespace()
                .map(parse_comparator)
                .collect::<Option<Vec<_>>>()?;
            return Some(Self::Comparators(comparators));
        }

        if range
            .split('.')
            .any(|segment| matches!(segment, "x" | "X" | "*"))
        {
            return parse_wildcard(range);
        }

        if is_plain_version(range) {
            return Some(Self::Exact(range.to_string()));
        }

        None
    }

    /// Whether `version` satisfies this range.
    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Latest => true,
            Self::Exact(exact) => exact == version,
            Self::Wildcard(prefix) => wildcard_matches(prefix, version),
            Self::Comparators(comparators) => {
                let candidate = PackageVersion::parse(version);
                comparators.iter().all(|c| c.matches(&candidate))
            }
            Self::Any(alternatives) => alternatives.iter().any(|alt| alt.matches(version)),
        }
    }
}

impl Comparator {
    fn matches(&self, candidate: &PackageVersion) -> bool {
        use std::cmp::Ordering::*;
        match (self.op, candidate.cmp(&self.version)) {
            (ComparatorOp::Eq, Equal) => true,
            (ComparatorOp::Gt, Greater) => true,
            (ComparatorOp::Gte, Greater | Equal) => true,
            (ComparatorOp::Lt, Less) => true,
            (ComparatorOp::Lte, Less | Equal) => true,
            _ => false,
        }
    }
}

fn parse_comparator(token: &str) -> Option<Comparator> {
    let (op, rest) = if let Some(rest) = token.strip_prefix(">=") {
        (ComparatorOp::Gte, rest)
    } else if let Some(rest) = token.strip_prefix("<=") {
        (ComparatorOp::Lte, rest)
    } else if let Some(rest) = token.strip_prefix('>') {
        (ComparatorOp::Gt, rest)
    } else if let Some(rest) = token.strip_prefix('<') {
        (ComparatorOp::Lt, rest)
    } else if let Some(rest) = token.strip_prefix('=') {
        (ComparatorOp::Eq, rest)
    } else {
        return None;
    };

    let rest = rest.trim();
    if !is_plain_version(rest) {
        return None;
    }
    Some(Comparator {
        op,
        version: PackageVersion::parse(rest),
    })
}

fn parse_wildcard(range: &str) -> Option<VersionRange> {
    let mut prefix = Vec::new();
    let mut seen_wildcard = false;

    for segment in range.split('.') {
        match segment {
            "x" | "X" | "*" => seen_wildcard = true,
            _ if seen_wildcard => return None, // numeric after wildcard
            _ => prefix.push(segment.parse::<u64>().ok()?),
        }
    }

    seen_wildcard.then_some(VersionRange::Wildcard(prefix))
}

fn wildcard_matches(prefix: &[u64], version: &str) -> bool {
    let segments = PackageVersion::parse(version).segments();
    if segments.len() < prefix.len() {
        return false;
    }
    prefix
        .iter()
        .zip(segments.iter())
        .all(|(expected, actual)| matches!(actual, VersionSegment::Number(n) if n == expected))
}

/// A version string with no wildcard or comparator characters.
fn is_plain_version(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
}

/// Resolves a dependency against a candidate version set.
///
/// Picks the maximum available version that satisfies the dependency's
/// range. Returns a not-found reference when the set is empty, the range is
/// malformed, or nothing satisfies it. Pure and deterministic.
///
/// # Example
///
/// ```rust
/// use fhir_restore::domain::PackageDependency;
/// use fhir_restore::version::resolve;
///
/// let available = vec!["1.0.0".to_string(), "2.0.0".to_string()];
/// let reference = resolve(&available, &PackageDependency::new("pkg", "1.x"));
/// assert_eq!(reference.version.as_deref(), Some("1.0.0"));
/// ```
pub fn resolve(available: &[String], dependency: &PackageDependency) -> PackageReference {
    if available.is_empty() {
        return PackageReference::not_found(&dependency.name);
    }

    let range = match &dependency.range {
        None => VersionRange::Latest,
        Some(expr) => match VersionRange::parse(expr) {
            Some(range) => range,
            // Malformed ranges match nothing; the caller records Missing.
            None => return PackageReference::not_found(&dependency.name),
        },
    };

    available
        .iter()
        .filter(|candidate| range.matches(candidate))
        .max_by_key(|candidate| PackageVersion::parse(candidate))
        .map(|version| PackageReference::new(&dependency.name, version))
        .unwrap_or_else(|| PackageReference::not_found(&dependency.name))
}
