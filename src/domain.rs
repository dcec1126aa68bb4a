//! Domain types: package references, dependencies, and version ordering

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalize a package name for comparison. Package names are
/// case-insensitive throughout the restore pipeline.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Package version with semantic ordering.
///
/// Uses semver ordering when the string parses as a semantic version and
/// falls back to a numeric-then-lexical component comparison otherwise, so
/// non-semver FHIR package versions (`4.0.1-ballot2`, `0.1`) still order
/// sensibly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    pub original: String,
    #[serde(skip)]
    semver: Option<semver::Version>,
}

impl PackageVersion {
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim_start_matches('v');
        let semver = semver::Version::parse(trimmed).ok();
        Self {
            original: s.to_string(),
            semver,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Dot-separated segments with any prerelease label split off the last
    /// numeric part.
    pub fn segments(&self) -> Vec<VersionSegment> {
        self.original
            .split('.')
            .map(|part| {
                let base = part.split('-').next().unwrap_or(part);
                match base.parse::<u64>() {
                    Ok(n) => VersionSegment::Number(n),
                    Err(_) => VersionSegment::Text(part.to_string()),
                }
            })
            .collect()
    }
}

/// One dot-separated segment of a version string.
///
/// Numeric segments order above textual ones, so a textual dev label such as
/// `current` never outranks a numbered release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSegment {
    Number(u64),
    Text(String),
}

impl PartialOrd for VersionSegment {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionSegment {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // The original string is the final tie-break in both arms so that
        // Ord agrees with the derived equality: distinct strings never
        // compare Equal ("v1.0.0" vs "1.0.0").
        match (&self.semver, &other.semver) {
            (Some(a), Some(b)) => a.cmp(b).then_with(|| self.original.cmp(&other.original)),
            _ => self
                .segments()
                .cmp(&other.segments())
                .then_with(|| self.original.cmp(&other.original)),
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// A concrete, installable `{name, version}` pointer.
///
/// A reference without a version is the "not found" result of version
/// resolution; it keeps the requested name for reporting.
///
/// Two references are equal iff their names match case-insensitively and
/// their versions match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReference {
    pub name: String,
    pub version: Option<String>,
}

impl PackageReference {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.version.is_some()
    }

    pub fn package_version(&self) -> Option<PackageVersion> {
        self.version.as_deref().map(PackageVersion::parse)
    }
}

impl PartialEq for PackageReference {
    fn eq(&self, other: &Self) -> bool {
        normalize_name(&self.name) == normalize_name(&other.name) && self.version == other.version
    }
}

impl Eq for PackageReference {}

impl std::hash::Hash for PackageReference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        normalize_name(&self.name).hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}#{}", self.name, version),
            None => write!(f, "{}#(not found)", self.name),
        }
    }
}

/// A `{name, range}` requirement before resolution.
///
/// `range` is `None` for "highest available" (equivalent to `latest`);
/// otherwise it holds a version-range expression (see [`crate::version`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDependency {
    pub name: String,
    pub range: Option<String>,
}

impl PackageDependency {
    pub fn new(name: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: Some(range.into()),
        }
    }

    pub fn latest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: None,
        }
    }

    pub fn range_str(&self) -> &str {
        self.range.as_deref().unwrap_or("latest")
    }
}

impl PartialEq for PackageDependency {
    fn eq(&self, other: &Self) -> bool {
        normalize_name(&self.name) == normalize_name(&other.name) && self.range == other.range
    }
}

impl Eq for PackageDependency {}

impl std::hash::Hash for PackageDependency {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        normalize_name(&self.name).hash(state);
        self.range.hash(state);
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.range_str())
    }
}
