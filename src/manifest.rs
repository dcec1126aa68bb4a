//! FHIR package manifest (package.json) model

use crate::domain::PackageDependency;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// FHIR package manifest (package.json) structure.
///
/// The dependency map values are version-range expressions, not concrete
/// versions; see [`crate::version`] for the grammar.
///
/// # Example
///
/// ```rust
/// use fhir_restore::manifest::PackageManifest;
///
/// let manifest: PackageManifest = serde_json::from_str(
///     r#"{"name": "hl7.fhir.us.core", "version": "3.2.0",
///         "dependencies": {"hl7.fhir.r4.core": "4.0.1"}}"#,
/// ).unwrap();
/// assert_eq!(manifest.dependencies().len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(rename = "fhirVersions", skip_serializing_if = "Option::is_none")]
    pub fhir_versions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PackageManifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            fhir_versions: None,
            dependencies: BTreeMap::new(),
            canonical: None,
            package_type: None,
            title: None,
            description: None,
        }
    }

    /// Declared dependencies as resolvable requirements.
    ///
    /// An empty or `latest` range maps to "highest available".
    pub fn dependencies(&self) -> Vec<PackageDependency> {
        self.dependencies
            .iter()
            .map(|(name, range)| {
                if range.is_empty() || range.eq_ignore_ascii_case("latest") {
                    PackageDependency::latest(name.clone())
                } else {
                    PackageDependency::new(name.clone(), range.clone())
                }
            })
            .collect()
    }
}
