//! In-memory registry implementation for testing
//!
//! Implements the registry trait directly instead of standing up an HTTP
//! server, so the restore walk can be exercised deterministically.

use crate::common::fixtures;
use fhir_restore::domain::{PackageReference, normalize_name};
use fhir_restore::error::{RegistryError, Result};
use fhir_restore::registry::{PackageRegistry, VersionListing};
use fhir_restore::restore::sha1_hex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Mock package data for testing
#[derive(Debug, Clone)]
pub struct MockPackageData {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<(String, String)>,
    pub resources: Vec<(String, serde_json::Value)>,
}

impl MockPackageData {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, name: &str, range: &str) -> Self {
        self.dependencies.push((name.to_string(), range.to_string()));
        self
    }

    pub fn with_resource(mut self, file_name: &str, resource: serde_json::Value) -> Self {
        self.resources.push((file_name.to_string(), resource));
        self
    }

    fn tarball(&self) -> Vec<u8> {
        let dependencies: Vec<(&str, &str)> = self
            .dependencies
            .iter()
            .map(|(name, range)| (name.as_str(), range.as_str()))
            .collect();
        let manifest = fixtures::create_sample_manifest(&self.name, &self.version, &dependencies);
        let resources: Vec<(&str, serde_json::Value)> = self
            .resources
            .iter()
            .map(|(file_name, resource)| (file_name.as_str(), resource.clone()))
            .collect();
        fixtures::build_package_tgz(&manifest, &resources)
    }
}

#[derive(Debug, Clone)]
struct StoredVersion {
    bytes: Vec<u8>,
    shasum: Option<String>,
}

/// In-memory package registry keyed by normalized package name.
#[derive(Default)]
pub struct MockRegistry {
    packages: Mutex<HashMap<String, BTreeMap<String, StoredVersion>>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a package with a correct SHA-1 digest.
    pub fn publish(&self, package: MockPackageData) {
        let bytes = package.tarball();
        let shasum = Some(sha1_hex(&bytes));
        self.store(&package.name, &package.version, bytes, shasum);
    }

    /// Publish a package whose listed digest will never match its bytes.
    pub fn publish_with_bad_shasum(&self, package: MockPackageData) {
        let bytes = package.tarball();
        self.store(
            &package.name,
            &package.version,
            bytes,
            Some("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_string()),
        );
    }

    /// Publish a package with no digest in its listing.
    pub fn publish_without_shasum(&self, package: MockPackageData) {
        let bytes = package.tarball();
        self.store(&package.name, &package.version, bytes, None);
    }

    /// Drop the published digests of every version of `name`.
    pub fn drop_shasums(&self, name: &str) {
        let mut packages = self.packages.lock().unwrap();
        if let Some(versions) = packages.get_mut(&normalize_name(name)) {
            for stored in versions.values_mut() {
                stored.shasum = None;
            }
        }
    }

    fn store(&self, name: &str, version: &str, bytes: Vec<u8>, shasum: Option<String>) {
        let mut packages = self.packages.lock().unwrap();
        packages
            .entry(normalize_name(name))
            .or_default()
            .insert(version.to_string(), StoredVersion { bytes, shasum });
    }
}

#[async_trait::async_trait]
impl PackageRegistry for MockRegistry {
    async fn list_versions(&self, name: &str) -> Result<BTreeMap<String, VersionListing>> {
        let packages = self.packages.lock().unwrap();
        let versions = packages.get(&normalize_name(name)).ok_or_else(|| {
            RegistryError::PackageNotFound {
                name: name.to_string(),
                version: "latest".to_string(),
            }
        })?;
        Ok(versions
            .iter()
            .map(|(version, stored)| {
                (
                    version.clone(),
                    VersionListing {
                        shasum: stored.shasum.clone(),
                        tarball: None,
                    },
                )
            })
            .collect())
    }

    async fn fetch_tarball(&self, reference: &PackageReference) -> Result<Vec<u8>> {
        let version = reference.version.as_deref().unwrap_or("latest");
        let packages = self.packages.lock().unwrap();
        packages
            .get(&normalize_name(&reference.name))
            .and_then(|versions| versions.get(version))
            .map(|stored| stored.bytes.clone())
            .ok_or_else(|| {
                RegistryError::PackageNotFound {
                    name: reference.name.clone(),
                    version: version.to_string(),
                }
                .into()
            })
    }
}
