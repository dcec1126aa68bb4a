//! Registry client for FHIR package listings and tarball downloads
//!
//! The core only needs two operations from a registry: a version listing
//! with published digests, and tarball bytes for one concrete version. They
//! are expressed as the [`PackageRegistry`] trait so tests can substitute an
//! in-memory registry; [`HttpRegistry`] is the npm-protocol implementation.

use crate::config::RegistryConfig;
use crate::domain::PackageReference;
use crate::error::{RegistryError, Result};
use dashmap::DashMap;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry-published facts about one version of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionListing {
    /// SHA-1 digest of the tarball, lower-case hex, when published.
    pub shasum: Option<String>,
    pub tarball: Option<String>,
}

/// The registry operations the restore core depends on.
#[async_trait::async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Published versions of `name`, with digest and tarball location.
    async fn list_versions(&self, name: &str) -> Result<BTreeMap<String, VersionListing>>;

    /// Tarball bytes for one concrete version.
    async fn fetch_tarball(&self, reference: &PackageReference) -> Result<Vec<u8>>;
}

/// NPM-style package metadata response.
#[derive(Debug, Deserialize, Clone)]
struct NpmPackageResponse {
    #[serde(default)]
    versions: HashMap<String, NpmVersionInfo>,
    // Simple responses carry a single version at the top level
    version: Option<String>,
    dist: Option<NpmDistInfo>,
}

#[derive(Debug, Deserialize, Clone)]
struct NpmVersionInfo {
    dist: Option<NpmDistInfo>,
}

#[derive(Debug, Deserialize, Clone)]
struct NpmDistInfo {
    tarball: Option<String>,
    shasum: Option<String>,
}

/// HTTP registry client speaking the npm package protocol.
///
/// Carries a small in-memory listing cache and retries transient failures
/// with exponential backoff and jitter. Fallback registries are consulted
/// when the primary cannot serve a package.
pub struct HttpRegistry {
    client: Client,
    base_url: url::Url,
    retry_attempts: u32,
    fallback_registries: Vec<String>,
    listing_cache: Arc<DashMap<String, BTreeMap<String, VersionListing>>>,
}

impl HttpRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .connect_timeout(std::time::Duration::from_secs(5))
            .user_agent(concat!("fhir-restore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url =
            url::Url::parse(&config.url).map_err(|_| RegistryError::RegistryUnavailable {
                url: config.url.clone(),
            })?;

        Ok(Self {
            client,
            base_url,
            retry_attempts: config.retry_attempts.max(1),
            fallback_registries: vec![
                "https://packages.fhir.org/packages/".to_string(),
                "https://packages.simplifier.net/".to_string(),
            ],
            listing_cache: Arc::new(DashMap::new()),
        })
    }

    fn metadata_url(registry_url: &str, name: &str) -> String {
        format!("{registry_url}{name}")
    }

    fn default_tarball_url(registry_url: &str, name: &str, version: &str) -> String {
        format!("{registry_url}{name}/-/{name}-{version}.tgz")
    }

    async fn fetch_listing_from(
        &self,
        registry_url: &str,
        name: &str,
    ) -> Result<BTreeMap<String, VersionListing>> {
        let metadata_url = Self::metadata_url(registry_url, name);
        debug!("Fetching version listing from {}", metadata_url);

        let response = self.get_with_retries(&metadata_url).await?;
        let npm: NpmPackageResponse = response.json().await?;

        let mut listings = BTreeMap::new();
        if npm.versions.is_empty() {
            // Simple format: single top-level version
            if let Some(version) = npm.version {
                listings.insert(
                    version,
                    VersionListing {
                        shasum: npm.dist.as_ref().and_then(|d| d.shasum.clone()),
                        tarball: npm.dist.as_ref().and_then(|d| d.tarball.clone()),
                    },
                );
            }
        } else {
            for (version, info) in npm.versions {
                listings.insert(
                    version,
                    VersionListing {
                        shasum: info.dist.as_ref().and_then(|d| d.shasum.clone()),
                        tarball: info.dist.as_ref().and_then(|d| d.tarball.clone()),
                    },
                );
            }
        }

        if listings.is_empty() {
            return Err(RegistryError::InvalidMetadata {
                message: format!("No versions in metadata for {name}"),
            }
            .into());
        }

        Ok(listings)
    }

    async fn get_with_retries(&self, url: &str) -> Result<Response> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("GET {} (attempt {}/{})", url, attempt, self.retry_attempts);
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        last_error = Some(RegistryError::RegistryUnavailable {
                            url: format!("HTTP {status} for {url}"),
                        });
                    } else {
                        return Err(RegistryError::RegistryUnavailable {
                            url: format!("HTTP {status} for {url}"),
                        }
                        .into());
                    }
                }
                Err(e) => {
                    last_error = Some(RegistryError::RegistryUnavailable {
                        url: format!("Network error: {e}"),
                    });
                }
            }

            if attempt < self.retry_attempts {
                // Exponential backoff with jitter
                let base = 500u64 * (2_u64.pow(attempt - 1));
                let jitter: u64 = rand::random::<u8>() as u64 % 250;
                tokio::time::sleep(std::time::Duration::from_millis(base + jitter)).await;
            }
        }

        Err(last_error
            .unwrap_or(RegistryError::RegistryUnavailable {
                url: url.to_string(),
            })
            .into())
    }
}

#[async_trait::async_trait]
impl PackageRegistry for HttpRegistry {
    #[tracing::instrument(name = "registry.list_versions", skip(self))]
    async fn list_versions(&self, name: &str) -> Result<BTreeMap<String, VersionListing>> {
        if let Some(cached) = self.listing_cache.get(name) {
            return Ok(cached.value().clone());
        }

        let mut last_error = None;
        let primary = self.base_url.to_string();
        let registries = std::iter::once(primary.as_str())
            .chain(self.fallback_registries.iter().map(|s| s.as_str()));

        for registry_url in registries {
            match self.fetch_listing_from(registry_url, name).await {
                Ok(listings) => {
                    self.listing_cache.insert(name.to_string(), listings.clone());
                    return Ok(listings);
                }
                Err(e) => {
                    warn!("Registry {} failed for {}: {}", registry_url, name, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RegistryError::PackageNotFound {
                name: name.to_string(),
                version: "latest".to_string(),
            }
            .into()
        }))
    }

    #[tracing::instrument(name = "registry.fetch_tarball", skip(self), fields(pkg = %reference))]
    async fn fetch_tarball(&self, reference: &PackageReference) -> Result<Vec<u8>> {
        let version =
            reference
                .version
                .as_deref()
                .ok_or_else(|| RegistryError::PackageNotFound {
                    name: reference.name.clone(),
                    version: "(unresolved)".to_string(),
                })?;

        let listings = self.list_versions(&reference.name).await?;
        let tarball_url = listings
            .get(version)
            .and_then(|listing| listing.tarball.clone())
            .unwrap_or_else(|| {
                Self::default_tarball_url(self.base_url.as_ref(), &reference.name, version)
            });

        info!("Downloading {} from {}", reference, tarball_url);
        let response = self.get_with_retries(&tarball_url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
