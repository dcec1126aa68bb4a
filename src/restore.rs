//! Restore orchestration
//!
//! Drives a breadth-first walk over the dependency graph: resolve each
//! `(name, range)` edge against cached and registry-listed versions, fetch
//! and checksum-verify what is not installed, install and index it, then
//! enqueue the new package's own dependencies. A failure on one edge never
//! aborts the walk; it degrades that edge into a Missing entry and the rest
//! of the graph keeps resolving.

use crate::cache::DiskPackageCache;
use crate::closure::{ClosureSnapshot, DependencyClosure};
use crate::domain::{PackageDependency, PackageReference};
use crate::error::{PackageError, RegistryError, Result};
use crate::project::FolderProject;
use crate::registry::{PackageRegistry, VersionListing};
use crate::version;
use futures_util::{StreamExt, stream};
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Orchestrates package restores against one cache and one registry.
///
/// # Example
///
/// ```rust,no_run
/// use fhir_restore::cache::DiskPackageCache;
/// use fhir_restore::config::RestoreConfig;
/// use fhir_restore::project::FolderProject;
/// use fhir_restore::registry::HttpRegistry;
/// use fhir_restore::restore::RestoreOrchestrator;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RestoreConfig::load()?;
/// let cache = Arc::new(DiskPackageCache::new(&config.cache).await?);
/// let registry = Arc::new(HttpRegistry::new(&config.registry)?);
///
/// let orchestrator = RestoreOrchestrator::new(cache, registry);
/// let project = FolderProject::new(".");
/// let closure = orchestrator.restore_project(&project).await?;
///
/// if !closure.is_complete() {
///     closure.require_complete()?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct RestoreOrchestrator {
    cache: Arc<DiskPackageCache>,
    registry: Arc<dyn PackageRegistry>,
    parallel_workers: usize,
    cancel: CancellationToken,
}

impl RestoreOrchestrator {
    pub fn new(cache: Arc<DiskPackageCache>, registry: Arc<dyn PackageRegistry>) -> Self {
        Self {
            cache,
            registry,
            parallel_workers: 8,
            cancel: CancellationToken::new(),
        }
    }

    /// Bounds the number of concurrently processed edges.
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Installs a cancellation token checked between edges. Cancelling a
    /// restore leaves published cache entries valid; re-running resumes via
    /// the installed-entry short-circuit.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Restores a project folder: walks its manifest dependencies and
    /// persists the resulting closure to the lock file. The closure is
    /// persisted and returned even when incomplete.
    #[tracing::instrument(name = "restore.project", skip_all, fields(folder = %project.folder().display()))]
    pub async fn restore_project(&self, project: &FolderProject) -> Result<ClosureSnapshot> {
        let manifest = project
            .read_manifest()
            .await?
            .ok_or(PackageError::MissingManifest)?;

        let snapshot = self.restore(manifest.dependencies()).await?;
        project.write_closure(&snapshot).await?;
        Ok(snapshot)
    }

    /// Restores a set of root dependencies and returns the closure, which
    /// may be incomplete. Per-edge failures are recorded in the closure's
    /// missing set; this method only errors on environmental failures such
    /// as an unreadable cache root.
    #[tracing::instrument(name = "restore.run", skip_all, fields(roots = roots.len()))]
    pub async fn restore(&self, roots: Vec<PackageDependency>) -> Result<ClosureSnapshot> {
        let closure = DependencyClosure::new();
        let mut frontier = roots;
        let mut seen_edges: HashSet<PackageDependency> = HashSet::new();

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                info!("Restore cancelled; returning partial closure");
                break;
            }

            let wave: Vec<PackageDependency> = frontier
                .drain(..)
                .filter(|edge| seen_edges.insert(edge.clone()))
                .collect();

            let results: Vec<Vec<PackageDependency>> = stream::iter(wave)
                .map(|edge| self.process_edge(edge, &closure))
                .buffer_unordered(self.parallel_workers)
                .collect()
                .await;

            frontier = results.into_iter().flatten().collect();
        }

        let snapshot = closure.snapshot();
        info!(
            "Restore finished: {} resolved, {} missing",
            snapshot.references.len(),
            snapshot.missing.len()
        );
        Ok(snapshot)
    }

    /// Processes one dependency edge and returns the edges it exposes.
    /// All failure modes degrade to a Missing entry.
    async fn process_edge(
        &self,
        edge: PackageDependency,
        closure: &DependencyClosure,
    ) -> Vec<PackageDependency> {
        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        // A resolved name is never re-expanded; this also breaks cycles.
        if closure.find(&edge.name).is_some() {
            debug!("Edge {} already satisfied", edge);
            return Vec::new();
        }

        let (reference, listings) = self.resolve_edge(&edge).await;
        let Some(version) = reference.version.as_deref() else {
            warn!("No version satisfies {}", edge);
            closure.add_missing(edge);
            return Vec::new();
        };
        debug!("Resolved {} -> {}", edge, reference);

        if !self.cache.is_installed(&reference).await {
            if let Err(e) = self.fetch_and_install(&reference, version, listings).await {
                warn!("Failed to install {}: {}", reference, e);
                closure.add_missing(edge);
                return Vec::new();
            }
        }

        closure.add(reference.clone());

        match self.cache.read_manifest(&reference).await {
            Ok(Some(manifest)) => manifest.dependencies(),
            Ok(None) => {
                warn!("Installed package {} has no readable manifest", reference);
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to read manifest of {}: {}", reference, e);
                Vec::new()
            }
        }
    }

    /// Resolves an edge, preferring locally cached versions and consulting
    /// the registry listing only when the range cannot be satisfied locally.
    /// Returns the listing alongside so the caller can verify checksums
    /// without a second round trip.
    async fn resolve_edge(
        &self,
        edge: &PackageDependency,
    ) -> (PackageReference, Option<BTreeMap<String, VersionListing>>) {
        let cached_versions = match self.cache.get_versions(&edge.name).await {
            Ok(versions) => versions,
            Err(e) => {
                warn!("Failed to enumerate cached versions of {}: {}", edge.name, e);
                Vec::new()
            }
        };

        let local = version::resolve(&cached_versions, edge);
        if local.is_found() {
            return (local, None);
        }

        match self.registry.list_versions(&edge.name).await {
            Ok(listings) => {
                let mut candidates: Vec<String> = listings.keys().cloned().collect();
                candidates.extend(cached_versions);
                (version::resolve(&candidates, edge), Some(listings))
            }
            Err(e) => {
                warn!("Registry listing failed for {}: {}", edge.name, e);
                (PackageReference::not_found(&edge.name), None)
            }
        }
    }

    /// Fetches the tarball, verifies its SHA-1 digest against the
    /// registry-published one, and installs it. An absent published digest
    /// fails verification; nothing is ever installed unverified.
    async fn fetch_and_install(
        &self,
        reference: &PackageReference,
        version: &str,
        listings: Option<BTreeMap<String, VersionListing>>,
    ) -> Result<()> {
        let listings = match listings {
            Some(listings) => listings,
            None => self.registry.list_versions(&reference.name).await?,
        };

        let expected = listings
            .get(version)
            .and_then(|listing| listing.shasum.clone())
            .ok_or_else(|| RegistryError::ChecksumUnavailable {
                name: reference.name.clone(),
                version: version.to_string(),
            })?;

        let bytes = self.registry.fetch_tarball(reference).await?;

        let actual = sha1_hex(&bytes);
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(RegistryError::ChecksumMismatch {
                name: reference.name.clone(),
                version: version.to_string(),
                expected,
                actual,
            }
            .into());
        }

        self.cache.install(reference, bytes).await
    }
}

/// Lower-case hex SHA-1 digest.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
