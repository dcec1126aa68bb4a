//! Disk-backed package cache
//!
//! Durable, content-addressed store of unpacked packages, one
//! `{name}#{version}` folder per entry (a legacy `{name}-{version}` naming is
//! still readable). Entries are immutable once published: installs unpack
//! into a staging folder and publish with an atomic rename, so a
//! half-unpacked entry is never observable as installed and a concurrent
//! second installer simply finds the published folder and no-ops.

use crate::config::CacheConfig;
use crate::domain::{PackageReference, normalize_name};
use crate::error::{CacheError, PackageError, Result};
use crate::index::{CanonicalIndex, CanonicalIndexer};
use crate::manifest::PackageManifest;
use flate2::read::GzDecoder;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tokio::fs;
use tracing::{debug, info, warn};

/// Folder under each cache entry holding the unpacked content.
pub const CONTENT_DIR: &str = "package";

/// Sub-folder of the content dir receiving archive entries that live outside
/// the archive's own `package/` root.
pub const OTHER_DIR: &str = "other";

const STAGING_MARKER: &str = ".staging-";

/// Disk package cache rooted at an explicit directory.
///
/// # Example
///
/// ```rust,no_run
/// use fhir_restore::cache::DiskPackageCache;
/// use fhir_restore::config::CacheConfig;
/// use fhir_restore::domain::PackageReference;
/// use std::path::PathBuf;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = DiskPackageCache::new(&CacheConfig {
///     cache_root: PathBuf::from("/tmp/fhir-packages"),
/// })
/// .await?;
///
/// let reference = PackageReference::new("hl7.fhir.r4.core", "4.0.1");
/// if cache.is_installed(&reference).await {
///     let manifest = cache.read_manifest(&reference).await?;
///     println!("Manifest: {:?}", manifest.map(|m| m.name));
/// }
/// # Ok(())
/// # }
/// ```
pub struct DiskPackageCache {
    cache_root: PathBuf,
    indexer: CanonicalIndexer,
}

impl DiskPackageCache {
    /// Creates a cache over `config.cache_root`, creating the directory when
    /// absent. Staging folders abandoned by a crashed install are swept.
    pub async fn new(config: &CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.cache_root)
            .await
            .map_err(|e| CacheError::InitializationFailed {
                message: format!(
                    "Failed to create cache root {}: {e}",
                    config.cache_root.display()
                ),
            })?;
        let cache = Self {
            cache_root: config.cache_root.clone(),
            indexer: CanonicalIndexer::new(),
        };
        cache.sweep_staging_leftovers().await;
        Ok(cache)
    }

    /// Best-effort removal of `*.staging-*` leftovers. Concurrent installs
    /// against the same root use fresh uuid-suffixed folders, so anything
    /// found here belongs to a dead process.
    async fn sweep_staging_leftovers(&self) {
        let Ok(mut dir_entries) = fs::read_dir(&self.cache_root).await else {
            return;
        };
        while let Ok(Some(entry)) = dir_entries.next_entry().await {
            let folder = entry.file_name().to_string_lossy().into_owned();
            if folder.contains(STAGING_MARKER) {
                warn!("Removing abandoned staging folder: {}", folder);
                let _ = fs::remove_dir_all(entry.path()).await;
            }
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    fn entry_dir(&self, reference: &PackageReference) -> Option<PathBuf> {
        let version = reference.version.as_deref()?;
        Some(self.cache_root.join(format!("{}#{}", reference.name, version)))
    }

    fn legacy_entry_dir(&self, reference: &PackageReference) -> Option<PathBuf> {
        let version = reference.version.as_deref()?;
        Some(self.cache_root.join(format!("{}-{}", reference.name, version)))
    }

    /// The published entry folder for `reference`, preferring the `#`
    /// naming over the legacy `-` one. `None` when not installed.
    async fn installed_entry_dir(&self, reference: &PackageReference) -> Option<PathBuf> {
        for dir in [self.entry_dir(reference), self.legacy_entry_dir(reference)]
            .into_iter()
            .flatten()
        {
            if fs::try_exists(dir.join(CONTENT_DIR)).await.unwrap_or(false) {
                return Some(dir);
            }
        }
        None
    }

    /// Whether the content folder for `reference` exists.
    pub async fn is_installed(&self, reference: &PackageReference) -> bool {
        self.installed_entry_dir(reference).await.is_some()
    }

    /// Unpacks `bytes` into a fresh cache entry and builds its canonical
    /// index.
    ///
    /// Stages into a temporary sibling folder, then publishes with a rename.
    /// Losing a publish race against a concurrent installer of the same
    /// reference is not an error: the entry is immutable, so the winner's
    /// copy is equivalent.
    #[tracing::instrument(name = "cache.install", skip(self, bytes), fields(pkg = %reference))]
    pub async fn install(&self, reference: &PackageReference, bytes: Vec<u8>) -> Result<()> {
        let entry_dir = self
            .entry_dir(reference)
            .ok_or_else(|| PackageError::ValidationFailed {
                message: format!("Cannot install unresolved reference {reference}"),
            })?;

        // Same predicate as is_installed: the entry counts only once its
        // content folder is published.
        if self.is_installed(reference).await {
            debug!("Cache entry already present: {}", entry_dir.display());
            return Ok(());
        }

        let staging_dir = self.cache_root.join(format!(
            "{}{}{}",
            entry_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("entry"),
            STAGING_MARKER,
            uuid::Uuid::new_v4()
        ));

        fs::create_dir_all(&staging_dir).await?;

        let unpack_dir = staging_dir.clone();
        let unpack_result = tokio::task::spawn_blocking(move || unpack_tgz(&bytes, &unpack_dir))
            .await
            .map_err(|e| PackageError::ExtractionFailed {
                message: format!("Unpack task join error: {e}"),
            })?;

        if let Err(e) = unpack_result {
            let _ = fs::remove_dir_all(&staging_dir).await;
            return Err(e);
        }

        // An archive with no files would publish an entry that never
        // satisfies is_installed.
        if !fs::try_exists(staging_dir.join(CONTENT_DIR))
            .await
            .unwrap_or(false)
        {
            let _ = fs::remove_dir_all(&staging_dir).await;
            return Err(PackageError::ExtractionFailed {
                message: format!("Archive for {reference} contains no package content"),
            }
            .into());
        }

        // A bare entry folder without a content dir is a remnant of an
        // interrupted publish, not an install; clear it so the rename lands.
        if !self.is_installed(reference).await
            && fs::try_exists(&entry_dir).await.unwrap_or(false)
        {
            let _ = fs::remove_dir_all(&entry_dir).await;
        }

        match fs::rename(&staging_dir, &entry_dir).await {
            Ok(()) => {}
            Err(_) if self.is_installed(reference).await => {
                // Lost the publish race; the other installer's entry stands.
                debug!("Concurrent install already published {}", entry_dir.display());
                let _ = fs::remove_dir_all(&staging_dir).await;
                return Ok(());
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging_dir).await;
                return Err(e.into());
            }
        }

        self.indexer.build_or_reuse(&entry_dir, true).await?;

        info!("Installed {} at {}", reference, entry_dir.display());
        Ok(())
    }

    /// Reads the manifest of an installed package, or `None` when the
    /// package is not installed.
    pub async fn read_manifest(
        &self,
        reference: &PackageReference,
    ) -> Result<Option<PackageManifest>> {
        let Some(entry_dir) = self.installed_entry_dir(reference).await else {
            return Ok(None);
        };
        let manifest_path = entry_dir.join(CONTENT_DIR).join("package.json");
        let content = match fs::read_to_string(&manifest_path).await {
            Ok(content) => content,
            Err(_) => return Ok(None),
        };
        let manifest: PackageManifest =
            serde_json::from_str(&content).map_err(|e| PackageError::ValidationFailed {
                message: format!("Invalid manifest in {}: {e}", manifest_path.display()),
            })?;
        Ok(Some(manifest))
    }

    /// Canonical index for an installed package, built lazily on first
    /// access and rebuilt when the persisted schema version is stale.
    pub async fn get_canonical_index(&self, reference: &PackageReference) -> Result<CanonicalIndex> {
        let entry_dir = self
            .installed_entry_dir(reference)
            .await
            .ok_or_else(|| CacheError::NotInstalled {
                package: reference.to_string(),
            })?;
        self.indexer.build_or_reuse(&entry_dir, true).await
    }

    /// All installed references, parsed back from entry folder names. The
    /// first `#` splits name from version; the legacy naming splits at the
    /// first `-`. Unrecognizable folders are skipped with a warning.
    pub async fn get_package_references(&self) -> Result<Vec<PackageReference>> {
        let mut references = Vec::new();
        let mut dir_entries = fs::read_dir(&self.cache_root).await?;

        while let Some(entry) = dir_entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let folder = entry.file_name().to_string_lossy().into_owned();
            if folder.contains(STAGING_MARKER) {
                continue;
            }
            match parse_entry_name(&folder) {
                Some(reference) => references.push(reference),
                None => warn!("Skipping unrecognizable cache folder: {}", folder),
            }
        }

        references.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        Ok(references)
    }

    /// Locally cached versions for `name` (case-insensitive).
    pub async fn get_versions(&self, name: &str) -> Result<Vec<String>> {
        let normalized = normalize_name(name);
        let versions = self
            .get_package_references()
            .await?
            .into_iter()
            .filter(|reference| normalize_name(&reference.name) == normalized)
            .filter_map(|reference| reference.version)
            .collect();
        Ok(versions)
    }

    /// Reads a file relative to the package content root.
    ///
    /// A missing file is reported as a cache error pointing at restore,
    /// since the usual cause is a missing or incomplete install.
    pub async fn get_file_content(
        &self,
        reference: &PackageReference,
        file_name: &str,
    ) -> Result<String> {
        let Some(entry_dir) = self.installed_entry_dir(reference).await else {
            return Err(CacheError::NotInstalled {
                package: reference.to_string(),
            }
            .into());
        };
        let path = entry_dir.join(CONTENT_DIR).join(file_name);
        fs::read_to_string(&path).await.map_err(|_| {
            CacheError::FileNotFound {
                package: reference.to_string(),
                file: file_name.to_string(),
            }
            .into()
        })
    }
}

/// Parses `{name}#{version}` (or legacy `{name}-{version}`) back into a
/// reference.
fn parse_entry_name(folder: &str) -> Option<PackageReference> {
    let (name, version) = folder
        .split_once('#')
        .or_else(|| folder.split_once('-'))?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some(PackageReference::new(name, version))
}

/// Blocking tgz unpack with the cache's fixed internal layout: archive
/// entries under `package/` keep their place, everything else lands under
/// `package/other/`.
fn unpack_tgz(bytes: &[u8], output_dir: &Path) -> Result<()> {
    let tar = GzDecoder::new(bytes);
    let mut archive = Archive::new(tar);

    for entry in archive
        .entries()
        .map_err(|e| PackageError::ExtractionFailed {
            message: format!("Failed to read archive entries: {e}"),
        })?
    {
        let mut entry = entry.map_err(|e| PackageError::ExtractionFailed {
            message: format!("Invalid entry: {e}"),
        })?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| PackageError::ExtractionFailed {
                message: format!("Invalid entry path: {e}"),
            })?
            .into_owned();

        let out_path = layout_path(output_dir, &path)?;
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PackageError::ExtractionFailed {
                message: format!("Failed to create directories: {e}"),
            })?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| PackageError::ExtractionFailed {
                message: format!("Failed to unpack entry: {e}"),
            })?;
    }

    Ok(())
}

/// Maps an archive entry path onto the on-disk layout, rejecting traversal
/// components as the extractor must never write outside the staging dir.
fn layout_path(base: &Path, path: &Path) -> Result<PathBuf> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => continue,
            Component::ParentDir => {
                return Err(PackageError::ExtractionFailed {
                    message: "Archive contains path traversal".into(),
                }
                .into());
            }
            Component::Normal(part) => parts.push(part.to_owned()),
        }
    }

    if parts.is_empty() {
        return Err(PackageError::ExtractionFailed {
            message: "Archive contains empty entry path".into(),
        }
        .into());
    }

    let mut out_path = base.join(CONTENT_DIR);
    if parts[0] == *CONTENT_DIR {
        for part in &parts[1..] {
            out_path.push(part);
        }
    } else {
        out_path.push(OTHER_DIR);
        for part in &parts {
            out_path.push(part);
        }
    }
    Ok(out_path)
}
