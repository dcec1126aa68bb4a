//! Project folder access: manifest and lock file
//!
//! A project is a folder with a `package.json` manifest and, after a
//! restore, a `fhirpkg.lock.json` snapshot of the resolved closure.

use crate::closure::ClosureSnapshot;
use crate::domain::{PackageDependency, PackageReference};
use crate::manifest::PackageManifest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub const MANIFEST_FILE_NAME: &str = "package.json";
pub const LOCK_FILE_NAME: &str = "fhirpkg.lock.json";

/// Persisted snapshot of a dependency closure.
///
/// Staleness against the manifest is judged by file modification time: a
/// coarse heuristic that triggers a re-run of restore, never a correctness
/// guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    #[serde(default)]
    pub missing: BTreeMap<String, String>,
}

impl LockFile {
    pub fn from_snapshot(snapshot: &ClosureSnapshot) -> Self {
        let references = snapshot
            .references
            .iter()
            .filter_map(|reference| {
                reference
                    .version
                    .clone()
                    .map(|version| (reference.name.clone(), version))
            })
            .collect();
        let missing = snapshot
            .missing
            .iter()
            .map(|dependency| (dependency.name.clone(), dependency.range_str().to_string()))
            .collect();
        Self {
            updated_at: Utc::now(),
            references,
            missing,
        }
    }

    pub fn into_snapshot(self) -> ClosureSnapshot {
        let references = self
            .references
            .into_iter()
            .map(|(name, version)| PackageReference::new(name, version))
            .collect();
        let missing = self
            .missing
            .into_iter()
            .map(|(name, range)| {
                if range.eq_ignore_ascii_case("latest") {
                    PackageDependency::latest(name)
                } else {
                    PackageDependency::new(name, range)
                }
            })
            .collect();
        ClosureSnapshot {
            references,
            missing,
        }
    }
}

/// Manifest and lock-file IO for one project folder.
pub struct FolderProject {
    folder: PathBuf,
}

impl FolderProject {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn manifest_path(&self) -> PathBuf {
        self.folder.join(MANIFEST_FILE_NAME)
    }

    fn lock_path(&self) -> PathBuf {
        self.folder.join(LOCK_FILE_NAME)
    }

    pub async fn read_manifest(&self) -> crate::error::Result<Option<PackageManifest>> {
        let path = self.manifest_path();
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(_) => Ok(None),
        }
    }

    pub async fn write_manifest(&self, manifest: &PackageManifest) -> crate::error::Result<()> {
        let json = serde_json::to_vec_pretty(manifest)?;
        fs::write(self.manifest_path(), json).await?;
        Ok(())
    }

    /// Reads the persisted closure, or `None` when no lock file exists.
    pub async fn read_closure(&self) -> crate::error::Result<Option<ClosureSnapshot>> {
        let path = self.lock_path();
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let lock: LockFile = serde_json::from_str(&content)?;
                Ok(Some(lock.into_snapshot()))
            }
            Err(_) => Ok(None),
        }
    }

    /// Persists a closure snapshot to the lock file.
    pub async fn write_closure(&self, snapshot: &ClosureSnapshot) -> crate::error::Result<()> {
        let lock = LockFile::from_snapshot(snapshot);
        let json = serde_json::to_vec_pretty(&lock)?;
        fs::write(self.lock_path(), json).await?;
        debug!("Wrote lock file to {}", self.lock_path().display());
        Ok(())
    }

    /// Whether the lock file is older than the manifest (or absent while a
    /// manifest exists).
    pub async fn is_outdated(&self) -> crate::error::Result<bool> {
        let manifest_meta = match fs::metadata(self.manifest_path()).await {
            Ok(meta) => meta,
            Err(_) => return Ok(false),
        };
        let lock_meta = match fs::metadata(self.lock_path()).await {
            Ok(meta) => meta,
            Err(_) => return Ok(true),
        };

        match (manifest_meta.modified(), lock_meta.modified()) {
            (Ok(manifest_time), Ok(lock_time)) => Ok(lock_time < manifest_time),
            _ => Ok(false),
        }
    }
}
