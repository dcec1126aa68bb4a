//! # FHIR Package Restore
//!
//! A library for restoring FHIR Implementation Guide packages: dependency
//! resolution across version ranges, a checksum-verified disk package cache,
//! and a canonical resource index over installed packages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fhir_restore::{DiskPackageCache, HttpRegistry, RestoreConfig, RestoreOrchestrator};
//! use fhir_restore::project::FolderProject;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RestoreConfig::load()?;
//!     let cache = Arc::new(DiskPackageCache::new(&config.cache).await?);
//!     let registry = Arc::new(HttpRegistry::new(&config.registry)?);
//!
//!     let orchestrator = RestoreOrchestrator::new(cache.clone(), registry)
//!         .with_parallel_workers(config.restore.parallel_workers);
//!
//!     // Restore the project in the current folder and persist its lock file
//!     let project = FolderProject::new(".");
//!     let closure = orchestrator.restore_project(&project).await?;
//!     println!("Resolved {} packages", closure.references.len());
//!
//!     // Look up a canonical URL in one of the installed packages
//!     for reference in &closure.references {
//!         let index = cache.get_canonical_index(reference).await?;
//!         if let Some(entry) = index
//!             .find_canonical("http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient")
//!         {
//!             println!("Found in {}: {}", reference, entry.file_name);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod closure;
pub mod config;
pub mod domain;
pub mod error;
pub mod index;
pub mod manifest;
pub mod project;
pub mod registry;
pub mod restore;
pub mod version;

// Re-export main types
pub use cache::DiskPackageCache;
pub use closure::{ClosureSnapshot, DependencyClosure};
pub use config::{CacheConfig, RegistryConfig, RestoreConfig, RestoreOptions};
pub use domain::{PackageDependency, PackageReference, PackageVersion};
pub use error::{RestoreError, Result};
pub use index::{CanonicalIndex, CanonicalIndexer, ResourceMetadata};
pub use manifest::PackageManifest;
pub use project::{FolderProject, LockFile};
pub use registry::{HttpRegistry, PackageRegistry, VersionListing};
pub use restore::RestoreOrchestrator;
pub use version::VersionRange;
