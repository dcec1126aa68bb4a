//! Test helper functions and utilities

use crate::common::MockRegistry;
use fhir_restore::cache::DiskPackageCache;
use fhir_restore::config::{CacheConfig, RestoreConfig};
use fhir_restore::restore::RestoreOrchestrator;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Setup a temporary directory with a cache sub-folder.
pub fn setup_test_env() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    std::fs::create_dir_all(temp_dir.path().join("cache")).unwrap();
    temp_dir
}

/// Create a test configuration rooted at `temp_dir`.
pub fn create_test_config(temp_dir: &Path) -> RestoreConfig {
    RestoreConfig::test_config(&temp_dir.join("cache"))
}

/// Cache over `{temp_dir}/cache`.
pub async fn create_test_cache(temp_dir: &Path) -> Arc<DiskPackageCache> {
    let cache = DiskPackageCache::new(&CacheConfig {
        cache_root: temp_dir.join("cache"),
    })
    .await
    .expect("Failed to create cache");
    Arc::new(cache)
}

/// Orchestrator wired to a fresh cache and the given mock registry.
pub async fn create_test_orchestrator(
    temp_dir: &Path,
    registry: Arc<MockRegistry>,
) -> (RestoreOrchestrator, Arc<DiskPackageCache>) {
    let cache = create_test_cache(temp_dir).await;
    let orchestrator =
        RestoreOrchestrator::new(cache.clone(), registry).with_parallel_workers(2);
    (orchestrator, cache)
}

/// Initialize tracing output for a test run; safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
