//! Disk package cache tests

use crate::common::fixtures;
use crate::common::test_helpers::{create_test_cache, setup_test_env};
use fhir_restore::cache::CONTENT_DIR;
use fhir_restore::domain::PackageReference;
use serde_json::json;

fn sample_tgz(name: &str, version: &str) -> Vec<u8> {
    let manifest = fixtures::create_sample_manifest(name, version, &[]);
    let resource = fixtures::create_sample_structure_definition(
        "us-core-patient",
        "http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient",
    );
    fixtures::build_package_tgz(
        &manifest,
        &[("StructureDefinition-us-core-patient.json", resource)],
    )
}

#[tokio::test]
async fn test_install_publishes_hash_named_entry() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;

    let reference = PackageReference::new("test.pkg", "1.0.0");
    assert!(!cache.is_installed(&reference).await);

    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();

    assert!(cache.is_installed(&reference).await);
    let entry = temp_dir.path().join("cache").join("test.pkg#1.0.0");
    assert!(entry.join(CONTENT_DIR).join("package.json").exists());
}

#[tokio::test]
async fn test_install_is_idempotent() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;
    let reference = PackageReference::new("test.pkg", "1.0.0");

    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();
    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();

    assert_eq!(cache.get_versions("test.pkg").await.unwrap(), vec!["1.0.0"]);
}

#[tokio::test]
async fn test_read_manifest_of_installed_package() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;
    let reference = PackageReference::new("test.pkg", "1.0.0");

    assert!(cache.read_manifest(&reference).await.unwrap().is_none());

    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();

    let manifest = cache.read_manifest(&reference).await.unwrap().unwrap();
    assert_eq!(manifest.name, "test.pkg");
    assert_eq!(manifest.version, "1.0.0");
}

#[tokio::test]
async fn test_legacy_dash_named_entry_is_readable() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;

    // Entry laid down by an older tool version
    let legacy = temp_dir
        .path()
        .join("cache")
        .join("old.pkg-2.0.0")
        .join(CONTENT_DIR);
    std::fs::create_dir_all(&legacy).unwrap();
    std::fs::write(
        legacy.join("package.json"),
        fixtures::create_sample_manifest("old.pkg", "2.0.0", &[]).to_string(),
    )
    .unwrap();

    let reference = PackageReference::new("old.pkg", "2.0.0");
    assert!(cache.is_installed(&reference).await);
    let manifest = cache.read_manifest(&reference).await.unwrap().unwrap();
    assert_eq!(manifest.version, "2.0.0");
}

#[tokio::test]
async fn test_listing_skips_staging_folders() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;

    cache
        .install(
            &PackageReference::new("test.pkg", "1.0.0"),
            sample_tgz("test.pkg", "1.0.0"),
        )
        .await
        .unwrap();

    // Leftover from a crashed install must not surface as a package
    std::fs::create_dir_all(
        temp_dir
            .path()
            .join("cache")
            .join("test.pkg#2.0.0.staging-0000"),
    )
    .unwrap();

    let references = cache.get_package_references().await.unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn test_get_versions_is_case_insensitive() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;

    cache
        .install(
            &PackageReference::new("HL7.FHIR.R4.Core", "4.0.1"),
            sample_tgz("HL7.FHIR.R4.Core", "4.0.1"),
        )
        .await
        .unwrap();

    assert_eq!(
        cache.get_versions("hl7.fhir.r4.core").await.unwrap(),
        vec!["4.0.1"]
    );
}

#[tokio::test]
async fn test_get_file_content_reports_missing_files() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;
    let reference = PackageReference::new("test.pkg", "1.0.0");

    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();

    let content = cache
        .get_file_content(&reference, "package.json")
        .await
        .unwrap();
    assert!(content.contains("test.pkg"));

    let error = cache
        .get_file_content(&reference, "no-such-file.json")
        .await
        .unwrap_err();
    assert!(error.to_string().contains("no-such-file.json"));
}

#[tokio::test]
async fn test_empty_archive_is_rejected_and_retry_succeeds() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;
    let reference = PackageReference::new("test.pkg", "1.0.0");

    // Valid gzipped tar with zero entries
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let builder = tar::Builder::new(encoder);
    let empty = builder.into_inner().unwrap().finish().unwrap();

    let error = cache.install(&reference, empty).await.unwrap_err();
    assert!(error.to_string().contains("no package content"));
    assert!(!cache.is_installed(&reference).await);

    // The failed attempt must not block a later good archive
    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();
    assert!(cache.is_installed(&reference).await);
}

#[tokio::test]
async fn test_install_replaces_bare_entry_remnant() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;
    let reference = PackageReference::new("test.pkg", "1.0.0");

    // Entry folder without a content dir, as left by an interrupted publish
    std::fs::create_dir_all(temp_dir.path().join("cache").join("test.pkg#1.0.0")).unwrap();
    assert!(!cache.is_installed(&reference).await);

    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();
    assert!(cache.is_installed(&reference).await);
}

#[tokio::test]
async fn test_install_completes_over_crashed_staging_leftover() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;
    let reference = PackageReference::new("test.pkg", "1.0.0");

    // Half-unpacked leftover of the same reference from a dead process
    let leftover = temp_dir
        .path()
        .join("cache")
        .join("test.pkg#1.0.0.staging-dead");
    std::fs::create_dir_all(leftover.join("package")).unwrap();
    std::fs::write(leftover.join("package").join("partial.json"), "{").unwrap();

    assert!(!cache.is_installed(&reference).await);

    cache
        .install(&reference, sample_tgz("test.pkg", "1.0.0"))
        .await
        .unwrap();
    assert!(cache.is_installed(&reference).await);
    let manifest = cache.read_manifest(&reference).await.unwrap().unwrap();
    assert_eq!(manifest.version, "1.0.0");

    let references = cache.get_package_references().await.unwrap();
    assert_eq!(references.len(), 1);
}

#[tokio::test]
async fn test_new_cache_sweeps_abandoned_staging_folders() {
    let temp_dir = setup_test_env();
    let leftover = temp_dir
        .path()
        .join("cache")
        .join("test.pkg#1.0.0.staging-dead");
    std::fs::create_dir_all(&leftover).unwrap();

    let _cache = create_test_cache(temp_dir.path()).await;
    assert!(!leftover.exists());
}

#[tokio::test]
async fn test_entries_outside_package_root_land_in_other() {
    let temp_dir = setup_test_env();
    let cache = create_test_cache(temp_dir.path()).await;
    let reference = PackageReference::new("test.pkg", "1.0.0");

    // Hand-build an archive with a stray top-level file
    let manifest = fixtures::create_sample_manifest("test.pkg", "1.0.0", &[]);
    let bytes = fixtures::build_package_tgz(&manifest, &[]);
    cache.install(&reference, bytes).await.unwrap();

    // A second archive shape: resource outside package/
    let reference2 = PackageReference::new("stray.pkg", "1.0.0");
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let manifest_bytes =
        fixtures::create_sample_manifest("stray.pkg", "1.0.0", &[]).to_string();
    let readme = json!({"resourceType": "Basic", "id": "readme"}).to_string();
    for (path, data) in [
        ("package/package.json", manifest_bytes.as_str()),
        ("docs/Basic-readme.json", readme.as_str()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, data.as_bytes()).unwrap();
    }
    let stray_bytes = builder.into_inner().unwrap().finish().unwrap();
    cache.install(&reference2, stray_bytes).await.unwrap();

    let diverted = temp_dir
        .path()
        .join("cache")
        .join("stray.pkg#1.0.0")
        .join(CONTENT_DIR)
        .join("other")
        .join("docs")
        .join("Basic-readme.json");
    assert!(diverted.exists());
}
