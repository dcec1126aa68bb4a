//! Dependency closure tests

use fhir_restore::closure::DependencyClosure;
use fhir_restore::domain::{PackageDependency, PackageReference};
use fhir_restore::error::RestoreError;
use std::sync::Arc;

#[test]
fn test_require_complete_lists_every_missing_dependency() {
    let closure = DependencyClosure::new();
    closure.add_missing(PackageDependency::new("gone.one", "1.x"));
    closure.add_missing(PackageDependency::latest("gone.two"));

    let snapshot = closure.snapshot();
    let error = snapshot.require_complete().unwrap_err();
    match error {
        RestoreError::RestoreIncomplete { missing } => {
            assert!(missing.contains("gone.one"));
            assert!(missing.contains("gone.two"));
        }
        other => panic!("Unexpected error: {other}"),
    }
}

#[test]
fn test_require_complete_passes_on_complete_closure() {
    let closure = DependencyClosure::new();
    closure.add(PackageReference::new("a", "1.0.0"));
    assert!(closure.snapshot().require_complete().is_ok());
}

#[tokio::test]
async fn test_concurrent_adds_keep_highest_version() {
    let closure = Arc::new(DependencyClosure::new());

    let mut handles = Vec::new();
    for minor in 0..16u32 {
        let closure = closure.clone();
        handles.push(tokio::spawn(async move {
            closure.add(PackageReference::new("pkg", format!("1.{minor}.0")));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(closure.reference_count(), 1);
    assert_eq!(
        closure.find("pkg").unwrap().version.as_deref(),
        Some("1.15.0")
    );
}

#[test]
fn test_snapshot_references_are_name_sorted() {
    let closure = DependencyClosure::new();
    closure.add(PackageReference::new("zeta.pkg", "1.0.0"));
    closure.add(PackageReference::new("Alpha.Pkg", "1.0.0"));
    closure.add(PackageReference::new("mid.pkg", "1.0.0"));

    let snapshot = closure.snapshot();
    let names: Vec<&str> = snapshot
        .references
        .iter()
        .map(|reference| reference.name.as_str())
        .collect();
    assert_eq!(names, vec!["Alpha.Pkg", "mid.pkg", "zeta.pkg"]);
}
