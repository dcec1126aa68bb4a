//! Dependency closure accumulation
//!
//! The closure is the only shared mutable state during a restore walk, so
//! `add` and `add_missing` are the synchronization points: each is a single
//! check-then-write under one lock.

use crate::domain::{PackageDependency, PackageReference, PackageVersion, normalize_name};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Accumulated result of one restore: resolved references keyed by
/// normalized package name, plus dependencies that could not be satisfied.
///
/// Conflict resolution keeps the highest version per name (semantic-version
/// ordering). Missing entries are deduplicated on the exact `(name, range)`
/// pair, so two different unmet ranges for the same package are both kept,
/// and entries are never removed once added.
#[derive(Debug, Default)]
pub struct DependencyClosure {
    inner: RwLock<ClosureState>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ClosureState {
    references: HashMap<String, PackageReference>,
    missing: Vec<PackageDependency>,
}

/// An owned, immutable snapshot of a closure, for persistence and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureSnapshot {
    pub references: Vec<PackageReference>,
    pub missing: Vec<PackageDependency>,
}

impl ClosureSnapshot {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Errors with the missing dependency list when the closure is
    /// incomplete. The closure itself is still available to the caller; this
    /// is the escalation step, not part of the walk.
    pub fn require_complete(&self) -> crate::error::Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        let missing = self
            .missing
            .iter()
            .map(|dependency| dependency.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(crate::error::RestoreError::RestoreIncomplete { missing })
    }
}

impl DependencyClosure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resolved reference.
    ///
    /// Returns `true` when the stored state changed: the name was absent, or
    /// the new reference carries a strictly higher version than the stored
    /// one. An equal reference is a no-op; a lower version is discarded.
    pub fn add(&self, reference: PackageReference) -> bool {
        let key = normalize_name(&reference.name);
        let mut state = self.inner.write().unwrap();

        match state.references.get(&key) {
            None => {
                state.references.insert(key, reference);
                true
            }
            Some(existing) if *existing == reference => false,
            Some(existing) => {
                let existing_version = existing
                    .version
                    .as_deref()
                    .map(PackageVersion::parse);
                let new_version = reference.version.as_deref().map(PackageVersion::parse);
                if new_version > existing_version {
                    state.references.insert(key, reference);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records an unsatisfiable dependency, unless an equal `(name, range)`
    /// pair is already present.
    pub fn add_missing(&self, dependency: PackageDependency) {
        let mut state = self.inner.write().unwrap();
        if !state.missing.contains(&dependency) {
            state.missing.push(dependency);
        }
    }

    /// Case-insensitive lookup of a resolved reference.
    pub fn find(&self, name: &str) -> Option<PackageReference> {
        let state = self.inner.read().unwrap();
        state.references.get(&normalize_name(name)).cloned()
    }

    /// A closure is complete iff nothing is missing.
    pub fn is_complete(&self) -> bool {
        self.inner.read().unwrap().missing.is_empty()
    }

    pub fn reference_count(&self) -> usize {
        self.inner.read().unwrap().references.len()
    }

    /// Snapshot with references sorted by name for stable output.
    pub fn snapshot(&self) -> ClosureSnapshot {
        let state = self.inner.read().unwrap();
        let mut references: Vec<PackageReference> = state.references.values().cloned().collect();
        references.sort_by(|a, b| normalize_name(&a.name).cmp(&normalize_name(&b.name)));
        ClosureSnapshot {
            references,
            missing: state.missing.clone(),
        }
    }

    /// Rebuilds a closure from a persisted snapshot.
    pub fn from_snapshot(snapshot: ClosureSnapshot) -> Self {
        let closure = Self::new();
        for reference in snapshot.references {
            closure.add(reference);
        }
        for dependency in snapshot.missing {
            closure.add_missing(dependency);
        }
        closure
    }
}
