//! The release manifest: the last resolution step in [`crate::library::Library::get`], mapping a
//! package name/version to a warehouse path. Actually downloading or unpacking a warehouse
//! package is package-source acquisition, out of scope for this crate (see spec §1); this trait
//! exists so the [`crate::library::Library`] can be tested without a real warehouse.

use std::{collections::BTreeMap, path::PathBuf};

/// Resolves a package name to the on-disk location of its warehouse-pinned version.
pub trait ReleaseManifest: Send + Sync {
    fn resolve(&self, name: &str) -> Option<PathBuf>;

    /// Package names known to this release, for [`crate::library::Library::list`]. Default
    /// implementation reports none, which is correct for a manifest that can only answer direct
    /// lookups.
    fn known_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// An in-memory release manifest, for tests and doc examples.
#[derive(Default)]
pub struct InMemoryReleaseManifest {
    packages: BTreeMap<String, PathBuf>,
}

impl InMemoryReleaseManifest {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.packages.insert(name.into(), path.into());
        self
    }
}

impl ReleaseManifest for InMemoryReleaseManifest {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.packages.get(name).cloned()
    }

    fn known_names(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }
}
