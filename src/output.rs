//! The bundle's serialized output: the `app.json` manifest schema (§3 "Manifest Entry") and the
//! value returned to the caller from a bundle operation (§6 "Exit behavior").

use crate::{resource::ResourceKind, slice::DependencyInfo};
use serde::{Deserialize, Serialize};

/// Where a manifest entry is served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Where {
    Client,
    Internal,
}

/// One entry in `app.json`'s `manifest` array.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative, forward-slash path within the output directory (invariant 3, §3).
    pub path: String,
    #[serde(rename = "where")]
    pub where_: Where,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub cacheable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub size: u64,
    pub hash: String,
}

/// `app.json`: the load order, the manifest, and (optionally) the release stamp.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppJson {
    pub load: Vec<String>,
    pub manifest: Vec<ManifestEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

/// The value every bundle operation returns. `errors` is `None` on success; on failure it carries
/// one human-readable message per failure and the output directory has already been removed (§6).
#[derive(Debug, Default)]
pub struct BundleOutput {
    pub errors: Option<Vec<String>>,
    pub dependency_info: DependencyInfo,
}

impl BundleOutput {
    pub fn is_success(&self) -> bool {
        self.errors.is_none()
    }

    pub fn failure(message: impl Into<String>, dependency_info: DependencyInfo) -> Self {
        Self { errors: Some(vec![message.into()]), dependency_info }
    }

    pub fn success(dependency_info: DependencyInfo) -> Self {
        Self { errors: None, dependency_info }
    }
}
