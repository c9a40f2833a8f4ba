//! The declarative `package.toml` schema that stands in for the original dynamic
//! package-declaration scope (see design notes: "Dynamic capability objects → explicit
//! interfaces"). `describe`/`onUse`/`onTest`/`registerExtension`/`depends` become sections of this
//! file instead of calls against a sandboxed scripting capability.

use crate::{
    arch::{Arch, Role},
    error::{BuildError, Result},
};
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct PackageManifest {
    pub package: PackageMeta,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
    #[serde(default, rename = "slice")]
    pub slices: Vec<SliceDecl>,
}

#[derive(Debug, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Debug, Deserialize)]
pub struct SliceDecl {
    pub role: Role,
    #[serde(default)]
    pub uses: Vec<UseDecl>,
    #[serde(default)]
    pub sources: PerArch<String>,
    #[serde(default)]
    pub force_export: PerArch<String>,
}

#[derive(Debug, Deserialize)]
pub struct UseDecl {
    pub spec: String,
    #[serde(default)]
    pub unordered: bool,
    /// Which archs this edge applies to; defaults to both.
    #[serde(default, rename = "where")]
    pub archs: Option<Vec<Arch>>,
}

impl UseDecl {
    pub fn applies_to(&self, arch: Arch) -> bool {
        self.archs.as_ref().map(|archs| archs.contains(&arch)).unwrap_or(true)
    }
}

/// A per-arch list, as written in the manifest (`{ client = [...], server = [...] }`).
#[derive(Debug, Default, Deserialize)]
pub struct PerArch<T> {
    #[serde(default)]
    pub client: Vec<T>,
    #[serde(default)]
    pub server: Vec<T>,
}

impl<T> PerArch<T> {
    pub fn for_arch(&self, arch: Arch) -> &[T] {
        match arch {
            Arch::Client => &self.client,
            Arch::Server => &self.server,
        }
    }
}

impl PackageManifest {
    pub fn parse(toml_str: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(toml_str)
            .map_err(|e| BuildError::config(format!("invalid package manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for (dep, version) in &self.dependencies {
            Version::parse(version).map_err(|_| {
                BuildError::config(format!(
                    "dependency \"{dep}\" has a fuzzy or invalid version specifier \"{version}\"; \
                     third-party dependency versions must be exact"
                ))
            })?;
        }

        let mut seen_roles = std::collections::HashSet::new();
        for slice in &self.slices {
            if !seen_roles.insert(slice.role) {
                return Err(BuildError::config(format!(
                    "role \"{}\" is declared more than once",
                    slice.role
                )));
            }
        }

        Ok(())
    }
}
