//! Bundle-wide options, modeled as a consuming builder the way the teacher's
//! `ProjectPathsConfig`/`ProjectBuilder` pair is: a plain data struct plus a `#[must_use]` builder
//! that fills in defaults and validates eagerly (see design notes, §7 "Validation is eager where
//! cheap").

use crate::error::{BuildError, Result};
use std::{env, path::PathBuf};

/// How a package's third-party modules should land under the bundle's `npm/<pkg>/` directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeModulesMode {
    /// Don't materialize third-party modules at all.
    Skip,
    /// Copy the package's own `node_modules` directory into the bundle.
    Copy,
    /// Symlink the package's own `node_modules` directory into the bundle.
    Symlink,
}

/// Bundle-wide options. Construct via [`BundleOptionsBuilder`].
#[derive(Clone, Debug)]
pub struct BundleOptions {
    pub output_path: PathBuf,
    pub node_modules_mode: NodeModulesMode,
    /// `None` serializes as an absent `release` field in `app.json`; the original's `"none"`
    /// string sentinel is normalized to `None` at the builder boundary (see [`Self::release_tag`]).
    pub release_stamp: Option<String>,
    pub minify: bool,
    pub test_packages: Vec<String>,
    /// Additional package roots, beyond the app's own `packages/` directory, searched in order by
    /// [`crate::library::Library`]. Seeded from `PACKAGE_DIRS` by [`BundleOptionsBuilder::new`].
    pub package_dirs: Vec<PathBuf>,
}

impl BundleOptions {
    /// The release stamp as it should be written to `app.json`, with the `"none"` string sentinel
    /// (from the original's historical calling convention) already normalized away.
    pub fn release_tag(&self) -> Option<&str> {
        self.release_stamp.as_deref()
    }
}

/// Builds a [`BundleOptions`], the way the teacher's `ProjectPathsConfig::builder()` does.
#[derive(Clone, Debug)]
pub struct BundleOptionsBuilder {
    output_path: Option<PathBuf>,
    node_modules_mode: NodeModulesMode,
    release_stamp: Option<String>,
    minify: bool,
    test_packages: Vec<String>,
    package_dirs: Vec<PathBuf>,
}

impl Default for BundleOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleOptionsBuilder {
    /// A builder seeded with `PACKAGE_DIRS` (colon-separated) already applied, as the local-roots
    /// resolution order in §4.5 requires.
    pub fn new() -> Self {
        let package_dirs = env::var("PACKAGE_DIRS")
            .ok()
            .map(|raw| env::split_paths(&raw).collect())
            .unwrap_or_default();
        Self {
            output_path: None,
            node_modules_mode: NodeModulesMode::Copy,
            release_stamp: None,
            minify: false,
            test_packages: Vec::new(),
            package_dirs,
        }
    }

    #[must_use]
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn node_modules_mode(mut self, mode: NodeModulesMode) -> Self {
        self.node_modules_mode = mode;
        self
    }

    /// Accepts the original's `"none"` string sentinel and normalizes it to `None`.
    #[must_use]
    pub fn release_stamp(mut self, stamp: impl Into<String>) -> Self {
        let stamp = stamp.into();
        self.release_stamp = if stamp == "none" { None } else { Some(stamp) };
        self
    }

    #[must_use]
    pub fn minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    #[must_use]
    pub fn test_packages(mut self, packages: impl IntoIterator<Item = String>) -> Self {
        self.test_packages = packages.into_iter().collect();
        self
    }

    #[must_use]
    pub fn add_package_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.package_dirs.push(dir.into());
        self
    }

    pub fn build(self) -> Result<BundleOptions> {
        let output_path = self
            .output_path
            .ok_or_else(|| BuildError::config("`output_path` is required"))?;
        Ok(BundleOptions {
            output_path,
            node_modules_mode: self.node_modules_mode,
            release_stamp: self.release_stamp,
            minify: self.minify,
            test_packages: self.test_packages,
            package_dirs: self.package_dirs,
        })
    }
}
