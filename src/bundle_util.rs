//! Utilities for creating and testing throwaway package/app trees on disk, mirroring the
//! teacher's `project_util` (gated the same way, behind a feature that pulls in `tempfile`).
//!
//! Every tree lives under a [`tempfile::TempDir`] so it's removed when the returned handle drops;
//! tests never need their own cleanup.

use crate::{
    error::{BuildError, Result},
    handler_registry::HandlerRegistry,
    library::Library,
    package::Package,
};
use rand::Rng;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway application directory plus a sibling `packages/` root, both rooted in one
/// [`TempDir`] so they're cleaned up together.
pub struct TestWorkspace {
    _root: TempDir,
    pub app_dir: PathBuf,
    pub packages_dir: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().map_err(|e| BuildError::io(e, "<tempdir>"))?;
        let app_dir = root.path().join("app");
        let packages_dir = root.path().join("packages");
        std::fs::create_dir_all(&app_dir).map_err(|e| BuildError::io(e, &app_dir))?;
        std::fs::create_dir_all(&packages_dir).map_err(|e| BuildError::io(e, &packages_dir))?;
        Ok(Self { _root: root, app_dir, packages_dir })
    }

    /// Writes `contents` at `rel` under the app directory, creating parent directories as needed.
    pub fn write_app_file(&self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        write_file(&self.app_dir, rel, contents)
    }

    /// Creates `<packages_dir>/<name>/package.toml` with `manifest_toml`, returning the package's
    /// directory.
    pub fn write_package(&self, name: &str, manifest_toml: &str) -> Result<PathBuf> {
        let dir = self.packages_dir.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| BuildError::io(e, &dir))?;
        std::fs::write(dir.join("package.toml"), manifest_toml)
            .map_err(|e| BuildError::io(e, dir.join("package.toml")))?;
        Ok(dir)
    }

    /// Writes `contents` at `rel` under a package's own directory.
    pub fn write_package_file(
        &self,
        package_dir: &Path,
        rel: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf> {
        write_file(package_dir, rel, contents)
    }

    /// A [`Library`] whose only local root is this workspace's `packages/` directory.
    pub fn library(&self) -> Library {
        Library::new(vec![self.packages_dir.clone()], HandlerRegistry::with_builtins())
    }

    /// A unique, process-local output path under a fresh temp directory; used so tests bundling
    /// into `BundleOptions::output_path` never collide even when run concurrently.
    pub fn unique_output_path(&self) -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        self._root.path().join(format!("out-{suffix:x}"))
    }
}

fn write_file(base: &Path, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
    let path = base.join(rel);
    crate::utils::create_parent_dir_all(&path)?;
    std::fs::write(&path, contents).map_err(|e| BuildError::io(e, &path))?;
    Ok(path)
}

/// Loads `dir` as a package for tests that want a [`Package`] directly rather than going through
/// a [`Library`].
pub fn load_package(dir: impl AsRef<Path>) -> Result<Package> {
    Package::from_directory(dir, &HandlerRegistry::with_builtins(), false)
}

/// Recursively copies a fixture directory into a fresh temp directory, for tests that want to
/// mutate a tree without touching the original fixture.
pub fn clone_tree(from: impl AsRef<Path>) -> Result<TempDir> {
    let dir = tempfile::tempdir().map_err(|e| BuildError::io(e, "<tempdir>"))?;
    let mut options = fs_extra::dir::CopyOptions::new();
    options.content_only = true;
    fs_extra::dir::copy(from.as_ref(), dir.path(), &options)
        .map_err(|e| BuildError::config(format!("failed to clone fixture tree: {e}")))?;
    Ok(dir)
}
