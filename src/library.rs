//! [`Library`]: resolves a package name to a [`Package`], searching local directories before
//! falling back to the release manifest. Caches what it resolves.
//!
//! Packages are kept behind `Rc<RefCell<_>>` rather than returned by value: a [`Slice`] is
//! compiled lazily and in place (§3 "Slices are constructed at Package initialization and
//! compiled lazily"), and the same resolved [`Package`] is shared by every slice that depends on
//! it within one bundle operation, so compiling it once must be visible to every caller that holds
//! a handle. This mirrors the single-threaded, no-concurrent-mutation model in §5.

use crate::{
    error::{BuildError, ResolutionError, Result},
    handler_registry::HandlerRegistry,
    package::Package,
    release::ReleaseManifest,
};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

pub type PackageHandle = Rc<RefCell<Package>>;

/// Name-resolution service over a configured set of roots, a release manifest, and test preloads.
pub struct Library {
    /// Local directories searched in order: `<appDir>/packages`, then `PACKAGE_DIRS` entries,
    /// then the source-checkout `packages` dir, if any (§4.5 step 3).
    local_roots: Vec<PathBuf>,
    release: Option<Arc<dyn ReleaseManifest>>,
    handlers: HandlerRegistry,
    /// Test overrides; consulted before the cache and never evicted by [`Self::flush`].
    preloaded: BTreeMap<String, PackageHandle>,
    cache: RefCell<BTreeMap<String, PackageHandle>>,
}

impl Library {
    pub fn new(local_roots: Vec<PathBuf>, handlers: HandlerRegistry) -> Self {
        Self {
            local_roots,
            release: None,
            handlers,
            preloaded: BTreeMap::new(),
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_release_manifest(mut self, release: Arc<dyn ReleaseManifest>) -> Self {
        self.release = Some(release);
        self
    }

    /// Registers a test override for `name`, consulted ahead of any real resolution.
    pub fn preload(&mut self, name: impl Into<String>, package: Package) {
        self.preloaded.insert(name.into(), Rc::new(RefCell::new(package)));
    }

    /// Resolves `name` to a [`Package`], in the order: preloads, cache, local roots (first match
    /// wins), release manifest.
    #[instrument(skip(self))]
    pub fn get(&self, name: &str) -> Result<PackageHandle> {
        if let Some(pkg) = self.preloaded.get(name) {
            return Ok(pkg.clone());
        }
        if let Some(pkg) = self.cache.borrow().get(name) {
            return Ok(pkg.clone());
        }

        for root in &self.local_roots {
            let candidate = root.join(name);
            if candidate.join("package.toml").is_file() {
                debug!(package = name, root = %root.display(), "resolved package from local root");
                let pkg = Package::from_directory(&candidate, &self.handlers, false)?;
                let handle = Rc::new(RefCell::new(pkg));
                self.cache.borrow_mut().insert(name.to_string(), handle.clone());
                return Ok(handle);
            }
        }

        if let Some(release) = &self.release {
            if let Some(path) = release.resolve(name) {
                debug!(package = name, path = %path.display(), "resolved package from release manifest");
                let pkg = Package::from_directory(&path, &self.handlers, true)?;
                let handle = Rc::new(RefCell::new(pkg));
                self.cache.borrow_mut().insert(name.to_string(), handle.clone());
                return Ok(handle);
            }
        }

        Err(BuildError::Resolution(ResolutionError::PackageNotFound(name.to_string())))
    }

    /// Invalidates the resolution cache. Preloads are untouched.
    pub fn flush(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Package names visible at each local root (earlier root wins on collision), augmented with
    /// names known to the release manifest.
    pub fn list(&self) -> Vec<String> {
        let mut seen = BTreeMap::new();
        for root in &self.local_roots {
            let Ok(entries) = std::fs::read_dir(root) else { continue };
            for entry in entries.flatten() {
                if entry.path().join("package.toml").is_file() {
                    if let Some(name) = entry.file_name().to_str() {
                        seen.entry(name.to_string()).or_insert(());
                    }
                }
            }
        }
        if let Some(release) = &self.release {
            for name in release.known_names() {
                seen.entry(name).or_insert(());
            }
        }
        seen.into_keys().collect()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }
}

/// Builds the local-root search order from an app directory and the configured extra dirs,
/// appending a source-checkout `packages` dir if one is given (§4.5 step 3c).
pub fn local_root_order(
    app_dir: &Path,
    extra_dirs: impl IntoIterator<Item = PathBuf>,
    checkout_packages_dir: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut roots = vec![app_dir.join("packages")];
    roots.extend(extra_dirs);
    if let Some(dir) = checkout_packages_dir {
        roots.push(dir);
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PackageManifest;

    fn make_pkg(name: &str) -> Package {
        let manifest = PackageManifest::parse(&format!(
            r#"
                [package]
                name = "{name}"
                [[slice]]
                role = "use"
                sources = {{ server = ["main.js"] }}
            "#
        ))
        .unwrap();
        Package::from_manifest(manifest, "/tmp", &HandlerRegistry::with_builtins(), false).unwrap()
    }

    #[test]
    fn preload_is_found_before_local_roots_and_release() {
        let mut lib = Library::new(vec![], HandlerRegistry::with_builtins());
        lib.preload("p", make_pkg("p"));
        let handle = lib.get("p").unwrap();
        assert_eq!(handle.borrow().name.as_deref(), Some("p"));
    }

    #[test]
    fn unknown_package_is_a_resolution_error() {
        let lib = Library::new(vec![], HandlerRegistry::with_builtins());
        let err = lib.get("nope").unwrap_err();
        assert!(matches!(err, BuildError::Resolution(ResolutionError::PackageNotFound(_))));
    }

    #[test]
    fn local_root_order_prepends_app_packages_dir() {
        let order = local_root_order(
            Path::new("/app"),
            vec![PathBuf::from("/extra")],
            Some(PathBuf::from("/checkout/packages")),
        );
        assert_eq!(
            order,
            vec![
                PathBuf::from("/app/packages"),
                PathBuf::from("/extra"),
                PathBuf::from("/checkout/packages"),
            ]
        );
    }

    #[test]
    fn resolves_from_local_root_directory_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("p")).unwrap();
        std::fs::write(
            dir.path().join("p/package.toml"),
            r#"
                [package]
                name = "p"
                [[slice]]
                role = "use"
                sources = { server = ["main.js"] }
            "#,
        )
        .unwrap();

        let lib = Library::new(vec![dir.path().to_path_buf()], HandlerRegistry::with_builtins());
        let first = lib.get("p").unwrap();
        let second = lib.get("p").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
