//! [`Package`]: a named collection of slices plus metadata, extension handlers and a third-party
//! module manifest. Constructed either from a package directory's manifest or synthesized for the
//! application itself.

use crate::{
    arch::{Arch, Role},
    error::{BuildError, Result},
    extension::ExtensionRegistry,
    handler_registry::HandlerRegistry,
    manifest::PackageManifest,
    scanner::SourceScanner,
    slice::{DirWatch, Slice, UseEdge},
};
use regex::Regex;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

/// The name of the framework-root package; every other package's slices get an implicit,
/// order-breakable dependency on it (see [`Package::from_manifest`]).
pub const ROOT_PACKAGE: &str = "meteor";

static NEXT_PACKAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique package identity, stable for the lifetime of one bundle operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(u64);

impl PackageId {
    fn next() -> Self {
        Self(NEXT_PACKAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Descriptor keys a package's metadata may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKey {
    Summary,
    Internal,
}

/// A named collection of slices, loaded from a package directory, or the unnamed pseudo-package
/// synthesized for an application.
pub struct Package {
    pub id: PackageId,
    pub name: Option<String>,
    pub source_root: PathBuf,
    pub serve_root: String,
    pub metadata: BTreeMap<MetadataKey, String>,
    pub extensions: ExtensionRegistry,
    /// `None` when the package declares no `[dependencies]` section at all (distinct from an
    /// empty map); kept to mirror the "must be called at most once" npm-capability semantics.
    pub third_party_deps: Option<BTreeMap<String, String>>,
    pub slices: BTreeMap<(String, Arch), Slice>,
    pub default_slices: BTreeMap<Arch, Vec<String>>,
    pub test_slices: BTreeMap<Arch, Vec<String>>,
    /// Set by the constructor, never mutated afterwards by the [`crate::library::Library`] (see
    /// design notes: `inWarehouse` layering break).
    pub in_warehouse: bool,
}

impl Package {
    /// Loads a package from a directory containing a `package.toml` manifest.
    pub fn from_directory(
        dir: impl AsRef<Path>,
        handlers: &HandlerRegistry,
        in_warehouse: bool,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join("package.toml");
        let contents = std::fs::read_to_string(&manifest_path)
            .map_err(|e| BuildError::io(e, &manifest_path))?;
        let manifest = PackageManifest::parse(&contents)?;
        Self::from_manifest(manifest, dir, handlers, in_warehouse)
    }

    pub fn from_manifest(
        manifest: PackageManifest,
        source_root: impl Into<PathBuf>,
        handlers: &HandlerRegistry,
        in_warehouse: bool,
    ) -> Result<Self> {
        let source_root = source_root.into();
        let name = manifest.package.name.clone();
        let serve_root = format!("/packages/{name}");

        let mut metadata = BTreeMap::new();
        if let Some(summary) = &manifest.package.summary {
            metadata.insert(MetadataKey::Summary, summary.clone());
        }
        metadata.insert(MetadataKey::Internal, manifest.package.internal.to_string());

        let mut extensions = ExtensionRegistry::new();
        for (ext, handler_id) in &manifest.extensions {
            let handler = handlers.get(handler_id).ok_or_else(|| {
                BuildError::config(format!(
                    "package \"{name}\" registers unknown handler \"{handler_id}\" for \".{ext}\""
                ))
            })?;
            extensions.register(ext.clone(), name.clone(), handler)?;
        }

        let third_party_deps = if manifest.dependencies.is_empty() && manifest.slices.is_empty() {
            None
        } else {
            Some(manifest.dependencies.clone())
        };

        let mut pkg = Self {
            id: PackageId::next(),
            name: Some(name.clone()),
            source_root,
            serve_root,
            metadata,
            extensions,
            third_party_deps,
            slices: BTreeMap::new(),
            default_slices: BTreeMap::from([
                (Arch::Client, vec!["main".to_string()]),
                (Arch::Server, vec!["main".to_string()]),
            ]),
            test_slices: BTreeMap::from([
                (Arch::Client, vec!["tests".to_string()]),
                (Arch::Server, vec!["tests".to_string()]),
            ]),
            in_warehouse,
        };

        for decl in &manifest.slices {
            let slice_name = match decl.role {
                Role::Use => "main",
                Role::Test => "tests",
            };
            for arch in Arch::ALL {
                let mut slice =
                    Slice::new(Some(name.clone()), slice_name, arch, &pkg.source_root, &pkg.serve_root);

                for src in decl.sources.for_arch(arch) {
                    slice.add_source(PathBuf::from(src));
                }
                for sym in decl.force_export.for_arch(arch) {
                    slice.force_export.insert(sym.clone());
                }
                for use_decl in &decl.uses {
                    if use_decl.applies_to(arch) {
                        slice.add_use(UseEdge::parse(&use_decl.spec, use_decl.unordered)?);
                    }
                }

                // Every slice except `meteor` itself (in role `use`) gets an implicit,
                // order-breakable-only-by-the-author dependency on the framework root, unless
                // the author already declared one.
                if !(name == ROOT_PACKAGE && decl.role == Role::Use)
                    && !slice.uses.iter().any(|e| e.package == ROOT_PACKAGE)
                {
                    slice.add_use(UseEdge { package: ROOT_PACKAGE.to_string(), slice: None, unordered: false });
                }

                pkg.slices.insert((slice_name.to_string(), arch), slice);
            }
        }

        Ok(pkg)
    }

    /// Synthesizes the unnamed application pseudo-package. `used_packages` is the set of package
    /// names the project's package-list file names (acquisition of those packages is out of
    /// scope for this crate); `extra_extensions` is the merged registry of every used package's
    /// extensions, needed up front to scan sources with the right filter.
    pub fn from_application_directory(
        app_dir: impl Into<PathBuf>,
        used_packages: Vec<String>,
        recognized_extensions: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let app_dir = app_dir.into();
        let recognized_extensions: Vec<String> = recognized_extensions.into_iter().collect();

        const FRAMEWORK_PACKAGES: &[&str] = &["meteor", "webapp"];

        let mut pkg = Self {
            id: PackageId::next(),
            name: None,
            source_root: app_dir.clone(),
            serve_root: "/".to_string(),
            metadata: BTreeMap::new(),
            extensions: ExtensionRegistry::new(),
            third_party_deps: None,
            slices: BTreeMap::new(),
            default_slices: BTreeMap::from([
                (Arch::Client, vec!["app".to_string()]),
                (Arch::Server, vec!["app".to_string()]),
            ]),
            test_slices: BTreeMap::new(),
            in_warehouse: false,
        };

        for arch in Arch::ALL {
            let other_arch = match arch {
                Arch::Client => Arch::Server,
                Arch::Server => Arch::Client,
            };

            let scanner = SourceScanner::new(&app_dir, recognized_extensions.clone())
                .ignore(Regex::new(r"^packages/").unwrap())
                .ignore(Regex::new(&format!(r"(^|/){}(/|$)", other_arch)).unwrap())
                .ignore(Regex::new(r"(^|/)tests(/|$)").unwrap());
            let sources = scanner.scan()?;

            let mut slice = Slice::new(None, "app", arch, &app_dir, "/");
            for src in sources {
                slice.add_source(src);
            }
            for name in FRAMEWORK_PACKAGES.iter().chain(used_packages.iter().map(String::as_str)) {
                slice.add_use(UseEdge { package: name.to_string(), slice: None, unordered: false });
            }

            record_app_watch_metadata(&mut slice, &app_dir, &recognized_extensions);

            pkg.slices.insert(("app".to_string(), arch), slice);
        }

        Ok(pkg)
    }

    pub fn slice(&self, name: &str, arch: Arch) -> Option<&Slice> {
        self.slices.get(&(name.to_string(), arch))
    }

    pub fn slice_mut(&mut self, name: &str, arch: Arch) -> Option<&mut Slice> {
        self.slices.get_mut(&(name.to_string(), arch))
    }

    /// The slice names selected when this package is referenced by name alone, for the given
    /// role and arch.
    pub fn default_slice_names(&self, role: Role, arch: Arch) -> &[String] {
        let map = match role {
            Role::Use => &self.default_slices,
            Role::Test => &self.test_slices,
        };
        map.get(&arch).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn record_app_watch_metadata(slice: &mut Slice, app_dir: &Path, extensions: &[String]) {
    let info = slice.dependency_info_mut();

    for meta_file in [".meteor/packages", ".meteor/release"] {
        let path = app_dir.join(meta_file);
        if let Ok((_, hash)) = crate::utils::read_with_hash(&path) {
            info.files.insert(path, hash);
        }
    }

    let ext_pattern = if extensions.is_empty() {
        "$^".to_string() // matches nothing
    } else {
        format!(r"\.({})$", extensions.join("|"))
    };
    info.directories.insert(
        app_dir.to_path_buf(),
        DirWatch {
            include: vec![Regex::new(&ext_pattern).unwrap()],
            exclude: vec![Regex::new(r"(^|/)\.meteor/local(/|$)").unwrap()],
        },
    );

    info.directories.insert(
        app_dir.join("packages"),
        DirWatch {
            include: vec![Regex::new(r"(^|/)package\.toml$").unwrap()],
            exclude: vec![],
        },
    );
}
