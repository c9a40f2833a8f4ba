//! [`Slice`]: the (package, slice name, arch) compilation unit.

use crate::{
    arch::Arch,
    error::{BuildError, Result},
    extension::{CompileSink, ExtensionRegistry},
    linker::{self, Fragment, PrelinkInput},
    resource::{Resource, ResourceKind},
    utils::{join_serve_path, read_with_hash},
};
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

/// One `uses` entry: a dependency on another package's (or self-package's) slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UseEdge {
    pub package: String,
    /// `None` means "this package's default slices for the arch", resolved by whoever expands
    /// the edge (see [`crate::package::Package::default_slice_names`]).
    pub slice: Option<String>,
    /// If `true`, this edge does not constrain load order and does not contribute symbols to the
    /// importing slice's import map.
    pub unordered: bool,
}

impl UseEdge {
    /// Parses a `"name"` or `"name.sliceName"` usage spec.
    pub fn parse(spec: &str, unordered: bool) -> Result<Self> {
        if spec.is_empty() {
            return Err(BuildError::Resolution(crate::error::ResolutionError::InvalidUseSpec(
                spec.to_string(),
            )));
        }
        match spec.split_once('.') {
            Some((package, slice)) if !package.is_empty() && !slice.is_empty() => {
                Ok(Self { package: package.to_string(), slice: Some(slice.to_string()), unordered })
            }
            Some(_) => Err(BuildError::Resolution(crate::error::ResolutionError::InvalidUseSpec(
                spec.to_string(),
            ))),
            None => Ok(Self { package: spec.to_string(), slice: None, unordered }),
        }
    }
}

/// Watched directory metadata returned to the external file watcher.
#[derive(Clone, Debug, Default)]
pub struct DirWatch {
    pub include: Vec<Regex>,
    pub exclude: Vec<Regex>,
}

/// Dependency-tracking metadata accumulated during compilation, returned to the caller so an
/// external watcher can trigger rebuilds.
#[derive(Clone, Debug, Default)]
pub struct DependencyInfo {
    pub files: BTreeMap<PathBuf, String>,
    pub directories: BTreeMap<PathBuf, DirWatch>,
}

#[derive(Clone, Debug)]
struct CompiledOutput {
    exports: BTreeSet<String>,
    boundary: String,
    prelink_files: Vec<Fragment>,
    /// Resources that do not need linking (everything but `js`), in handler-call order.
    non_js_resources: Vec<Resource>,
}

enum CompileState {
    Uninit,
    Compiled(CompiledOutput),
}

/// The (package, slice name, arch) compilation unit.
pub struct Slice {
    /// Owning package name; `None` for the application pseudo-package.
    pub package_name: Option<String>,
    pub slice_name: String,
    pub arch: Arch,
    pub uses: Vec<UseEdge>,
    /// Paths relative to `source_root`, in scan/declaration order.
    pub sources: Vec<PathBuf>,
    pub source_root: PathBuf,
    pub serve_root: String,
    pub force_export: BTreeSet<String>,
    dependency_info: DependencyInfo,
    state: CompileState,
}

impl Slice {
    pub fn new(
        package_name: Option<String>,
        slice_name: impl Into<String>,
        arch: Arch,
        source_root: impl Into<PathBuf>,
        serve_root: impl Into<String>,
    ) -> Self {
        Self {
            package_name,
            slice_name: slice_name.into(),
            arch,
            uses: Vec::new(),
            sources: Vec::new(),
            source_root: source_root.into(),
            serve_root: serve_root.into(),
            force_export: BTreeSet::new(),
            dependency_info: DependencyInfo::default(),
            state: CompileState::Uninit,
        }
    }

    /// A stable key identifying this slice within a bundle: `pkg.sliceName@arch`, or
    /// `<app>.sliceName@arch` for the application pseudo-package.
    pub fn key(&self) -> String {
        format!(
            "{}.{}@{}",
            self.package_name.as_deref().unwrap_or("<app>"),
            self.slice_name,
            self.arch
        )
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.state, CompileState::Compiled(_))
    }

    fn combined_serve_path(&self) -> String {
        match &self.package_name {
            None => String::new(),
            Some(name) => {
                if self.slice_name == "main" {
                    format!("/packages/{name}.js")
                } else {
                    format!("/packages/{name}.{}.js", self.slice_name)
                }
            }
        }
    }

    /// Runs the scanner output through the extension registry and prelink. Idempotent: calling
    /// this on an already-compiled slice is a no-op, matching the monotone compile latch.
    pub fn compile(&mut self, registry: &ExtensionRegistry) -> Result<()> {
        if self.is_compiled() {
            return Ok(());
        }

        let mut js_fragments = Vec::new();
        let mut non_js_resources = Vec::new();

        // html-first emission order (§8 testable property 5) is a property of every slice's
        // source order, not just of scanner-discovered app sources: a package's `[[slice]].sources`
        // list is declared verbatim in its manifest and never passes through `SourceScanner`, so
        // it must be reordered here too.
        let ordered_sources = crate::scanner::html_first(self.sources.clone());

        for rel_path in &ordered_sources {
            let abs_path = self.source_root.join(rel_path);
            let (bytes, hash) = read_with_hash(&abs_path)?;
            self.dependency_info.files.insert(abs_path.clone(), hash);

            let serve_path = join_serve_path(&self.serve_root, rel_path);
            let ext = rel_path.extension().and_then(|e| e.to_str()).unwrap_or_default();

            let mut emitted = Vec::new();
            match registry.get(ext) {
                Some(handler) => {
                    let mut sink = CompileSink::new(&mut emitted);
                    handler.compile(&mut sink, &bytes, &serve_path, self.arch)?;
                }
                // `js`/`css` are intrinsic source kinds, not handler-mediated: a package needs no
                // extension registration to have its own code linked or its own stylesheets served.
                None if ext == "js" => emitted.push(Resource::js(serve_path, bytes)),
                None if ext == "css" => emitted.push(Resource::css(serve_path, bytes)),
                None => emitted.push(Resource::static_file(serve_path, bytes)),
            }

            for resource in emitted {
                self.route_resource(resource, &mut js_fragments, &mut non_js_resources)?;
            }
        }

        let prelink_input = PrelinkInput {
            fragments: js_fragments,
            package_name: self.package_name.clone(),
            force_export: self.force_export.clone(),
            use_global_namespace: self.package_name.is_none(),
            combined_serve_path: self.combined_serve_path(),
            import_stub_serve_path: "/packages/global-imports.js".to_string(),
        };
        let prelinked = linker::prelink(prelink_input)?;

        self.state = CompileState::Compiled(CompiledOutput {
            exports: prelinked.exports,
            boundary: prelinked.boundary,
            prelink_files: prelinked.files,
            non_js_resources,
        });

        Ok(())
    }

    fn route_resource(
        &self,
        resource: Resource,
        js: &mut Vec<Fragment>,
        non_js: &mut Vec<Resource>,
    ) -> Result<()> {
        match resource.kind {
            ResourceKind::Js => {
                let serve_path = resource.serve_path.clone().ok_or_else(|| {
                    BuildError::resource("js resource emitted without a serve path")
                })?;
                js.push(Fragment::new(serve_path, String::from_utf8_lossy(&resource.data).into_owned()));
            }
            ResourceKind::Css if !self.arch.is_client() => {
                warn!(
                    slice = %self.key(),
                    "css resource emitted for a non-client slice; dropping (legacy quirk)"
                );
            }
            ResourceKind::Head | ResourceKind::Body if !self.arch.is_client() => {
                return Err(BuildError::resource(format!(
                    "{:?} resource emitted for non-client slice \"{}\"",
                    resource.kind,
                    self.key()
                )));
            }
            _ => non_js.push(resource),
        }
        Ok(())
    }

    /// Returns this slice's exports. Panics if called before [`Self::compile`] succeeds, since
    /// that is a programming error in the orchestrator, not a recoverable condition.
    pub fn exports(&self) -> &BTreeSet<String> {
        match &self.state {
            CompileState::Compiled(out) => &out.exports,
            CompileState::Uninit => panic!("exports() called on an uncompiled slice \"{}\"", self.key()),
        }
    }

    pub fn dependency_info(&self) -> &DependencyInfo {
        &self.dependency_info
    }

    pub fn dependency_info_mut(&mut self) -> &mut DependencyInfo {
        &mut self.dependency_info
    }

    /// Computes this slice's final, linked resource list given the import map derived from its
    /// ordered `uses` list (see [`crate::bundle::graph`] for how that map is built). Non-js
    /// resources come first, in handler-call order, followed by the linked js fragments in
    /// prelink-output order.
    pub fn link_resources(&self, imports: &BTreeMap<String, String>) -> Result<Vec<Resource>> {
        let out = match &self.state {
            CompileState::Compiled(out) => out,
            CompileState::Uninit => {
                return Err(BuildError::linker(format!(
                    "link_resources() called before compile() on \"{}\"",
                    self.key()
                )))
            }
        };

        let linked = linker::link(imports, self.package_name.is_none(), &out.prelink_files, &out.boundary)?;

        let mut resources = out.non_js_resources.clone();
        resources.extend(linked.into_iter().map(|f| Resource::js(f.serve_path, f.source.into_bytes())));
        Ok(resources)
    }

    pub fn add_source(&mut self, path: impl Into<PathBuf>) {
        self.sources.push(path.into());
    }

    pub fn add_use(&mut self, edge: UseEdge) {
        self.uses.push(edge);
    }
}

/// Reads `path` as UTF-8, mapping I/O errors with the path attached. Exposed for extension
/// handlers that need text rather than raw bytes.
pub fn read_source_text(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| BuildError::io(e, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::PassthroughJsHandler;
    use std::sync::Arc;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        PathBuf::from(name)
    }

    #[test]
    fn use_edge_parses_qualified_and_unqualified_specs() {
        let e = UseEdge::parse("foo", false).unwrap();
        assert_eq!(e.package, "foo");
        assert_eq!(e.slice, None);

        let e = UseEdge::parse("foo.tests", true).unwrap();
        assert_eq!(e.package, "foo");
        assert_eq!(e.slice, Some("tests".to_string()));
        assert!(e.unordered);
    }

    #[test]
    fn compile_is_idempotent_and_static_fallback_works() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "hello");

        let mut slice = Slice::new(Some("p".into()), "main", Arch::Server, dir.path(), "/packages/p");
        slice.add_source("a.txt");

        let registry = ExtensionRegistry::new();
        slice.compile(&registry).unwrap();
        let exports_before = slice.exports().clone();
        slice.compile(&registry).unwrap();
        assert_eq!(exports_before, *slice.exports());

        let resources = slice.link_resources(&BTreeMap::new()).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, ResourceKind::Static);
        assert_eq!(resources[0].serve_path.as_deref(), Some("/packages/p/a.txt"));
    }

    #[test]
    fn js_handler_feeds_prelink_and_collects_exports() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.js", "// @export Foo\nvar Foo = 1;");

        let mut slice = Slice::new(Some("p".into()), "main", Arch::Server, dir.path(), "/packages/p");
        slice.add_source("a.js");

        let mut registry = ExtensionRegistry::new();
        registry.register("js", "p", Arc::new(PassthroughJsHandler)).unwrap();
        slice.compile(&registry).unwrap();

        assert!(slice.exports().contains("Foo"));
        let resources = slice.link_resources(&BTreeMap::new()).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].serve_path.as_deref(), Some("/packages/p.js"));
    }

    #[test]
    fn manifest_declared_sources_are_reordered_html_first() {
        // A package's `[[slice]].sources` list is declared verbatim in its manifest and never
        // passes through `SourceScanner`; `compile` must still apply the html-first rule.
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.txt", "a.html", "m.txt", "b.html"] {
            write(dir.path(), name, "stub");
        }

        let mut slice = Slice::new(Some("p".into()), "main", Arch::Server, dir.path(), "/packages/p");
        // Declaration order matches spec §8 concrete scenario 6: [z, a, m, b].
        for name in ["z.txt", "a.html", "m.txt", "b.html"] {
            slice.add_source(name);
        }

        let registry = ExtensionRegistry::new();
        slice.compile(&registry).unwrap();

        let resources = slice.link_resources(&BTreeMap::new()).unwrap();
        let serve_paths: Vec<_> = resources.iter().map(|r| r.serve_path.clone().unwrap()).collect();
        assert_eq!(
            serve_paths,
            vec![
                "/packages/p/a.html",
                "/packages/p/b.html",
                "/packages/p/z.txt",
                "/packages/p/m.txt",
            ]
        );
    }
}
