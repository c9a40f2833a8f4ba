//! [`Bundle`]: the orchestrator. Selects roots, expands `uses` edges into a slice dependency
//! graph, topologically orders it, compiles and links every slice, and writes the result to disk
//! as a content-addressed, atomically-published bundle (§4.6).

use crate::{
    arch::{Arch, Role},
    config::{BundleOptions, NodeModulesMode},
    error::{BuildError, Result},
    extension::ExtensionRegistry,
    library::{Library, PackageHandle},
    minify::{CssMinifier, JsMinifier, PassthroughMinifier},
    output::{AppJson, BundleOutput, ManifestEntry, Where},
    package::PackageId,
    resource::{Resource, ResourceKind},
    slice::DependencyInfo,
    utils::{create_parent_dir_all, sha1_hex, write_json_file},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
    sync::Arc,
};

/// One root package reference: a name the [`Library`] must resolve, or a package handle the
/// caller already holds (used by tests and by callers preloading an application pseudo-package).
#[derive(Clone)]
pub enum PackageRef {
    Name(String),
    Direct(PackageHandle),
}

impl From<&str> for PackageRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<PackageHandle> for PackageRef {
    fn from(handle: PackageHandle) -> Self {
        Self::Direct(handle)
    }
}

/// The set of root packages to bundle, per role and arch (§4.6 "roots is a mapping from role to
/// arch to a list of package names or Package objects").
#[derive(Default)]
pub struct Roots {
    by_role: BTreeMap<Role, BTreeMap<Arch, Vec<PackageRef>>>,
}

impl Roots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, role: Role, arch: Arch, pkg: impl Into<PackageRef>) -> &mut Self {
        self.by_role.entry(role).or_default().entry(arch).or_default().push(pkg.into());
        self
    }
}

/// A node in the slice dependency graph: one compiled-or-to-be-compiled slice.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct NodeKey {
    package: PackageId,
    slice: String,
    arch: Arch,
}

struct Graph {
    order: Vec<NodeKey>,
    nodes: BTreeMap<NodeKey, PackageHandle>,
    /// Ordered edges only (`uses` entries not marked `unordered`), used for the topological sort.
    ordered_adj: BTreeMap<NodeKey, Vec<NodeKey>>,
}

fn node_label(nodes: &BTreeMap<NodeKey, PackageHandle>, key: &NodeKey) -> String {
    let name = nodes.get(key).and_then(|h| h.borrow().name.clone()).unwrap_or_else(|| "<app>".to_string());
    format!("{name}.{}@{}", key.slice, key.arch)
}

/// Resolves a [`PackageRef`] to a handle.
fn resolve_ref(library: &Library, pkg_ref: &PackageRef) -> Result<PackageHandle> {
    match pkg_ref {
        PackageRef::Name(name) => library.get(name),
        PackageRef::Direct(handle) => Ok(handle.clone()),
    }
}

/// Expands `handle`'s `(slice_name, arch)` slice into the graph, recursively expanding every
/// `uses` entry (always in role `use`, same arch, per §4.6) that hasn't been visited yet.
fn expand(
    library: &Library,
    handle: PackageHandle,
    slice_name: &str,
    arch: Arch,
    nodes: &mut BTreeMap<NodeKey, PackageHandle>,
    order: &mut Vec<NodeKey>,
    ordered_adj: &mut BTreeMap<NodeKey, Vec<NodeKey>>,
    expanded: &mut BTreeSet<NodeKey>,
) -> Result<NodeKey> {
    let package_id = handle.borrow().id;
    let key = NodeKey { package: package_id, slice: slice_name.to_string(), arch };

    if nodes.insert(key.clone(), handle.clone()).is_none() {
        order.push(key.clone());
    }
    if !expanded.insert(key.clone()) {
        return Ok(key);
    }

    let uses = {
        let pkg = handle.borrow();
        let slice = pkg.slice(slice_name, arch).ok_or_else(|| {
            BuildError::Resolution(crate::error::ResolutionError::SliceNotFound {
                package: pkg.name.clone().unwrap_or_else(|| "<app>".to_string()),
                slice: slice_name.to_string(),
                arch: arch.to_string(),
            })
        })?;
        slice.uses.clone()
    };

    for edge in &uses {
        let dep_handle = library.get(&edge.package)?;
        let dep_slice_names: Vec<String> = match &edge.slice {
            Some(name) => vec![name.clone()],
            None => dep_handle.borrow().default_slice_names(Role::Use, arch).to_vec(),
        };
        for dep_slice_name in dep_slice_names {
            let dep_key = expand(
                library,
                dep_handle.clone(),
                &dep_slice_name,
                arch,
                nodes,
                order,
                ordered_adj,
                expanded,
            )?;
            if !edge.unordered {
                ordered_adj.entry(key.clone()).or_default().push(dep_key);
            }
        }
    }

    Ok(key)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first postorder topological sort over the ordered-edge subgraph: dependencies are
/// pushed before dependents, satisfying invariant 3 (§8). Visits `order` (discovery order) so the
/// result is deterministic given identical inputs, per §4.6's tie-break rule.
fn topo_sort(graph: &Graph) -> Result<Vec<NodeKey>> {
    let mut color: BTreeMap<NodeKey, Color> =
        graph.order.iter().cloned().map(|k| (k, Color::White)).collect();
    let mut result = Vec::with_capacity(graph.order.len());

    fn visit(
        node: &NodeKey,
        graph: &Graph,
        color: &mut BTreeMap<NodeKey, Color>,
        result: &mut Vec<NodeKey>,
    ) -> Result<()> {
        color.insert(node.clone(), Color::Gray);
        if let Some(children) = graph.ordered_adj.get(node) {
            for child in children {
                match color.get(child).copied().unwrap_or(Color::White) {
                    Color::White => visit(child, graph, color, result)?,
                    Color::Gray => {
                        return Err(BuildError::DependencyCycle {
                            from: node_label(&graph.nodes, node),
                            to: node_label(&graph.nodes, child),
                        })
                    }
                    Color::Black => {}
                }
            }
        }
        color.insert(node.clone(), Color::Black);
        result.push(node.clone());
        Ok(())
    }

    for node in &graph.order {
        if color.get(node).copied().unwrap_or(Color::White) == Color::White {
            visit(node, graph, &mut color, &mut result)?;
        }
    }

    Ok(result)
}

/// Per-arch staging state accumulated by [`Bundle::emit_resources`].
#[derive(Default)]
struct ArchFiles {
    files: BTreeMap<String, Vec<u8>>,
    js_order: Vec<String>,
    css_order: Vec<String>,
    static_order: Vec<String>,
}

#[derive(Default)]
struct BundleState {
    per_arch: BTreeMap<Arch, ArchFiles>,
    head: Vec<u8>,
    body: Vec<u8>,
    dependency_info: DependencyInfo,
    /// Every named package that contributed a slice to this bundle, keyed by name, so
    /// [`write_npm_dirs`] knows whose `node_modules` to materialize.
    package_roots: BTreeMap<String, std::path::PathBuf>,
}

/// Orchestrates one bundle operation against a [`Library`].
pub struct Bundle<'lib> {
    library: &'lib Library,
    js_minifier: Arc<dyn JsMinifier>,
    css_minifier: Arc<dyn CssMinifier>,
}

impl<'lib> Bundle<'lib> {
    pub fn new(library: &'lib Library) -> Self {
        Self {
            library,
            js_minifier: Arc::new(PassthroughMinifier),
            css_minifier: Arc::new(PassthroughMinifier),
        }
    }

    #[must_use]
    pub fn js_minifier(mut self, minifier: Arc<dyn JsMinifier>) -> Self {
        self.js_minifier = minifier;
        self
    }

    #[must_use]
    pub fn css_minifier(mut self, minifier: Arc<dyn CssMinifier>) -> Self {
        self.css_minifier = minifier;
        self
    }

    /// Expands and topologically sorts `roots` into dependency-first slice order. Public so
    /// callers (and tests) can inspect ordering without running a full bundle.
    pub fn determine_load_order(&self, roots: &Roots) -> Result<Vec<(PackageHandle, String, Arch)>> {
        let mut nodes = BTreeMap::new();
        let mut order = Vec::new();
        let mut ordered_adj = BTreeMap::new();
        let mut expanded = BTreeSet::new();

        for (role, by_arch) in &roots.by_role {
            for (arch, refs) in by_arch {
                for pkg_ref in refs {
                    let handle = resolve_ref(self.library, pkg_ref)?;
                    let slice_names = handle.borrow().default_slice_names(*role, *arch).to_vec();
                    for slice_name in slice_names {
                        expand(
                            self.library,
                            handle.clone(),
                            &slice_name,
                            *arch,
                            &mut nodes,
                            &mut order,
                            &mut ordered_adj,
                            &mut expanded,
                        )?;
                    }
                }
            }
        }

        let graph = Graph { order, nodes, ordered_adj };
        let sorted = topo_sort(&graph)?;
        Ok(sorted
            .into_iter()
            .map(|key| (graph.nodes[&key].clone(), key.slice, key.arch))
            .collect())
    }

    /// Compiles every slice in `order`, computes its import map from its `uses` list, links it,
    /// and routes the resulting resources into `state`.
    #[instrument(skip_all)]
    fn emit_resources(
        &self,
        order: &[(PackageHandle, String, Arch)],
        state: &mut BundleState,
    ) -> Result<()> {
        for (handle, slice_name, arch) in order {
            let arch = *arch;

            let dep_names: BTreeSet<String> = {
                let pkg = handle.borrow();
                let slice = pkg
                    .slice(slice_name, arch)
                    .expect("slice present: discovered by determine_load_order");
                slice.uses.iter().map(|e| e.package.clone()).collect()
            };

            {
                let pkg = handle.borrow();
                if let Some(name) = &pkg.name {
                    state.package_roots.entry(name.clone()).or_insert_with(|| pkg.source_root.clone());
                }
            }

            let own_registry = handle.borrow().extensions.clone();
            let mut dep_registries = Vec::with_capacity(dep_names.len());
            for dep_name in &dep_names {
                dep_registries.push(self.library.get(dep_name)?.borrow().extensions.clone());
            }
            let merged = ExtensionRegistry::compose(&own_registry, dep_registries.iter())?;

            handle
                .borrow_mut()
                .slice_mut(slice_name, arch)
                .expect("slice present")
                .compile(&merged)?;

            let imports = self.build_import_map(handle, slice_name, arch)?;

            let pkg = handle.borrow();
            let slice = pkg.slice(slice_name, arch).expect("slice present");
            let resources = slice.link_resources(&imports)?;

            state
                .dependency_info
                .files
                .extend(slice.dependency_info().files.iter().map(|(k, v)| (k.clone(), v.clone())));
            state
                .dependency_info
                .directories
                .extend(slice.dependency_info().directories.iter().map(|(k, v)| (k.clone(), v.clone())));
            drop(pkg);

            let arch_state = state.per_arch.entry(arch).or_default();
            for resource in resources {
                route_resource(resource, arch_state, &mut state.head, &mut state.body)?;
            }
        }
        Ok(())
    }

    /// Builds the symbol import map for one slice from its ordered `uses` list: each non-unordered
    /// edge's target slice(s) contribute their exports, later edges winning ties (§4.2).
    fn build_import_map(
        &self,
        handle: &PackageHandle,
        slice_name: &str,
        arch: Arch,
    ) -> Result<BTreeMap<String, String>> {
        let uses = {
            let pkg = handle.borrow();
            pkg.slice(slice_name, arch).expect("slice present").uses.clone()
        };

        let mut imports = BTreeMap::new();
        for edge in &uses {
            if edge.unordered {
                continue;
            }
            let dep_handle = self.library.get(&edge.package)?;
            let dep_slice_names: Vec<String> = match &edge.slice {
                Some(name) => vec![name.clone()],
                None => dep_handle.borrow().default_slice_names(Role::Use, arch).to_vec(),
            };
            for dep_slice_name in dep_slice_names {
                let dep_pkg = dep_handle.borrow();
                let dep_slice = dep_pkg.slice(&dep_slice_name, arch).expect("slice present");
                for symbol in dep_slice.exports() {
                    imports.insert(symbol.clone(), edge.package.clone());
                }
            }
        }
        Ok(imports)
    }

    /// Runs a full bundle operation. Never returns `Err`: every failure is caught, the output path
    /// is removed, and the failure is surfaced as a single entry in [`BundleOutput::errors`] (§6).
    #[instrument(skip_all, fields(output = %options.output_path.display()))]
    pub fn build(&self, roots: &Roots, options: &BundleOptions) -> BundleOutput {
        match self.try_build(roots, options) {
            Ok(output) => output,
            Err(e) => {
                error_cleanup(&options.output_path);
                BundleOutput::failure(e.to_string(), DependencyInfo::default())
            }
        }
    }

    fn try_build(&self, roots: &Roots, options: &BundleOptions) -> Result<BundleOutput> {
        let order = self.determine_load_order(roots)?;
        let mut state = BundleState::default();
        self.emit_resources(&order, &mut state)?;
        self.write_to_directory(&state, options)
    }

    /// Minifies (optionally), hashes, writes, and atomically publishes the bundle (§4.6).
    fn write_to_directory(&self, state: &BundleState, options: &BundleOptions) -> Result<BundleOutput> {
        let out = &options.output_path;
        let base = out.file_name().and_then(|n| n.to_str()).unwrap_or("bundle");
        let build_dir = out.parent().unwrap_or_else(|| Path::new(".")).join(format!(".build.{base}"));

        let result = self.populate_build_dir(&build_dir, state, options);

        match result {
            Ok(app_json) => {
                write_json_file(&app_json, build_dir.join("app.json"))?;
                if out.exists() {
                    fs::remove_dir_all(out).map_err(|e| BuildError::io(e, out))?;
                }
                fs::rename(&build_dir, out).map_err(|e| BuildError::io(e, out))?;
                Ok(BundleOutput::success(state.dependency_info.clone()))
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&build_dir);
                error_cleanup(out);
                Ok(BundleOutput::failure(e.to_string(), state.dependency_info.clone()))
            }
        }
    }

    fn populate_build_dir(
        &self,
        build_dir: &Path,
        state: &BundleState,
        options: &BundleOptions,
    ) -> Result<AppJson> {
        if build_dir.exists() {
            fs::remove_dir_all(build_dir).map_err(|e| BuildError::io(e, build_dir))?;
        }
        fs::create_dir_all(build_dir).map_err(|e| BuildError::io(e, build_dir))?;

        let mut manifest = Vec::new();
        let mut load = Vec::new();

        if let Some(server) = state.per_arch.get(&Arch::Server) {
            for serve_path in &server.js_order {
                let rel = serve_path.trim_start_matches('/');
                let data = &server.files[serve_path];
                write_file(&build_dir.join("app").join(rel), data)?;
                load.push(format!("app/{rel}"));
                manifest.push(internal_entry(rel, data, ResourceKind::Js));
            }
            for serve_path in server.static_order.iter().chain(server.css_order.iter()) {
                let rel = serve_path.trim_start_matches('/');
                let data = &server.files[serve_path];
                write_file(&build_dir.join("app").join(rel), data)?;
                manifest.push(internal_entry(rel, data, ResourceKind::Static));
            }
        }

        if let Some(client) = state.per_arch.get(&Arch::Client) {
            for serve_path in &client.static_order {
                let rel = serve_path.trim_start_matches('/');
                let data = &client.files[serve_path];
                write_file(&build_dir.join("static").join(rel), data)?;
                manifest.push(uncacheable_client_entry(rel, data, ResourceKind::Static));
            }

            if options.minify {
                if !client.js_order.is_empty() {
                    let concatenated = concat_with_separators(client, &client.js_order);
                    let minified = self.js_minifier.minify(&concatenated)?;
                    manifest.push(write_cacheable(build_dir, &minified, ResourceKind::Js, "js")?);
                }
                if !client.css_order.is_empty() {
                    let concatenated = concat_with_separators(client, &client.css_order);
                    let minified = self.css_minifier.minify(&concatenated)?;
                    manifest.push(write_cacheable(build_dir, &minified, ResourceKind::Css, "css")?);
                }
            } else {
                for serve_path in client.js_order.iter().chain(client.css_order.iter()) {
                    let rel = serve_path.trim_start_matches('/');
                    let data = &client.files[serve_path];
                    let kind = if client.js_order.contains(serve_path) { ResourceKind::Js } else { ResourceKind::Css };
                    write_file(&build_dir.join("static").join(rel), data)?;
                    manifest.push(uncacheable_client_entry(rel, data, kind));
                }
            }
        }

        render_app_html(build_dir, &state.head, &state.body)?;

        write_launcher(build_dir)?;
        write_npm_dirs(build_dir, options, &state.package_roots)?;

        Ok(AppJson { load, manifest, release: options.release_tag().map(str::to_string) })
    }

}

/// Concatenates `order`'s files from `client` with the `"\n;\n"` separator the spec mandates
/// (§4.6 "minify").
fn concat_with_separators(client: &ArchFiles, order: &[String]) -> Vec<u8> {
    let mut concatenated = Vec::new();
    for (i, serve_path) in order.iter().enumerate() {
        if i > 0 {
            concatenated.extend_from_slice(b"\n;\n");
        }
        concatenated.extend_from_slice(&client.files[serve_path]);
    }
    concatenated
}

/// Writes a minified, concatenated client asset under `static_cacheable/<hash>.<ext>` and builds
/// its manifest entry; the url is the hashed filename itself (invariant 4, §3).
fn write_cacheable(build_dir: &Path, minified: &[u8], kind: ResourceKind, ext: &str) -> Result<ManifestEntry> {
    let hash = sha1_hex(minified);
    let fname = format!("{hash}.{ext}");
    write_file(&build_dir.join("static_cacheable").join(&fname), minified)?;
    Ok(ManifestEntry {
        path: format!("static_cacheable/{fname}"),
        where_: Where::Client,
        kind,
        cacheable: true,
        url: Some(format!("/{fname}")),
        size: minified.len() as u64,
        hash,
    })
}

fn route_resource(
    resource: Resource,
    arch_state: &mut ArchFiles,
    head: &mut Vec<u8>,
    body: &mut Vec<u8>,
) -> Result<()> {
    match resource.kind {
        ResourceKind::Head => {
            head.extend_from_slice(&resource.data);
        }
        ResourceKind::Body => {
            body.extend_from_slice(&resource.data);
        }
        ResourceKind::Js | ResourceKind::Css | ResourceKind::Static => {
            let serve_path = resource.serve_path.ok_or_else(|| {
                BuildError::resource(format!("{:?} resource emitted without a serve path", resource.kind))
            })?;
            arch_state.files.insert(serve_path.clone(), resource.data);
            match resource.kind {
                ResourceKind::Js => arch_state.js_order.push(serve_path),
                ResourceKind::Css => arch_state.css_order.push(serve_path),
                ResourceKind::Static => arch_state.static_order.push(serve_path),
                _ => unreachable!(),
            }
        }
    }
    Ok(())
}

fn internal_entry(rel: &str, data: &[u8], kind: ResourceKind) -> ManifestEntry {
    ManifestEntry {
        path: format!("app/{rel}"),
        where_: Where::Internal,
        kind,
        cacheable: false,
        url: None,
        size: data.len() as u64,
        hash: sha1_hex(data),
    }
}

fn uncacheable_client_entry(rel: &str, data: &[u8], kind: ResourceKind) -> ManifestEntry {
    let hash = sha1_hex(data);
    ManifestEntry {
        path: format!("static/{rel}"),
        where_: Where::Client,
        kind,
        cacheable: false,
        url: Some(format!("/{rel}?{hash}")),
        size: data.len() as u64,
        hash,
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    create_parent_dir_all(path)?;
    fs::write(path, data).map_err(|e| BuildError::io(e, path))
}

/// Substitutes the app.html.in placeholders. The crate ships no default template; an app without
/// a client arch (no head/body segments) still gets an empty `app.html`.
fn render_app_html(build_dir: &Path, head: &[u8], body: &[u8]) -> Result<()> {
    let rendered = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n{}\n</head>\n<body>\n{}\n</body>\n</html>\n",
        String::from_utf8_lossy(head),
        String::from_utf8_lossy(body),
    );
    write_file(&build_dir.join("app.html"), rendered.as_bytes())
}

fn write_launcher(build_dir: &Path) -> Result<()> {
    write_file(&build_dir.join("main.js"), b"require('./server/server.js');\n")?;
    fs::create_dir_all(build_dir.join("server")).map_err(|e| BuildError::io(e, build_dir))?;
    write_file(
        &build_dir.join("README"),
        b"This is a generated application bundle. Run main.js with Node.js to start it.\n",
    )?;
    Ok(())
}

/// Materializes each package's third-party modules under `npm/<pkg>/node_modules` per
/// [`NodeModulesMode`]. Actually acquiring a package's `node_modules` (npm install) is out of
/// scope (§1); this only relocates what's already present on disk next to the package. A package
/// with no `node_modules` directory on disk is silently skipped, not an error.
fn write_npm_dirs(
    build_dir: &Path,
    options: &BundleOptions,
    package_roots: &BTreeMap<String, std::path::PathBuf>,
) -> Result<()> {
    if options.node_modules_mode == NodeModulesMode::Skip {
        return Ok(());
    }
    let npm_dir = build_dir.join("npm");
    fs::create_dir_all(&npm_dir).map_err(|e| BuildError::io(e, &npm_dir))?;

    for (name, source_root) in package_roots {
        let src = source_root.join("node_modules");
        if !src.is_dir() {
            continue;
        }
        let dest = npm_dir.join(name).join("node_modules");
        crate::utils::create_parent_dir_all(&dest)?;
        match options.node_modules_mode {
            NodeModulesMode::Skip => unreachable!("returned above"),
            NodeModulesMode::Copy => crate::utils::copy_dir_all(&src, &dest)?,
            NodeModulesMode::Symlink => symlink_dir(&src, &dest)?,
        }
    }
    Ok(())
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn symlink_dir(src: &Path, dest: &Path) -> Result<()> {
            std::os::unix::fs::symlink(src, dest).map_err(|e| BuildError::io(e, dest))
        }
    } else if #[cfg(windows)] {
        fn symlink_dir(src: &Path, dest: &Path) -> Result<()> {
            std::os::windows::fs::symlink_dir(src, dest).map_err(|e| BuildError::io(e, dest))
        }
    } else {
        fn symlink_dir(_src: &Path, dest: &Path) -> Result<()> {
            Err(BuildError::config(format!(
                "symlinked node_modules is unsupported on this platform (\"{}\")",
                dest.display()
            )))
        }
    }
}

/// Best-effort removal of a stale output path; used on the catch-all failure paths where the
/// bundle never got as far as producing a build directory.
fn error_cleanup(output_path: &Path) {
    if output_path.exists() {
        let _ = fs::remove_dir_all(output_path);
    }
}
