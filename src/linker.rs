//! The two-phase linker: [`prelink`] scopes a package's own declarations and discovers its
//! exports; [`link`] splices the concrete, per-bundle import map into the boundary `prelink` left
//! behind.
//!
//! Prelink depends only on a package's own sources, so its output is cacheable independently of
//! which other packages end up in the bundle. Link depends on the whole bundle's dependency
//! selection and runs once per bundle. See design notes in the crate root docs for why the split
//! exists.

use crate::{
    error::{BuildError, Result},
    utils::sha1_hex,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicU64, Ordering},
};

/// A single served code fragment, before or after linking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub source: String,
    pub serve_path: String,
}

impl Fragment {
    pub fn new(serve_path: impl Into<String>, source: impl Into<String>) -> Self {
        Self { serve_path: serve_path.into(), source: source.into() }
    }
}

/// Inputs to [`prelink`].
pub struct PrelinkInput {
    /// Ordered js fragments to scope and scan for exports.
    pub fragments: Vec<Fragment>,
    /// `None` for an application pseudo-package.
    pub package_name: Option<String>,
    /// Symbols force-exported regardless of whether a source directive marks them.
    pub force_export: BTreeSet<String>,
    /// `true` for an application pseudo-package: declarations stay on the shared global
    /// namespace and exports are not collected.
    pub use_global_namespace: bool,
    /// Serve path fragments are combined to, in namespaced (package) mode.
    pub combined_serve_path: String,
    /// Serve path of the stub that supplies imported symbols; informational, embedded as a
    /// comment so generated output is traceable back to its source.
    pub import_stub_serve_path: String,
}

/// Output of [`prelink`]: cacheable, bundle-independent.
#[derive(Clone, Debug)]
pub struct PrelinkOutput {
    pub files: Vec<Fragment>,
    /// Opaque marker embedded in every output fragment, unique to this invocation.
    pub boundary: String,
    pub exports: BTreeSet<String>,
}

static EXPORT_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*//\s*@export\s+([A-Za-z_$][\w$]*)\s*$").unwrap());

static BOUNDARY_SALT: AtomicU64 = AtomicU64::new(0);

/// Generates a boundary token guaranteed not to appear in any of `sources`.
fn generate_boundary(sources: &[&str]) -> String {
    loop {
        let salt = BOUNDARY_SALT.fetch_add(1, Ordering::Relaxed);
        let mut digest_input = String::new();
        for s in sources {
            digest_input.push_str(s);
        }
        digest_input.push_str(&salt.to_string());
        let candidate = format!("/*__boundary_{}__*/", sha1_hex(digest_input.as_bytes()));
        if sources.iter().all(|s| !s.contains(&candidate)) {
            return candidate;
        }
    }
}

fn scoped_wrap(package_name: &str, boundary: &str, body: &str) -> String {
    format!(
        "(function () {{\n{boundary}\n{body}\n}}).call(PackageScope({package_name:?}));\n",
    )
}

/// A one-line comment naming the stub the boundary's spliced-in imports are conceptually read
/// from, so a fragment can be traced back to the import map that produced its prelude.
fn stub_comment(import_stub_serve_path: &str) -> String {
    format!("// imports from {import_stub_serve_path}\n")
}

/// Phase 1: scopes top-level declarations, discovers exports, embeds the link boundary.
///
/// See the crate-level design notes for the application-mode vs package-mode distinction.
pub fn prelink(input: PrelinkInput) -> Result<PrelinkOutput> {
    let source_refs: Vec<&str> = input.fragments.iter().map(|f| f.source.as_str()).collect();
    let boundary = generate_boundary(&source_refs);

    let mut exports: BTreeSet<String> = input.force_export.clone();

    let stub = stub_comment(&input.import_stub_serve_path);

    if input.use_global_namespace {
        // Application pseudo-package: declarations stay global, exports are not collected, and
        // fragments are emitted individually (not combined).
        let files = input
            .fragments
            .into_iter()
            .map(|f| {
                let source = format!("{stub}{boundary}\n{}\n", f.source);
                Fragment::new(f.serve_path, source)
            })
            .collect();
        return Ok(PrelinkOutput { files, boundary, exports: BTreeSet::new() });
    }

    let package_name = input
        .package_name
        .as_deref()
        .ok_or_else(|| BuildError::linker("package mode requires a package name"))?;

    let mut combined_body = String::new();
    for fragment in &input.fragments {
        for cap in EXPORT_DIRECTIVE.captures_iter(&fragment.source) {
            exports.insert(cap[1].to_string());
        }
        combined_body.push_str(&fragment.source);
        combined_body.push('\n');
    }

    let wrapped = format!("{stub}{}", scoped_wrap(package_name, &boundary, &combined_body));
    let files = vec![Fragment::new(input.combined_serve_path, wrapped)];

    Ok(PrelinkOutput { files, boundary, exports })
}

/// Phase 2: splices the resolved import map into every prelink fragment's boundary.
///
/// `imports` maps an imported symbol to the name of the package that supplies it; later entries
/// in a slice's `uses` list win ties upstream, so by the time the map reaches this function it
/// already reflects the correct precedence.
pub fn link(
    imports: &std::collections::BTreeMap<String, String>,
    use_global_namespace: bool,
    prelink_files: &[Fragment],
    boundary: &str,
) -> Result<Vec<Fragment>> {
    let prelude = render_prelude(imports, use_global_namespace);

    prelink_files
        .iter()
        .map(|f| {
            if !f.source.contains(boundary) {
                return Err(BuildError::linker(format!(
                    "prelink fragment at \"{}\" is missing its link boundary",
                    f.serve_path
                )));
            }
            let linked = f.source.replace(boundary, &prelude);
            Ok(Fragment::new(f.serve_path.clone(), linked))
        })
        .collect()
}

fn render_prelude(
    imports: &std::collections::BTreeMap<String, String>,
    use_global_namespace: bool,
) -> String {
    if imports.is_empty() {
        return String::new();
    }
    let mut prelude = String::new();
    for (symbol, package) in imports {
        if use_global_namespace {
            prelude.push_str(&format!("{symbol} = PackageScope({package:?}).{symbol};\n"));
        } else {
            prelude.push_str(&format!("var {symbol} = PackageScope({package:?}).{symbol};\n"));
        }
    }
    prelude
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn package_mode_collects_exports_and_combines() {
        let input = PrelinkInput {
            fragments: vec![
                Fragment::new("/packages/p/a.js", "// @export Foo\nvar Foo = 1;"),
                Fragment::new("/packages/p/b.js", "var Bar = 2;"),
            ],
            package_name: Some("p".into()),
            force_export: BTreeSet::from(["Bar".to_string()]),
            use_global_namespace: false,
            combined_serve_path: "/packages/p.js".into(),
            import_stub_serve_path: "/packages/global-imports.js".into(),
        };
        let out = prelink(input).unwrap();
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.files[0].serve_path, "/packages/p.js");
        assert_eq!(out.exports, BTreeSet::from(["Foo".to_string(), "Bar".to_string()]));
        assert!(out.files[0].source.contains(&out.boundary));
        assert!(out.files[0].source.contains("/packages/global-imports.js"));
    }

    #[test]
    fn import_stub_serve_path_is_embedded_in_every_output_fragment() {
        let input = PrelinkInput {
            fragments: vec![Fragment::new("/a.js", "use(Foo);")],
            package_name: None,
            force_export: BTreeSet::new(),
            use_global_namespace: true,
            combined_serve_path: String::new(),
            import_stub_serve_path: "/packages/global-imports.js".into(),
        };
        let out = prelink(input).unwrap();
        assert!(out.files[0].source.contains("/packages/global-imports.js"));
    }

    #[test]
    fn application_mode_does_not_collect_exports() {
        let input = PrelinkInput {
            fragments: vec![Fragment::new("/a.js", "// @export Foo\nvar Foo = 1;")],
            package_name: None,
            force_export: BTreeSet::new(),
            use_global_namespace: true,
            combined_serve_path: String::new(),
            import_stub_serve_path: "/packages/global-imports.js".into(),
        };
        let out = prelink(input).unwrap();
        assert!(out.exports.is_empty());
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.files[0].serve_path, "/a.js");
    }

    #[test]
    fn link_splices_prelude_at_boundary() {
        let input = PrelinkInput {
            fragments: vec![Fragment::new("/packages/q/a.js", "console.log(Foo);")],
            package_name: Some("q".into()),
            force_export: BTreeSet::new(),
            use_global_namespace: false,
            combined_serve_path: "/packages/q.js".into(),
            import_stub_serve_path: "/packages/global-imports.js".into(),
        };
        let pre = prelink(input).unwrap();
        let mut imports = BTreeMap::new();
        imports.insert("Foo".to_string(), "p".to_string());
        let linked = link(&imports, false, &pre.files, &pre.boundary).unwrap();
        assert_eq!(linked.len(), 1);
        assert!(linked[0].source.contains("var Foo = PackageScope(\"p\").Foo;"));
        assert!(!linked[0].source.contains(&pre.boundary));
    }

    #[test]
    fn link_fails_on_missing_boundary() {
        let files = vec![Fragment::new("/x.js", "no boundary here")];
        let err = link(&BTreeMap::new(), false, &files, "/*__missing__*/").unwrap_err();
        assert!(matches!(err, BuildError::Linker(_)));
    }
}
