//! Integration-level exercise of the two-phase linker contract against the package-mode and
//! application-mode scenarios described in spec §8.

use bundler_core::linker::{link, prelink, Fragment, PrelinkInput};
use std::collections::{BTreeMap, BTreeSet};

#[test]
fn package_exports_bind_to_importer_namespace() {
    // Package `p` exports `Foo`.
    let p_pre = prelink(PrelinkInput {
        fragments: vec![Fragment::new("/packages/p.js", "// @export Foo\nvar Foo = 42;")],
        package_name: Some("p".to_string()),
        force_export: BTreeSet::new(),
        use_global_namespace: false,
        combined_serve_path: "/packages/p.js".to_string(),
        import_stub_serve_path: "/packages/global-imports.js".to_string(),
    })
    .unwrap();
    assert!(p_pre.exports.contains("Foo"));

    // Package `q` uses `p` and references `Foo`.
    let q_pre = prelink(PrelinkInput {
        fragments: vec![Fragment::new("/packages/q.js", "check(Foo);")],
        package_name: Some("q".to_string()),
        force_export: BTreeSet::new(),
        use_global_namespace: false,
        combined_serve_path: "/packages/q.js".to_string(),
        import_stub_serve_path: "/packages/global-imports.js".to_string(),
    })
    .unwrap();

    let mut imports = BTreeMap::new();
    imports.insert("Foo".to_string(), "p".to_string());
    let q_linked = link(&imports, false, &q_pre.files, &q_pre.boundary).unwrap();

    assert_eq!(q_linked.len(), 1);
    assert!(q_linked[0].source.contains("var Foo = PackageScope(\"p\").Foo;"));
    assert!(q_linked[0].source.contains("check(Foo);"));
}

#[test]
fn application_mode_imports_are_injected_on_the_global_namespace() {
    let app_pre = prelink(PrelinkInput {
        fragments: vec![Fragment::new("/client/a.js", "use(Foo);")],
        package_name: None,
        force_export: BTreeSet::new(),
        use_global_namespace: true,
        combined_serve_path: String::new(),
        import_stub_serve_path: "/packages/global-imports.js".to_string(),
    })
    .unwrap();
    assert!(app_pre.exports.is_empty());

    let mut imports = BTreeMap::new();
    imports.insert("Foo".to_string(), "p".to_string());
    let linked = link(&imports, true, &app_pre.files, &app_pre.boundary).unwrap();

    assert_eq!(linked.len(), 1);
    assert!(linked[0].source.contains("Foo = PackageScope(\"p\").Foo;"));
    assert!(!linked[0].source.contains("var Foo ="));
}

#[test]
fn force_export_is_exported_without_a_directive() {
    let pre = prelink(PrelinkInput {
        fragments: vec![Fragment::new("/packages/p.js", "var Bar = 1;")],
        package_name: Some("p".to_string()),
        force_export: BTreeSet::from(["Bar".to_string()]),
        use_global_namespace: false,
        combined_serve_path: "/packages/p.js".to_string(),
        import_stub_serve_path: "/packages/global-imports.js".to_string(),
    })
    .unwrap();
    assert_eq!(pre.exports, BTreeSet::from(["Bar".to_string()]));
}
