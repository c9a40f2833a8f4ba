//! Benchmarks `Bundle::build` against a synthetic library of many small packages, each with a
//! client and server source file and an ordered dependency on the last.

#[macro_use]
extern crate criterion;

use bundler_core::{
    arch::{Arch, Role},
    bundle::{Bundle, Roots},
    handler_registry::HandlerRegistry,
    library::Library,
    manifest::PackageManifest,
    package::Package,
};
use criterion::Criterion;
use std::rc::Rc;
use std::cell::RefCell;

fn build_library(num_packages: usize) -> Library {
    let mut library = Library::new(vec![], HandlerRegistry::with_builtins());
    library.preload(
        "meteor",
        pkg(r#"
            [package]
            name = "meteor"
            [[slice]]
            role = "use"
            sources = { client = ["boot.js"], server = ["boot.js"] }
        "#),
    );
    library.preload(
        "webapp",
        pkg(r#"
            [package]
            name = "webapp"
            [[slice]]
            role = "use"
            sources = { client = ["boot.js"], server = ["boot.js"] }
        "#),
    );

    for i in 0..num_packages {
        let name = format!("pkg-{i}");
        let uses_prev = if i == 0 {
            String::new()
        } else {
            format!(r#"uses = [ {{ spec = "pkg-{}" }} ]"#, i - 1)
        };
        let toml = format!(
            r#"
                [package]
                name = "{name}"
                [[slice]]
                role = "use"
                {uses_prev}
                sources = {{ client = ["main.js"], server = ["main.js"] }}
            "#
        );
        library.preload(&name, pkg(&toml));
    }

    library
}

fn pkg(toml: &str) -> Package {
    let manifest = PackageManifest::parse(toml).unwrap();
    Package::from_manifest(manifest, "/synthetic", &HandlerRegistry::with_builtins(), false).unwrap()
}

fn bundle_many_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle many packages");
    group.sample_size(10);

    for num_packages in [10usize, 50, 100] {
        let library = build_library(num_packages);
        let app_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(app_dir.path().join("client")).unwrap();
        std::fs::create_dir_all(app_dir.path().join("server")).unwrap();
        std::fs::write(app_dir.path().join("client/a.js"), b"// client").unwrap();
        std::fs::write(app_dir.path().join("server/b.js"), b"// server").unwrap();

        let app = Package::from_application_directory(
            app_dir.path().to_path_buf(),
            (0..num_packages).map(|i| format!("pkg-{i}")).collect(),
            vec!["js".to_string()],
        )
        .unwrap();
        let app_handle = Rc::new(RefCell::new(app));

        group.bench_function(format!("{num_packages}_packages"), |b| {
            b.iter(|| {
                let mut roots = Roots::new();
                roots.add(Role::Use, Arch::Server, app_handle.clone());
                let bundle = Bundle::new(&library);
                let _ = bundle.determine_load_order(&roots).unwrap();
            });
        });
    }
}

criterion_group!(benches, bundle_many_benchmark);
criterion_main!(benches);
