//! Package resolution, compilation, and linking engine for a package-oriented application
//! bundler.
//!
//! Given a project directory and a library of reusable packages, [`Bundle`] resolves which
//! packages are required for each target [`Arch`], compiles each package's sources through
//! extension-specific handlers ([`ExtensionRegistry`]), links the resulting code fragments so
//! cross-package symbols bind correctly ([`linker`]), and emits a deployable bundle: runnable
//! server code, cacheable client assets, a content-addressed manifest, and dependency-tracking
//! metadata for an external file watcher.
//!
//! Out of scope, by design: the CLI and interactive run loop, package-source acquisition
//! (warehouse download, git checkout discovery, npm install), file watching itself, and the
//! actual JS/CSS minification algorithms (see [`minify`] for the trait seam those plug into).
//!
//! ## Pipeline
//!
//! [`Library`] resolves names to [`Package`]s, each of which owns a set of [`Slice`]s. A
//! [`Bundle`] expands a [`Roots`] selection into the full transitive slice graph
//! ([`Bundle::determine_load_order`]), then compiles and links each slice in dependency order
//! ([`Bundle::build`]), finally writing the result atomically to the configured output path.

#[macro_use]
extern crate tracing;

pub mod arch;
pub mod bundle;
pub mod config;
pub mod error;
pub mod extension;
pub mod handler_registry;
pub mod library;
pub mod linker;
pub mod manifest;
pub mod minify;
pub mod output;
pub mod package;
pub mod release;
pub mod resource;
pub mod scanner;
pub mod slice;
pub mod utils;

#[cfg(feature = "bundle-util")]
pub mod bundle_util;

pub use arch::{Arch, Role};
pub use bundle::{Bundle, PackageRef, Roots};
pub use config::{BundleOptions, BundleOptionsBuilder, NodeModulesMode};
pub use error::{BuildError, Result};
pub use library::Library;
pub use output::{AppJson, BundleOutput, ManifestEntry};
pub use package::Package;
pub use slice::Slice;
