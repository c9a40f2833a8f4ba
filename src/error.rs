//! Crate-wide error type.
//!
//! Every public entry point returns [`Result`] rather than panicking or calling
//! [`std::process::exit`]; deciding whether a failed bundle should abort the host process is a
//! concern of the caller, not of this crate.

use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Convenience alias used throughout the crate.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;

/// The categorical error kinds a bundle operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Missing required option, fuzzy third-party version specifier, duplicate role handler,
    /// double-call to `depends`, or an otherwise invalid static configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A package name, or a slice name/arch pair, could not be resolved.
    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    /// Two packages merged into one slice both claim the same extension.
    #[error(
        "extension conflict: \".{extension}\" is registered by both \"{first}\" and \"{second}\""
    )]
    ExtensionConflict { extension: String, first: String, second: String },

    /// An ordered cycle was found in the slice dependency graph.
    #[error("dependency cycle between \"{from}\" and \"{to}\"")]
    DependencyCycle { from: String, to: String },

    /// The linker was given malformed input, or a prelink fragment was missing its boundary.
    #[error("linker error: {0}")]
    Linker(String),

    /// A resource of an unknown type was emitted, or a client-only resource type was emitted for
    /// a non-client arch.
    #[error("resource error: {0}")]
    Resource(String),

    /// A filesystem operation failed.
    #[error(transparent)]
    Io(#[from] BuildIoError),
}

impl BuildError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn linker(msg: impl Into<String>) -> Self {
        Self::Linker(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn io(err: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::Io(BuildIoError::new(err, path))
    }
}

/// Failure resolving a package name, or a slice name/arch pair on a resolved package.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("no package named \"{0}\" could be found")]
    PackageNotFound(String),

    #[error("package \"{package}\" has no \"{slice}\" slice for arch \"{arch}\"")]
    SliceNotFound { package: String, slice: String, arch: String },

    #[error("invalid use specifier \"{0}\"")]
    InvalidUseSpec(String),
}

/// An [`std::io::Error`] annotated with the path it occurred on, so every I/O failure message
/// names the file involved.
#[derive(Debug)]
pub struct BuildIoError {
    pub io: std::io::Error,
    pub path: PathBuf,
}

impl BuildIoError {
    pub fn new(io: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self { io, path: path.as_ref().to_path_buf() }
    }
}

impl fmt::Display for BuildIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: \"{}\"", self.io, self.path.display())
    }
}

impl std::error::Error for BuildIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.io)
    }
}
