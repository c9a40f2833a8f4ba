//! Small shared helpers: content hashing, path normalization and JSON (de)serialization.

use crate::error::{BuildError, Result};
use serde::{de::DeserializeOwned, Serialize};
use sha1::{Digest, Sha1};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Returns the lowercase hex sha1 digest of `bytes`.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reads `path` and returns its bytes alongside their sha1 digest.
pub fn read_with_hash(path: impl AsRef<Path>) -> Result<(Vec<u8>, String)> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| BuildError::io(e, path))?;
    let hash = sha1_hex(&bytes);
    Ok((bytes, hash))
}

/// Converts `path` to a `/`-separated string regardless of host OS, as required by the manifest
/// path invariant.
pub fn to_slash(path: impl AsRef<Path>) -> String {
    use path_slash::PathExt;
    path.as_ref().to_slash_lossy().into_owned()
}

/// Joins `base` and `rel` and slash-normalizes the result; used to build served paths.
pub fn join_serve_path(base: &str, rel: impl AsRef<Path>) -> String {
    let base = base.trim_end_matches('/');
    let rel = to_slash(rel);
    let rel = rel.trim_start_matches('/');
    if base.is_empty() {
        format!("/{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

/// Reads and canonicalizes a path, giving an [`BuildError::Io`] naming the path on failure.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    dunce_canonicalize(path).map_err(|e| BuildError::io(e, path))
}

#[cfg(not(windows))]
fn dunce_canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    fs::canonicalize(path)
}

#[cfg(windows)]
fn dunce_canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    // `fs::canonicalize` on Windows returns UNC paths (`\\?\C:\...`); strip that prefix so
    // downstream slash-normalization and display stay readable.
    let canonical = fs::canonicalize(path)?;
    Ok(canonical
        .to_str()
        .and_then(|s| s.strip_prefix(r"\\?\"))
        .map(PathBuf::from)
        .unwrap_or(canonical))
}

/// Reads a JSON file into `T`.
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| BuildError::io(e, path))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| BuildError::config(format!("invalid JSON in \"{}\": {e}", path.display())))
}

/// Writes `value` as pretty JSON to `path`, creating parent directories as needed.
pub fn write_json_file<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir_all(path)?;
    let file = fs::File::create(path).map_err(|e| BuildError::io(e, path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| BuildError::config(format!("failed to serialize \"{}\": {e}", path.display())))?;
    writer.flush().map_err(|e| BuildError::io(e, path))?;
    Ok(())
}

/// Creates every missing parent directory of `path`.
pub fn create_parent_dir_all(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(e, parent))?;
    }
    Ok(())
}

/// Recursively copies the contents of `from` into `to`, creating `to` if needed.
pub fn copy_dir_all(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    fs::create_dir_all(to).map_err(|e| BuildError::io(e, to))?;
    for entry in fs::read_dir(from).map_err(|e| BuildError::io(e, from))? {
        let entry = entry.map_err(|e| BuildError::io(e, from))?;
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| BuildError::io(e, entry.path()))?;
        if file_type.is_dir() {
            copy_dir_all(entry.path(), dest)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| BuildError::io(e, entry.path()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_stable() {
        assert_eq!(sha1_hex(b"hello"), sha1_hex(b"hello"));
        assert_ne!(sha1_hex(b"hello"), sha1_hex(b"world"));
    }

    #[test]
    fn join_serve_path_normalizes() {
        assert_eq!(join_serve_path("/packages/foo", "bar.js"), "/packages/foo/bar.js");
        assert_eq!(join_serve_path("/", "bar.js"), "/bar.js");
        assert_eq!(join_serve_path("", "bar.js"), "/bar.js");
    }
}
