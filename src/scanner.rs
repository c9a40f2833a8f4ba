//! [`SourceScanner`]: deterministic, locale-independent enumeration of a package or app's source
//! tree, followed by the html-first reordering that lets template registrations precede the code
//! that references them.

use crate::{
    error::{BuildError, Result},
    utils::canonicalize,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Ignore patterns applied to every scan, in addition to any caller-supplied patterns.
static DEFAULT_IGNORE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(^|/)\.",          // dotfiles and dotdirs, e.g. .git, .meteor/local
        r"(^|/)node_modules/",
        r"~$",               // editor backup files
        r"\.orig$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Enumerates source files under `root`.
pub struct SourceScanner {
    root: PathBuf,
    extensions: HashSet<String>,
    extra_ignore: Vec<Regex>,
}

impl SourceScanner {
    pub fn new(root: impl Into<PathBuf>, extensions: impl IntoIterator<Item = String>) -> Self {
        Self { root: root.into(), extensions: extensions.into_iter().collect(), extra_ignore: Vec::new() }
    }

    #[must_use]
    pub fn ignore(mut self, pattern: Regex) -> Self {
        self.extra_ignore.push(pattern);
        self
    }

    /// Walks the tree depth-first in lexicographic order, filters by extension and ignore
    /// patterns, then moves every `.html` file ahead of all non-html files while preserving
    /// relative order within each group.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let root = canonicalize(&self.root)?;
        let mut entries: Vec<PathBuf> = Vec::new();

        let mut walker = Vec::new();
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|e| {
                BuildError::io(
                    e.into_io_error().unwrap_or_else(|| std::io::Error::other("walk failed")),
                    &root,
                )
            })?;
            walker.push(entry);
        }
        walker.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in walker {
            if !entry.file_type().is_file() {
                continue;
            }
            let abs = entry.path();

            let canonical = canonicalize(abs)?;
            if !canonical.starts_with(&root) {
                return Err(BuildError::config(format!(
                    "source file \"{}\" resolves outside its scan root via symlink",
                    abs.display()
                )));
            }

            let rel = abs
                .strip_prefix(&root)
                .map_err(|_| BuildError::config(format!("\"{}\" is not under scan root", abs.display())))?
                .to_path_buf();
            let rel_str = crate::utils::to_slash(&rel);

            if DEFAULT_IGNORE.iter().any(|re| re.is_match(&rel_str))
                || self.extra_ignore.iter().any(|re| re.is_match(&rel_str))
            {
                continue;
            }

            let ext = rel.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if !self.extensions.contains(ext) {
                continue;
            }

            entries.push(rel);
        }

        Ok(html_first(entries))
    }
}

fn is_html(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("html")).unwrap_or(false)
}

/// Reorders `paths` so every `.html` entry precedes every non-html entry, preserving relative
/// order within each group.
///
/// Shared with [`crate::slice::Slice::compile`], which applies this to every slice's sources
/// regardless of whether they were discovered by this scanner or declared verbatim in a package
/// manifest — the html-first rule is a property of source emission order, not of the scanner.
pub(crate) fn html_first(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let (html, rest): (Vec<_>, Vec<_>) = paths.into_iter().partition(|p| is_html(p));
    html.into_iter().chain(rest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_first_preserves_relative_order() {
        let paths: Vec<PathBuf> = ["z.js", "a.html", "m.js", "b.html"].iter().map(PathBuf::from).collect();
        let reordered = html_first(paths);
        let names: Vec<_> =
            reordered.iter().map(|p| p.to_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["a.html", "b.html", "z.js", "m.js"]);
    }

    #[test]
    fn scans_tree_and_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), b"// a").unwrap();
        std::fs::write(dir.path().join("b.css"), b"/* b */").unwrap();
        std::fs::write(dir.path().join(".hidden.js"), b"// hidden").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.js"), b"// c").unwrap();

        let scanner = SourceScanner::new(dir.path(), ["js".to_string()]);
        let found = scanner.scan().unwrap();
        let names: Vec<_> = found.iter().map(|p| crate::utils::to_slash(p)).collect();
        assert_eq!(names, vec!["a.js", "sub/c.js"]);
    }
}
