//! Package manifest
//!
//! The set of files written into a package, keyed by their portable
//! (forward-slash) relative names.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Render a relative path with `/` separators regardless of host OS.
pub fn slash_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// A file stored in the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative, slash-normalized path
    pub path: String,
    /// Uncompressed size in bytes
    pub size: u64,
}

/// Files included in a package, in the order they were written.
///
/// Directory entries are implicit; only files are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub entries: Vec<ManifestEntry>,
}

impl PackageManifest {
    pub fn push(&mut self, path: String, size: u64) {
        self.entries.push(ManifestEntry { path, size });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Total uncompressed bytes
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_slash_path_normalizes_separators() {
        let rel: PathBuf = ["src", "app", "main.rs"].iter().collect();
        assert_eq!(slash_path(&rel), "src/app/main.rs");
    }

    #[test]
    fn test_slash_path_drops_curdir() {
        assert_eq!(slash_path(Path::new("./src/lib.rs")), "src/lib.rs");
        assert_eq!(slash_path(Path::new("")), "");
    }

    #[test]
    fn test_manifest_totals() {
        let mut manifest = PackageManifest::default();
        manifest.push("a.txt".to_string(), 3);
        manifest.push("b/c.txt".to_string(), 4);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.total_bytes(), 7);
        assert!(manifest.contains("b/c.txt"));
        assert!(!manifest.contains("b"));
    }
}
