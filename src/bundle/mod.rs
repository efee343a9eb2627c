//! Source packaging
//!
//! Walks a project tree, applies the exclusion rules and writes a zip
//! package. Entry names are relative and slash-normalized; timestamps and
//! permissions are pinned so the same tree yields the same bytes on any host.

mod exclude;
mod manifest;

pub use exclude::{ExcludeRules, IgnoreFile, RuleTier, IGNORE_FILE_NAME};
pub use manifest::{slash_path, ManifestEntry, PackageManifest};

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Errors for packaging operations
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Path is not within project root: {0}")]
    PathNotInRoot(PathBuf),
}

/// Counters collected while walking the tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleStats {
    /// Directories descended into (the root included)
    pub dirs_visited: u64,
    /// Directories skipped without descending
    pub dirs_pruned: u64,
    /// Files written to the package
    pub files_written: u64,
    /// Files skipped by a rule
    pub files_excluded: u64,
}

/// Result of writing a package
#[derive(Debug, Clone)]
pub struct BundleResult {
    /// Where the package was written
    pub path: PathBuf,
    /// Files stored
    pub manifest: PackageManifest,
    /// Walk counters
    pub stats: BundleStats,
    /// Package size on disk
    pub size_bytes: u64,
    /// SHA-256 of the package bytes
    pub sha256: String,
}

/// Packages a project directory
pub struct Bundler {
    /// Root directory to package
    root: PathBuf,
    /// Exclusion rules
    exclude: ExcludeRules,
}

impl Bundler {
    /// Create a bundler using the built-in rules and the root's ignore file
    pub fn new(root: PathBuf) -> Self {
        let exclude = ExcludeRules::for_project(&root);
        Self { root, exclude }
    }

    /// Create a bundler with explicit rules
    pub fn with_rules(root: PathBuf, exclude: ExcludeRules) -> Self {
        Self { root, exclude }
    }

    pub fn rules(&self) -> &ExcludeRules {
        &self.exclude
    }

    /// Write the package to `output`.
    ///
    /// Any read or write failure aborts the whole operation; a partially
    /// written `output` is left for the caller to discard.
    pub fn create_bundle(&self, output: &Path) -> Result<BundleResult, BundleError> {
        let root = fs::canonicalize(&self.root)?;

        let file = File::create(output)?;
        // Resolved after creation so an output inside the tree is recognized
        let output_abs = fs::canonicalize(output)?;
        let mut zip = ZipWriter::new(file);

        let base_options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let mut manifest = PackageManifest::default();
        let mut stats = BundleStats::default();

        let mut walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry?;
            let path = entry.path();

            let rel_path = path
                .strip_prefix(&root)
                .map_err(|_| BundleError::PathNotInRoot(path.to_path_buf()))?;

            // Skip root itself
            if rel_path.as_os_str().is_empty() {
                stats.dirs_visited += 1;
                continue;
            }

            let is_dir = entry.file_type().is_dir();

            if self.exclude.should_exclude(rel_path, is_dir) {
                if is_dir {
                    walker.skip_current_dir();
                    stats.dirs_pruned += 1;
                } else {
                    stats.files_excluded += 1;
                }
                continue;
            }

            if is_dir {
                stats.dirs_visited += 1;
                continue;
            }

            if path == output_abs {
                debug!(path = %path.display(), "skipping package output inside project tree");
                continue;
            }

            // Symlinks are stored by content; links to directories are not followed
            let metadata = fs::metadata(path)?;
            if !metadata.is_file() {
                debug!(path = %path.display(), "skipping non-regular file");
                continue;
            }

            let name = slash_path(rel_path);
            let mode = if is_executable(&metadata) { 0o755 } else { 0o644 };
            zip.start_file(name.clone(), base_options.unix_permissions(mode))?;

            let mut source = File::open(path)?;
            let size = io::copy(&mut source, &mut zip)?;

            manifest.push(name, size);
            stats.files_written += 1;
        }

        zip.finish()?;

        let (size_bytes, sha256) = digest_file(output)?;

        info!(
            files = stats.files_written,
            excluded = stats.files_excluded,
            pruned = stats.dirs_pruned,
            size_bytes,
            "package written"
        );

        Ok(BundleResult {
            path: output.to_path_buf(),
            manifest,
            stats,
            size_bytes,
            sha256,
        })
    }
}

/// Size and SHA-256 of a file
fn digest_file(path: &Path) -> io::Result<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((size, hex::encode(hasher.finalize())))
}

/// Check if a file is executable
fn is_executable(metadata: &fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        false
    }
}

/// Human-readable byte count (1024-based)
pub fn humanize_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, suffix)
}
