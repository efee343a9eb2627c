//! Exclusion rules for source packaging
//!
//! Two tiers: the built-in defaults, always evaluated first, and the
//! project's `.kyperignore`. Project rules only ever add exclusions.

use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::manifest::slash_path;

/// Name of the project ignore file, looked up in the project root.
pub const IGNORE_FILE_NAME: &str = ".kyperignore";

/// Built-in exclusions, in evaluation order.
const DEFAULT_EXCLUDES: &[&str] = &[".git/", ".git", "*.log", "tmp/", "node_modules/"];

/// Which tier a rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTier {
    Builtin,
    Project,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Trailing-separator pattern; matches any path component by name.
    Directory(String),
    /// Exact match or single-segment glob against leaf name or full path.
    Name {
        pattern: String,
        glob: Option<GlobMatcher>,
    },
}

#[derive(Debug, Clone)]
struct Rule {
    tier: RuleTier,
    matcher: Matcher,
}

impl Rule {
    fn parse(pattern: &str, tier: RuleTier) -> Self {
        if let Some(dir) = pattern.strip_suffix('/') {
            return Self {
                tier,
                matcher: Matcher::Directory(dir.to_string()),
            };
        }

        // `*` must not cross a separator, matching shell-style single-segment globs
        let glob = match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                warn!(pattern, error = %e, "invalid exclude glob, matching literally");
                None
            }
        };

        Self {
            tier,
            matcher: Matcher::Name {
                pattern: pattern.to_string(),
                glob,
            },
        }
    }

    fn matches(&self, rel: &str, name: &str) -> bool {
        match &self.matcher {
            Matcher::Directory(dir) => {
                if dir.contains('/') {
                    rel == dir || rel.starts_with(&format!("{}/", dir))
                } else {
                    rel.split('/').any(|component| component == dir)
                }
            }
            Matcher::Name { pattern, glob } => {
                if name == pattern || rel == pattern {
                    return true;
                }
                match glob {
                    Some(glob) => glob.is_match(name) || glob.is_match(rel),
                    None => false,
                }
            }
        }
    }
}

/// Result of parsing an ignore file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreFile {
    /// Patterns that will be applied
    pub patterns: Vec<String>,
    /// Negation (`!pattern`) lines that were dropped
    pub dropped_negations: Vec<String>,
}

impl IgnoreFile {
    /// Parse ignore-file contents.
    ///
    /// Blank lines and `#` comments are skipped. Re-inclusion lines starting
    /// with `!` are not supported: they are collected in `dropped_negations`
    /// and never applied, so a negation can never un-exclude something a
    /// broader rule already excludes.
    pub fn parse(contents: &str) -> Self {
        let mut parsed = Self::default();

        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('!') {
                parsed.dropped_negations.push(line.to_string());
                continue;
            }
            parsed.patterns.push(line.to_string());
        }

        parsed
    }
}

/// Exclusion rules for filtering files
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    rules: Vec<Rule>,
    dropped_negations: Vec<String>,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self::new()
    }
}

impl ExcludeRules {
    /// Create rules containing only the built-in tier
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_EXCLUDES
                .iter()
                .map(|p| Rule::parse(p, RuleTier::Builtin))
                .collect(),
            dropped_negations: Vec::new(),
        }
    }

    /// Built-in rules plus the project's ignore file, if it can be read.
    pub fn for_project(root: &Path) -> Self {
        Self::new().with_ignore_file(&root.join(IGNORE_FILE_NAME))
    }

    /// Add patterns from an ignore file.
    ///
    /// An unreadable or missing file is treated as empty.
    pub fn with_ignore_file(self, path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => self.with_ignore_contents(&contents),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no ignore file, using built-in rules only");
                self
            }
        }
    }

    /// Add patterns from ignore-file text
    pub fn with_ignore_contents(mut self, contents: &str) -> Self {
        let parsed = IgnoreFile::parse(contents);

        for negation in &parsed.dropped_negations {
            warn!(
                line = %negation,
                "negation patterns are not supported in {}; line ignored",
                IGNORE_FILE_NAME
            );
        }
        self.dropped_negations.extend(parsed.dropped_negations);

        let patterns: Vec<&str> = parsed.patterns.iter().map(String::as_str).collect();
        self.with_patterns(&patterns)
    }

    /// Add project-tier patterns after the existing rules
    pub fn with_patterns(mut self, patterns: &[&str]) -> Self {
        self.rules.extend(
            patterns
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| Rule::parse(p, RuleTier::Project)),
        );
        self
    }

    /// Negation lines dropped while loading the ignore file
    pub fn dropped_negations(&self) -> &[String] {
        &self.dropped_negations
    }

    /// Number of rules in the given tier
    pub fn count(&self, tier: RuleTier) -> usize {
        self.rules.iter().filter(|r| r.tier == tier).count()
    }

    /// Check whether a path (relative to the project root) is excluded.
    ///
    /// When this returns true for a directory, the caller must not descend
    /// into it.
    pub fn should_exclude(&self, rel_path: &Path, is_dir: bool) -> bool {
        let rel = slash_path(rel_path);
        let name = rel.rsplit('/').next().unwrap_or(rel.as_str());

        let hit = self.rules.iter().find(|rule| rule.matches(&rel, name));
        if let Some(rule) = hit {
            debug!(path = %rel, is_dir, tier = ?rule.tier, "excluded");
        }
        hit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_excludes_git() {
        let rules = ExcludeRules::new();

        assert!(rules.should_exclude(Path::new(".git"), true));
        assert!(rules.should_exclude(Path::new(".git/config"), false));
        assert!(rules.should_exclude(Path::new("vendor/lib/.git"), true));
    }

    #[test]
    fn test_directory_rule_matches_any_depth() {
        let rules = ExcludeRules::new();

        assert!(rules.should_exclude(Path::new("node_modules"), true));
        assert!(rules.should_exclude(Path::new("web/node_modules"), true));
        assert!(rules.should_exclude(Path::new("web/node_modules/react/index.js"), false));
        assert!(rules.should_exclude(Path::new("tmp"), true));
        assert!(rules.should_exclude(Path::new("a/b/tmp/cache.bin"), false));
    }

    #[test]
    fn test_directory_rule_needs_whole_component() {
        let rules = ExcludeRules::new();

        assert!(!rules.should_exclude(Path::new("tmpfiles"), true));
        assert!(!rules.should_exclude(Path::new("src/my_node_modules.rs"), false));
    }

    #[test]
    fn test_log_glob() {
        let rules = ExcludeRules::new();

        assert!(rules.should_exclude(Path::new("debug.log"), false));
        assert!(rules.should_exclude(Path::new("logs/server.log"), false));
        assert!(!rules.should_exclude(Path::new("logger.rb"), false));
        assert!(!rules.should_exclude(Path::new("changelog.md"), false));
    }

    #[test]
    fn test_normal_files_not_excluded() {
        let rules = ExcludeRules::new();

        assert!(!rules.should_exclude(Path::new("kyper.yml"), false));
        assert!(!rules.should_exclude(Path::new("src/main.rs"), false));
        assert!(!rules.should_exclude(Path::new(".gitignore"), false));
        assert!(!rules.should_exclude(Path::new("src"), true));
    }

    #[test]
    fn test_glob_is_single_segment() {
        let rules = ExcludeRules::new().with_patterns(&["build/*.o"]);

        assert!(rules.should_exclude(Path::new("build/main.o"), false));
        assert!(!rules.should_exclude(Path::new("build/sub/main.o"), false));
    }

    #[test]
    fn test_exact_name_pattern_excludes_only_that_file() {
        let rules = ExcludeRules::new().with_ignore_contents("secrets.env\n");

        assert!(rules.should_exclude(Path::new("secrets.env"), false));
        assert!(rules.should_exclude(Path::new("config/secrets.env"), false));
        assert!(!rules.should_exclude(Path::new("secrets.env.example"), false));
        assert!(!rules.should_exclude(Path::new("public.env"), false));
    }

    #[test]
    fn test_full_relative_path_pattern() {
        let rules = ExcludeRules::new().with_patterns(&["config/local.yml"]);

        assert!(rules.should_exclude(Path::new("config/local.yml"), false));
        assert!(!rules.should_exclude(Path::new("other/local.yml"), false));
    }

    #[test]
    fn test_nested_directory_pattern() {
        let rules = ExcludeRules::new().with_patterns(&["assets/cache/"]);

        assert!(rules.should_exclude(Path::new("assets/cache"), true));
        assert!(rules.should_exclude(Path::new("assets/cache/x.png"), false));
        assert!(!rules.should_exclude(Path::new("assets/cached.png"), false));
    }

    #[test]
    fn test_ignore_file_parsing() {
        let parsed = IgnoreFile::parse("# Comment\n*.tmp\n\n  build/  \n!keep.tmp\n");

        assert_eq!(parsed.patterns, vec!["*.tmp".to_string(), "build/".to_string()]);
        assert_eq!(parsed.dropped_negations, vec!["!keep.tmp".to_string()]);
    }

    #[test]
    fn test_negation_line_is_inert() {
        // A negation cannot re-include a file another rule excludes...
        let rules = ExcludeRules::new().with_ignore_contents("*.tmp\n!keep.tmp\n");
        assert!(rules.should_exclude(Path::new("keep.tmp"), false));
        assert_eq!(rules.dropped_negations(), &["!keep.tmp".to_string()]);

        // ...nor exclude the file it names.
        let rules = ExcludeRules::new().with_ignore_contents("!notes.txt\n");
        assert!(!rules.should_exclude(Path::new("notes.txt"), false));
        assert!(!rules.should_exclude(Path::new("!notes.txt"), false));
    }

    #[test]
    fn test_negation_cannot_override_builtin() {
        let rules = ExcludeRules::new().with_ignore_contents("!node_modules/\n!debug.log\n");

        assert!(rules.should_exclude(Path::new("node_modules"), true));
        assert!(rules.should_exclude(Path::new("debug.log"), false));
    }

    #[test]
    fn test_missing_ignore_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let rules = ExcludeRules::for_project(dir.path());

        assert_eq!(rules.count(RuleTier::Project), 0);
        assert_eq!(rules.count(RuleTier::Builtin), DEFAULT_EXCLUDES.len());
    }

    #[test]
    fn test_project_ignore_file_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(IGNORE_FILE_NAME), "coverage/\n*.sqlite3\n").unwrap();

        let rules = ExcludeRules::for_project(dir.path());

        assert_eq!(rules.count(RuleTier::Project), 2);
        assert!(rules.should_exclude(Path::new("coverage"), true));
        assert!(rules.should_exclude(Path::new("db/dev.sqlite3"), false));
    }

    #[test]
    fn test_invalid_glob_matches_literally() {
        let rules = ExcludeRules::new().with_patterns(&["[broken"]);

        assert!(rules.should_exclude(Path::new("[broken"), false));
        assert!(!rules.should_exclude(Path::new("broken"), false));
    }
}
