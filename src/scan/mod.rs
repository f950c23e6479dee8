//! Project scanner: enumerate source files worth analyzing.
//!
//! Directory traversal is built on the `ignore` crate with support for:
//! - .gitignore rules (optional)
//! - a per-project `scanignore` file (optional, higher precedence)
//! - a builtin always-ignore set (state directory, package/virtualenv dirs)
//! - include/exclude globs from configuration
//!
//! Scans are deterministic: the result is sorted lexicographically by
//! relative path, and the `max_files` cutoff is applied over a sorted
//! traversal.

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::overrides::{Override, OverrideBuilder};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Directory names never descended into, regardless of ignore files.
const ALWAYS_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    "vendor",
    ".idea",
    ".vscode",
];

/// Extensions considered text worth analyzing or indexing.
const TEXT_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs", "rs", "py", "pyi", "go", "java", "kt",
    "rb", "php", "c", "h", "cpp", "hpp", "cc", "cs", "swift", "lua", "sh", "json", "toml", "yaml",
    "yml", "md", "txt", "html", "css", "scss", "xml", "sql",
];

/// Extensionless basenames that are still worth scanning.
const KNOWN_CONFIG_BASENAMES: &[&str] = &[
    "makefile",
    "dockerfile",
    "jenkinsfile",
    "gemfile",
    "rakefile",
    "procfile",
    "brewfile",
    "vagrantfile",
];

/// Result of one scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Relative paths, forward slashes, sorted lexicographically.
    pub files: Vec<String>,
    /// Files seen but excluded (size cap, unknown extension, unreadable).
    pub skipped: usize,
    /// Total file entries visited by the walker.
    pub total_scanned: usize,
}

/// Walks a project root and enumerates candidate files.
pub struct Scanner {
    root: PathBuf,
    state_dir: String,
    overrides: Override,
    /// Matcher for the project's `scanignore` file, rooted at the project
    /// root so its globs behave like a top-level ignore file.
    scan_ignore: Option<Gitignore>,
    respect_vcs_ignore: bool,
    max_files: usize,
    max_file_bytes: u64,
}

impl Scanner {
    /// Build a scanner for a project root. Invalid globs in the configured
    /// include/exclude patterns are a startup error.
    pub fn new(root: &Path, settings: &Settings) -> EngineResult<Self> {
        let mut builder = OverrideBuilder::new(root);
        for pattern in &settings.scan.include_patterns {
            builder.add(pattern).map_err(|e| {
                EngineError::config(format!("include pattern '{pattern}' is not a valid glob: {e}"))
            })?;
        }
        for pattern in &settings.scan.exclude_patterns {
            builder.add(&format!("!{pattern}")).map_err(|e| {
                EngineError::config(format!("exclude pattern '{pattern}' is not a valid glob: {e}"))
            })?;
        }
        let overrides = builder
            .build()
            .map_err(|e| EngineError::config(format!("failed to compile scan globs: {e}")))?;

        let scan_ignore_path = settings.scan_ignore_path(root);
        let scan_ignore = if settings.scan.respect_scan_ignore && scan_ignore_path.is_file() {
            let mut gitignore = GitignoreBuilder::new(root);
            if let Some(err) = gitignore.add(&scan_ignore_path) {
                tracing::warn!("scanignore at {} has problems: {err}", scan_ignore_path.display());
            }
            match gitignore.build() {
                Ok(matcher) => Some(matcher),
                Err(err) => {
                    tracing::warn!("failed to compile scanignore: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            root: root.to_path_buf(),
            state_dir: settings.state_dir.clone(),
            overrides,
            scan_ignore,
            respect_vcs_ignore: settings.scan.respect_vcs_ignore,
            max_files: settings.scan.max_files,
            max_file_bytes: settings.scan.max_file_bytes,
        })
    }

    /// Enumerate candidate files under the root.
    ///
    /// Unreadable paths are skipped, never fatal. Checks the cancellation
    /// token between directory entries.
    pub fn scan(&self, cancel: &CancellationToken) -> EngineResult<ScanResult> {
        let mut files = Vec::new();
        let mut skipped = 0usize;
        let mut total_scanned = 0usize;

        if self.max_files == 0 {
            return Ok(ScanResult {
                files,
                skipped,
                total_scanned,
            });
        }

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(self.respect_vcs_ignore)
            .git_global(self.respect_vcs_ignore)
            .git_exclude(self.respect_vcs_ignore)
            .require_git(false)
            .follow_links(false)
            .sort_by_file_path(|a, b| a.cmp(b));

        let state_dir = self.state_dir.clone();
        builder.filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            !(name == state_dir.as_str() || ALWAYS_IGNORE_DIRS.contains(&name.as_ref()))
        });

        for entry in builder.build() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::debug!("scan entry error: {err}");
                    skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            total_scanned += 1;

            let path = entry.path();
            // The scan-ignore file takes precedence over vcs ignore rules.
            if self
                .scan_ignore
                .as_ref()
                .is_some_and(|gi| gi.matched_path_or_any_parents(path, false).is_ignore())
            {
                skipped += 1;
                continue;
            }
            if !self.is_included(path) || !is_text_candidate(path) {
                skipped += 1;
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() > self.max_file_bytes => {
                    skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!("stat failed for {}: {err}", path.display());
                    skipped += 1;
                    continue;
                }
            }

            if let Some(rel) = relative_path(&self.root, path) {
                files.push(rel);
                if files.len() >= self.max_files {
                    break;
                }
            } else {
                skipped += 1;
            }
        }

        files.sort_unstable();
        Ok(ScanResult {
            files,
            skipped,
            total_scanned,
        })
    }
}

impl Scanner {
    /// Include globs are matched here rather than inside the walker so that
    /// excluded files still show up in the skip counters. Extensionless
    /// known-config basenames bypass the glob filter.
    fn is_included(&self, path: &Path) -> bool {
        match self.overrides.matched(path, false) {
            ignore::Match::Whitelist(_) => true,
            ignore::Match::Ignore(_) => false,
            ignore::Match::None => path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| KNOWN_CONFIG_BASENAMES.contains(&n.to_lowercase().as_str())),
        }
    }
}

/// True iff the path's extension is in the text allowlist, or its
/// extensionless basename is a known config file.
fn is_text_candidate(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| KNOWN_CONFIG_BASENAMES.contains(&n.to_lowercase().as_str())),
    }
}

/// Relative path with forward slashes, for stable node ids across platforms.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let s = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (!s.is_empty()).then_some(s)
}
