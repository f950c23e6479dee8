//! Static analysis: parse one file into nodes and relations.
//!
//! The analyzer framework is language-agnostic; languages with an AST
//! walker implement [`LanguageAnalyzer`]. Everything else (config files,
//! markdown, unknown extensions) still produces a FileNode so the graph can
//! reason about imports pointing at it. That is not an error.

pub mod typescript;

use crate::error::{EngineError, EngineResult, FileError};
use crate::types::{FileNode, Node, NodeData, NodeId, Relation};
use rayon::prelude::*;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio_util::sync::CancellationToken;

pub use typescript::TypeScriptAnalyzer;

/// Maximum recursion depth for AST traversal to prevent stack overflow.
pub(crate) const MAX_AST_DEPTH: usize = 500;

/// Result of analyzing one file.
///
/// On a parse failure the analysis still carries the FileNode, `error` is
/// set, and any partially extracted nodes/relations have been dropped.
#[derive(Debug, Clone, Default)]
pub struct FileAnalysis {
    pub nodes: Vec<Node>,
    pub relations: Vec<Relation>,
    pub error: Option<String>,
}

/// Result of analyzing a batch of files.
#[derive(Debug, Default)]
pub struct BatchAnalysis {
    pub analyses: Vec<FileAnalysis>,
    pub errors: Vec<FileError>,
}

/// Interface implemented per AST-supported language.
pub trait LanguageAnalyzer: Send {
    /// Language tag this analyzer handles (e.g. `typescript`).
    fn language(&self) -> &'static str;

    /// Extract nodes and relations from one file. The FileNode itself is
    /// appended by the caller; implementations emit symbols and edges only.
    fn analyze(
        &mut self,
        relative_path: &str,
        code: &str,
        file_id: &NodeId,
    ) -> Result<FileAnalysis, String>;
}

/// Map a file extension to a language tag.
pub fn language_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "rs" => "rust",
        "py" | "pyi" => "python",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "lua" => "lua",
        "sh" => "shell",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        "html" => "html",
        "css" | "scss" => "css",
        "sql" => "sql",
        _ => "text",
    }
}

/// Language tag for a relative path.
pub fn language_for_path(rel_path: &str) -> &'static str {
    rel_path
        .rsplit_once('.')
        .map(|(_, ext)| language_for_extension(ext))
        .unwrap_or("text")
}

/// True iff the language tag has an AST analyzer.
pub fn has_ast_support(language: &str) -> bool {
    matches!(language, "typescript" | "javascript")
}

/// Analyze one file on disk: read it, build the FileNode, and run the
/// language analyzer when one exists.
pub fn analyze_path(root: &Path, rel_path: &str) -> EngineResult<FileAnalysis> {
    let abs = root.join(rel_path);
    let bytes = std::fs::read(&abs).map_err(|e| EngineError::FileRead {
        path: abs.clone(),
        source: e,
    })?;

    let meta = std::fs::metadata(&abs).map_err(|e| EngineError::FileRead {
        path: abs.clone(),
        source: e,
    })?;
    let modified_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let language = language_for_path(rel_path);
    let file_id = NodeId::file(rel_path);
    let file_node = Node {
        id: file_id.clone(),
        data: NodeData::File(FileNode {
            path: abs.to_string_lossy().into_owned(),
            relative_path: rel_path.to_string(),
            language: language.to_string(),
            size: meta.len(),
            modified_ms,
        }),
    };

    let mut analysis = match std::str::from_utf8(&bytes) {
        Ok(code) if has_ast_support(language) => {
            let mut analyzer = TypeScriptAnalyzer::for_language(language)
                .map_err(|reason| EngineError::internal(reason))?;
            match analyzer.analyze(rel_path, code, &file_id) {
                Ok(a) => a,
                Err(reason) => {
                    // Partial output from the failed file is dropped atomically.
                    tracing::warn!("parse failure in {rel_path}: {reason}");
                    FileAnalysis {
                        error: Some(reason),
                        ..Default::default()
                    }
                }
            }
        }
        Ok(_) => FileAnalysis::default(),
        Err(_) => FileAnalysis {
            error: Some("invalid UTF-8".to_string()),
            ..Default::default()
        },
    };

    analysis.nodes.insert(0, file_node);
    Ok(analysis)
}

/// Analyze many files in parallel, checking the cancellation token between
/// files. IO failures and parse failures are accumulated, never fatal.
pub fn analyze_batch(
    root: &Path,
    rel_paths: &[String],
    cancel: &CancellationToken,
) -> EngineResult<BatchAnalysis> {
    let results: Vec<(String, EngineResult<FileAnalysis>)> = rel_paths
        .par_iter()
        .map(|rel| {
            if cancel.is_cancelled() {
                return (rel.clone(), Err(EngineError::Cancelled));
            }
            (rel.clone(), analyze_path(root, rel))
        })
        .collect();

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let mut batch = BatchAnalysis::default();
    for (rel, result) in results {
        match result {
            Ok(analysis) => {
                if let Some(reason) = &analysis.error {
                    batch.errors.push(FileError {
                        path: rel.clone().into(),
                        reason: reason.clone(),
                    });
                }
                batch.analyses.push(analysis);
            }
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(err) => batch.errors.push(FileError {
                path: rel.into(),
                reason: err.to_string(),
            }),
        }
    }
    Ok(batch)
}
