//! Semantic lookup over node projections.
//!
//! The index is exposed behind the [`VectorProvider`] capability set so the
//! retriever stays agnostic of the backing implementation. The default
//! engine is a sparse TF-IDF index; a dense-embedding variant conforming to
//! the same contract is available behind the `dense` feature.

pub mod tfidf;

#[cfg(feature = "dense")]
pub mod dense;

pub use tfidf::TfIdfIndex;

use crate::analyze::language_for_path;
use crate::error::EngineResult;
use crate::types::{Node, NodeData, NodeKind};
use serde::{Deserialize, Serialize};

/// Metadata snapshot stored with each document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One search result, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub meta: DocumentMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorStats {
    pub doc_count: usize,
    pub vocab_size: usize,
}

/// Capability set every vector backend implements.
pub trait VectorProvider: Send + Sync {
    /// Build the index over everything fed in so far. For TF-IDF this is
    /// the batch vocabulary build; afterwards the vocabulary is frozen.
    fn initialize(&mut self) -> EngineResult<()>;

    /// Index (or re-index) one document. Returns false when the content
    /// tokenizes to nothing and the document was skipped.
    fn index_document(&mut self, id: &str, content: &str, meta: DocumentMeta)
    -> EngineResult<bool>;

    /// Top-K cosine search. An uninitialized index returns an empty result,
    /// not an error.
    fn search(&self, text: &str, top_k: usize, threshold: f32) -> EngineResult<Vec<SearchHit>>;

    /// Returns true when the document existed.
    fn remove_document(&mut self, id: &str) -> EngineResult<bool>;

    /// Rebuild from stored documents (e.g. to pick up vocabulary drift).
    fn rebuild(&mut self) -> EngineResult<()>;

    fn stats(&self) -> VectorStats;

    fn dispose(&mut self);
}

/// Short textual representation of a node used for indexing: name, doc
/// text, bare filename, language and kind tags, parameter names. Lowercased
/// and whitespace-separated. Empty projections are not indexed.
pub fn project_node(node: &Node) -> String {
    let mut parts: Vec<String> = Vec::new();

    match &node.data {
        NodeData::File(f) => {
            parts.push(f.relative_path.clone());
            push_bare_filename(&mut parts, &f.relative_path);
            parts.push(f.language.clone());
        }
        NodeData::Function(f) => {
            parts.push(f.name.clone());
            if let Some(doc) = &f.doc {
                parts.push(doc.clone());
            }
            push_bare_filename(&mut parts, &f.file_path);
            parts.push(language_for_path(&f.file_path).to_string());
            parts.extend(f.params.iter().cloned());
        }
        NodeData::Class(c) => {
            parts.push(c.name.clone());
            if let Some(doc) = &c.doc {
                parts.push(doc.clone());
            }
            push_bare_filename(&mut parts, &c.file_path);
            parts.push(language_for_path(&c.file_path).to_string());
        }
        NodeData::Module(m) => {
            parts.push(m.specifier.clone());
        }
    }
    parts.push(node.kind().as_str().to_string());

    parts.join(" ").to_lowercase()
}

fn push_bare_filename(parts: &mut Vec<String>, rel_path: &str) {
    let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
    let bare = basename.rsplit_once('.').map_or(basename, |(stem, _)| stem);
    if !bare.is_empty() {
        parts.push(bare.to_string());
    }
}

/// Metadata snapshot for a node's document.
pub fn document_meta(node: &Node) -> DocumentMeta {
    let language = match &node.data {
        NodeData::File(f) => Some(f.language.clone()),
        NodeData::Function(f) => Some(language_for_path(&f.file_path).to_string()),
        NodeData::Class(c) => Some(language_for_path(&c.file_path).to_string()),
        NodeData::Module(_) => None,
    };
    let (line_start, line_end) = match node.line_span() {
        Some((s, e)) => (Some(s), Some(e)),
        None => (None, None),
    };
    DocumentMeta {
        kind: node.kind(),
        file_path: node.file_path().map(|p| p.to_string()),
        line_start,
        line_end,
        language,
    }
}
