//! Incremental update orchestration.
//!
//! Reacts to file-change notifications by replaying the analyze -> ingest ->
//! index pipeline for one file at a time. The caller holds the exclusive
//! write guard over the graph + index pair; within one change event the new
//! nodes and relations become visible to readers atomically.

use crate::analyze;
use crate::error::{EngineError, EngineResult};
use crate::graph::KnowledgeGraph;
use crate::types::ChangeKind;
use crate::vector::{VectorProvider, document_meta, project_node};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// Content hashes of analyzed files, used to skip no-op modifications.
pub type FileHashes = HashMap<String, [u8; 32]>;

/// What one applied change did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub nodes_removed: usize,
    pub edges_removed: usize,
    pub nodes_added: usize,
    pub edges_added: usize,
    /// True when a `modified` event carried identical bytes and was skipped.
    pub skipped_unchanged: bool,
    /// Parse failure recorded for the file, if any.
    pub parse_error: Option<String>,
}

/// Apply one file-change event to the graph + index pair.
///
/// The vocabulary is never rebuilt here; new documents are vectorized
/// against the frozen vocabulary.
pub fn apply_change(
    root: &Path,
    relative_path: &str,
    kind: ChangeKind,
    graph: &mut KnowledgeGraph,
    vectors: &mut dyn VectorProvider,
    hashes: &mut FileHashes,
) -> EngineResult<UpdateOutcome> {
    match kind {
        ChangeKind::Deleted => {
            let mut outcome = remove_file(relative_path, graph, vectors)?;
            hashes.remove(relative_path);
            outcome.skipped_unchanged = false;
            Ok(outcome)
        }
        ChangeKind::Created | ChangeKind::Modified => {
            let abs = root.join(relative_path);
            let bytes = std::fs::read(&abs).map_err(|e| EngineError::FileRead {
                path: abs,
                source: e,
            })?;
            let hash: [u8; 32] = Sha256::digest(&bytes).into();

            if kind == ChangeKind::Modified && hashes.get(relative_path) == Some(&hash) {
                tracing::debug!("{relative_path} unchanged, skipping re-analysis");
                return Ok(UpdateOutcome {
                    skipped_unchanged: true,
                    ..Default::default()
                });
            }

            let mut outcome = if kind == ChangeKind::Modified {
                remove_file(relative_path, graph, vectors)?
            } else {
                UpdateOutcome::default()
            };

            let analysis = analyze::analyze_path(root, relative_path)?;
            outcome.parse_error = analysis.error.clone();

            let documents: Vec<_> = analysis
                .nodes
                .iter()
                .map(|node| {
                    (
                        node.id.as_str().to_string(),
                        project_node(node),
                        document_meta(node),
                    )
                })
                .collect();

            let report = graph.ingest(analysis.nodes, analysis.relations);
            outcome.nodes_added = report.nodes_added;
            outcome.edges_added = report.edges_added;

            for (id, projection, meta) in documents {
                vectors.index_document(&id, &projection, meta)?;
            }

            hashes.insert(relative_path.to_string(), hash);
            Ok(outcome)
        }
    }
}

fn remove_file(
    relative_path: &str,
    graph: &mut KnowledgeGraph,
    vectors: &mut dyn VectorProvider,
) -> EngineResult<UpdateOutcome> {
    let removed_ids = graph.nodes_for_file(relative_path);
    let report = graph.remove_file(relative_path);
    for id in &removed_ids {
        vectors.remove_document(id.as_str())?;
    }
    Ok(UpdateOutcome {
        nodes_removed: report.nodes_removed,
        edges_removed: report.edges_removed,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;
    use crate::vector::TfIdfIndex;
    use std::fs;
    use tempfile::TempDir;

    fn apply(
        temp: &TempDir,
        rel: &str,
        kind: ChangeKind,
        graph: &mut KnowledgeGraph,
        vectors: &mut TfIdfIndex,
        hashes: &mut FileHashes,
    ) -> UpdateOutcome {
        apply_change(temp.path(), rel, kind, graph, vectors, hashes).unwrap()
    }

    #[test]
    fn test_create_then_delete() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.ts"), "export function foo(){ bar(); }").unwrap();

        let mut graph = KnowledgeGraph::new();
        let mut vectors = TfIdfIndex::new(1);
        let mut hashes = FileHashes::new();

        let outcome = apply(
            &temp,
            "a.ts",
            ChangeKind::Created,
            &mut graph,
            &mut vectors,
            &mut hashes,
        );
        assert_eq!(outcome.nodes_added, 2); // file + foo
        assert!(graph.has_node(&NodeId::function("a.ts", "foo")));
        assert_eq!(vectors.stats().doc_count, 2);

        let outcome = apply(
            &temp,
            "a.ts",
            ChangeKind::Deleted,
            &mut graph,
            &mut vectors,
            &mut hashes,
        );
        assert_eq!(outcome.nodes_removed, 2);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(vectors.stats().doc_count, 0);
    }

    #[test]
    fn test_unchanged_modification_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.ts"), "export function foo(){}").unwrap();

        let mut graph = KnowledgeGraph::new();
        let mut vectors = TfIdfIndex::new(1);
        let mut hashes = FileHashes::new();

        apply(&temp, "a.ts", ChangeKind::Created, &mut graph, &mut vectors, &mut hashes);
        let outcome = apply(
            &temp,
            "a.ts",
            ChangeKind::Modified,
            &mut graph,
            &mut vectors,
            &mut hashes,
        );
        assert!(outcome.skipped_unchanged);
        assert_eq!(outcome.nodes_added, 0);
    }

    #[test]
    fn test_modification_replaces_file_nodes() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.ts"), "export function foo(){}").unwrap();

        let mut graph = KnowledgeGraph::new();
        let mut vectors = TfIdfIndex::new(1);
        let mut hashes = FileHashes::new();

        apply(&temp, "a.ts", ChangeKind::Created, &mut graph, &mut vectors, &mut hashes);
        fs::write(temp.path().join("a.ts"), "export function renamed(){}").unwrap();
        let outcome = apply(
            &temp,
            "a.ts",
            ChangeKind::Modified,
            &mut graph,
            &mut vectors,
            &mut hashes,
        );

        assert!(!outcome.skipped_unchanged);
        assert!(!graph.has_node(&NodeId::function("a.ts", "foo")));
        assert!(graph.has_node(&NodeId::function("a.ts", "renamed")));
    }

    #[test]
    fn test_delete_unknown_file_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut graph = KnowledgeGraph::new();
        let mut vectors = TfIdfIndex::new(1);
        let mut hashes = FileHashes::new();

        let outcome = apply(
            &temp,
            "ghost.ts",
            ChangeKind::Deleted,
            &mut graph,
            &mut vectors,
            &mut hashes,
        );
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[test]
    fn test_missing_file_on_create_is_io_error() {
        let temp = TempDir::new().unwrap();
        let mut graph = KnowledgeGraph::new();
        let mut vectors = TfIdfIndex::new(1);
        let mut hashes = FileHashes::new();

        let err = apply_change(
            temp.path(),
            "missing.ts",
            ChangeKind::Created,
            &mut graph,
            &mut vectors,
            &mut hashes,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::FileRead { .. }));
    }
}
