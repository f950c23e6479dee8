//! On-disk graph persistence.
//!
//! The graph is written as a single JSON document at
//! `<root>/<state-dir>/context_graph.json`. Writes are atomic (temp file
//! then rename). Loading is best-effort: any failure logs a warning and the
//! engine starts with an empty graph. Unknown fields in the file are
//! tolerated; every field we read is written back.

use crate::error::{EngineError, EngineResult};
use crate::graph::{Edge, KnowledgeGraph};
use crate::types::{Node, NodeId, NodeKind, RelationKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Schema version of the persisted graph file.
pub const GRAPH_FILE_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphFile {
    pub metadata: GraphMetadata,
    pub graph: GraphDump,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub project_dir: String,
    /// ISO 8601 timestamp of the last save.
    pub last_updated: String,
    pub version: String,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub file_count: usize,
    /// Milliseconds spent in the last full analysis.
    pub analysis_time: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphDump {
    pub nodes: Vec<NodeEntry>,
    pub edges: Vec<EdgeEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeEntry {
    pub key: NodeId,
    pub attributes: NodeAttributes,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeAttributes {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub data: Node,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub key: String,
    pub source: NodeId,
    pub target: NodeId,
    pub attributes: EdgeAttributes,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeAttributes {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub data: Edge,
}

/// Persists one project's graph file.
pub struct GraphPersistence {
    path: PathBuf,
    project_dir: String,
}

impl GraphPersistence {
    pub fn new(path: PathBuf, project_dir: &Path) -> Self {
        Self {
            path,
            project_dir: project_dir.to_string_lossy().into_owned(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and atomically write the graph.
    ///
    /// A failed save never rolls back in-memory state; it is treated as a
    /// cache miss on the next load.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(&self, graph: &KnowledgeGraph, analysis_time_ms: i64) -> EngineResult<()> {
        let file = GraphFile {
            metadata: GraphMetadata {
                project_dir: self.project_dir.clone(),
                last_updated: chrono::Utc::now().to_rfc3339(),
                version: GRAPH_FILE_VERSION.to_string(),
                total_nodes: graph.node_count(),
                total_edges: graph.edge_count(),
                file_count: graph.file_count(),
                analysis_time: analysis_time_ms,
            },
            graph: GraphDump {
                nodes: graph
                    .nodes()
                    .map(|node| NodeEntry {
                        key: node.id.clone(),
                        attributes: NodeAttributes {
                            kind: node.kind(),
                            data: node.clone(),
                        },
                    })
                    .collect(),
                edges: graph
                    .edges()
                    .map(|edge| EdgeEntry {
                        key: edge.key_string(),
                        source: edge.src.clone(),
                        target: edge.dst.clone(),
                        attributes: EdgeAttributes {
                            kind: edge.kind,
                            data: edge.clone(),
                        },
                    })
                    .collect(),
            },
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| EngineError::internal(format!("graph serialization failed: {e}")))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| EngineError::FileWrite {
            path: temp_path.clone(),
            source: e,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| EngineError::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Best-effort load. Returns `None` (and logs) on any failure so the
    /// caller starts from an empty graph.
    pub fn load(&self) -> Option<KnowledgeGraph> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("failed to read {}: {e}", self.path.display());
                return None;
            }
        };

        let file: GraphFile = match serde_json::from_slice(&bytes) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(
                    "discarding unreadable graph file {}: {e}",
                    self.path.display()
                );
                return None;
            }
        };

        let nodes = file
            .graph
            .nodes
            .into_iter()
            .map(|entry| entry.attributes.data)
            .collect();
        let edges = file
            .graph
            .edges
            .into_iter()
            .map(|entry| entry.attributes.data)
            .collect();
        Some(KnowledgeGraph::from_parts(nodes, edges))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
