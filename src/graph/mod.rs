//! Knowledge graph store: nodes and directed edges with point, neighborhood
//! and pattern queries.
//!
//! Ordered maps keep iteration deterministic, which matters for stable
//! retrieval ordering and byte-stable persistence. Statistics counters are
//! maintained incrementally, never recomputed.

pub mod persist;

use crate::types::{ModuleNode, Node, NodeData, NodeId, NodeKind, Relation, RelationKind, RelationPayload, RelTarget};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A stored directed edge. Multi-edges with identical `(src, kind, dst)`
/// collapse; later payloads win.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub src: NodeId,
    pub dst: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub payload: RelationPayload,
}

impl Edge {
    /// Edge key string used in the persisted format.
    pub fn key_string(&self) -> String {
        format!("{}-{}-{}", self.src, self.kind, self.dst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub src: NodeId,
    pub kind: RelationKind,
    pub dst: NodeId,
}

/// Counters maintained incrementally across ingest/remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub edges_by_kind: BTreeMap<RelationKind, usize>,
}

/// Outcome of one ingest call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub edges_added: usize,
    pub edges_updated: usize,
    pub warnings: Vec<String>,
}

/// Outcome of removing a file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemoveReport {
    pub nodes_removed: usize,
    pub edges_removed: usize,
}

/// In-memory knowledge graph.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeKey, Edge>,
    out: BTreeMap<NodeId, BTreeSet<EdgeKey>>,
    inc: BTreeMap<NodeId, BTreeSet<EdgeKey>>,
    by_file: HashMap<String, BTreeSet<NodeId>>,
    stats: GraphStats,
}

impl PartialEq for KnowledgeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert nodes by id, then add edges. For each relation the source must
    /// already exist (skipped with a warning otherwise); a dangling IMPORTS
    /// destination synthesizes a ModuleNode. Self-loops are dropped.
    pub fn ingest(&mut self, nodes: Vec<Node>, relations: Vec<Relation>) -> IngestReport {
        let mut report = IngestReport::default();

        for node in nodes {
            if self.upsert_node(node) {
                report.nodes_added += 1;
            } else {
                report.nodes_updated += 1;
            }
        }

        for relation in relations {
            self.add_relation(relation, &mut report);
        }
        report
    }

    fn upsert_node(&mut self, node: Node) -> bool {
        if let Some(path) = node.file_path() {
            self.by_file
                .entry(path.to_string())
                .or_default()
                .insert(node.id.clone());
        }
        let kind = node.kind();
        match self.nodes.insert(node.id.clone(), node) {
            Some(old) => {
                if old.kind() != kind {
                    *self.stats.nodes_by_kind.entry(old.kind()).or_default() -= 1;
                    *self.stats.nodes_by_kind.entry(kind).or_default() += 1;
                }
                false
            }
            None => {
                *self.stats.nodes_by_kind.entry(kind).or_default() += 1;
                true
            }
        }
    }

    fn add_relation(&mut self, relation: Relation, report: &mut IngestReport) {
        if !self.nodes.contains_key(&relation.src) {
            let warning = format!(
                "dropping {} edge from unknown source {}",
                relation.kind, relation.src
            );
            tracing::warn!("{warning}");
            report.warnings.push(warning);
            return;
        }

        let dst = self.resolve_target(&relation);
        if dst == relation.src {
            let warning = format!("dropping self-loop {} edge at {}", relation.kind, dst);
            tracing::warn!("{warning}");
            report.warnings.push(warning);
            return;
        }

        // IMPORTS destinations always exist: synthesize the module on demand.
        if relation.kind == RelationKind::Imports && !self.nodes.contains_key(&dst) {
            let module = ModuleNode::from_specifier(dst.as_str());
            self.upsert_node(Node {
                id: dst.clone(),
                data: NodeData::Module(module),
            });
            report.nodes_added += 1;
        }

        let key = EdgeKey {
            src: relation.src.clone(),
            kind: relation.kind,
            dst: dst.clone(),
        };
        let edge = Edge {
            kind: relation.kind,
            src: relation.src,
            dst,
            file_path: relation.file_path,
            line: relation.line,
            payload: relation.payload,
        };

        if let Some(existing) = self.edges.get_mut(&key) {
            // Duplicate edge: update payload in place.
            *existing = edge;
            report.edges_updated += 1;
            return;
        }

        self.out.entry(key.src.clone()).or_default().insert(key.clone());
        self.inc.entry(key.dst.clone()).or_default().insert(key.clone());
        *self.stats.edges_by_kind.entry(key.kind).or_default() += 1;
        self.edges.insert(key, edge);
        report.edges_added += 1;
    }

    /// Resolve a symbolic destination name against declarations in the same
    /// file as the source. Unresolvable names stay symbolic.
    fn resolve_target(&self, relation: &Relation) -> NodeId {
        match &relation.dst {
            RelTarget::Id(id) => id.clone(),
            RelTarget::Name(name) => {
                if relation.kind == RelationKind::Imports {
                    return NodeId::module(name);
                }
                if let Some(file) = relation
                    .file_path
                    .as_deref()
                    .or_else(|| self.nodes.get(&relation.src).and_then(|n| n.file_path()))
                {
                    for candidate in [
                        NodeId::function(file, name),
                        NodeId::class(file, name),
                    ] {
                        if self.nodes.contains_key(&candidate) {
                            return candidate;
                        }
                    }
                }
                NodeId::raw(name)
            }
        }
    }

    /// Atomically drop every node of a file and every edge touching any of
    /// those nodes. Synthesized modules are left in place.
    pub fn remove_file(&mut self, relative_path: &str) -> RemoveReport {
        let mut report = RemoveReport::default();
        let Some(ids) = self.by_file.remove(relative_path) else {
            return report;
        };

        for id in &ids {
            let keys: BTreeSet<EdgeKey> = self
                .out
                .remove(id)
                .unwrap_or_default()
                .into_iter()
                .chain(self.inc.remove(id).unwrap_or_default())
                .collect();
            for key in keys {
                if let Some(edge) = self.edges.remove(&key) {
                    *self.stats.edges_by_kind.entry(edge.kind).or_default() -= 1;
                    report.edges_removed += 1;
                    if let Some(set) = self.out.get_mut(&key.src) {
                        set.remove(&key);
                    }
                    if let Some(set) = self.inc.get_mut(&key.dst) {
                        set.remove(&key);
                    }
                }
            }
            if let Some(node) = self.nodes.remove(id) {
                *self.stats.nodes_by_kind.entry(node.kind()).or_default() -= 1;
                report.nodes_removed += 1;
            }
        }
        report
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Ids of every node belonging to a file, in stable order.
    pub fn nodes_for_file(&self, relative_path: &str) -> Vec<NodeId> {
        self.by_file
            .get(relative_path)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Undirected one-hop neighborhood, deduplicated, in stable id order.
    pub fn neighbors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut result = BTreeSet::new();
        if let Some(keys) = self.out.get(id) {
            for key in keys {
                result.insert(key.dst.clone());
            }
        }
        if let Some(keys) = self.inc.get(id) {
            for key in keys {
                result.insert(key.src.clone());
            }
        }
        result.remove(id);
        result.into_iter().collect()
    }

    pub fn out_edges(&self, id: &NodeId, kinds: Option<&[RelationKind]>) -> Vec<&Edge> {
        self.edge_set(&self.out, id, kinds)
    }

    pub fn in_edges(&self, id: &NodeId, kinds: Option<&[RelationKind]>) -> Vec<&Edge> {
        self.edge_set(&self.inc, id, kinds)
    }

    fn edge_set(
        &self,
        index: &BTreeMap<NodeId, BTreeSet<EdgeKey>>,
        id: &NodeId,
        kinds: Option<&[RelationKind]>,
    ) -> Vec<&Edge> {
        index
            .get(id)
            .into_iter()
            .flatten()
            .filter(|key| kinds.is_none_or(|ks| ks.contains(&key.kind)))
            .filter_map(|key| self.edges.get(key))
            .collect()
    }

    /// Case-insensitive substring match over node display names.
    pub fn find_by_name(&self, substring: &str) -> Vec<&Node> {
        let needle = substring.to_lowercase();
        self.nodes
            .values()
            .filter(|n| n.name().to_lowercase().contains(&needle))
            .collect()
    }

    pub fn find_by_kind(&self, kind: NodeKind) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.kind() == kind).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn file_count(&self) -> usize {
        self.stats
            .nodes_by_kind
            .get(&NodeKind::File)
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }

    /// Rebuild a graph from persisted parts, restoring indexes and counters.
    pub(crate) fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.upsert_node(node);
        }
        for edge in edges {
            let key = EdgeKey {
                src: edge.src.clone(),
                kind: edge.kind,
                dst: edge.dst.clone(),
            };
            if graph.edges.contains_key(&key) {
                continue;
            }
            graph.out.entry(key.src.clone()).or_default().insert(key.clone());
            graph.inc.entry(key.dst.clone()).or_default().insert(key.clone());
            *graph.stats.edges_by_kind.entry(key.kind).or_default() += 1;
            graph.edges.insert(key, edge);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileNode, FunctionNode, RelationPayload};

    fn file_node(rel: &str) -> Node {
        Node {
            id: NodeId::file(rel),
            data: NodeData::File(FileNode {
                path: format!("/proj/{rel}"),
                relative_path: rel.to_string(),
                language: "typescript".to_string(),
                size: 10,
                modified_ms: 0,
            }),
        }
    }

    fn fn_node(rel: &str, name: &str) -> Node {
        Node {
            id: NodeId::function(rel, name),
            data: NodeData::Function(FunctionNode {
                name: name.to_string(),
                file_path: rel.to_string(),
                class_name: None,
                params: vec![],
                line_start: 1,
                line_end: 2,
                exported: false,
                is_async: false,
                visibility: None,
                doc: None,
            }),
        }
    }

    fn contains(rel: &str, name: &str) -> Relation {
        Relation::new(
            RelationKind::Contains,
            NodeId::file(rel),
            RelTarget::Id(NodeId::function(rel, name)),
        )
    }

    #[test]
    fn test_ingest_counts_and_stats() {
        let mut graph = KnowledgeGraph::new();
        let report = graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "foo")],
            vec![contains("a.ts", "foo")],
        );

        assert_eq!(report.nodes_added, 2);
        assert_eq!(report.edges_added, 1);
        assert_eq!(graph.stats().nodes_by_kind[&NodeKind::File], 1);
        assert_eq!(graph.stats().nodes_by_kind[&NodeKind::Function], 1);
        assert_eq!(graph.stats().edges_by_kind[&RelationKind::Contains], 1);
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let mut graph = KnowledgeGraph::new();
        let nodes = vec![file_node("a.ts"), fn_node("a.ts", "foo")];
        let rels = vec![contains("a.ts", "foo")];

        graph.ingest(nodes.clone(), rels.clone());
        let first: Vec<Node> = graph.nodes().cloned().collect();
        let first_edges: Vec<Edge> = graph.edges().cloned().collect();

        graph.ingest(nodes, rels);
        let second: Vec<Node> = graph.nodes().cloned().collect();
        let second_edges: Vec<Edge> = graph.edges().cloned().collect();

        assert_eq!(first, second);
        assert_eq!(first_edges, second_edges);
        assert_eq!(graph.stats().edges_by_kind[&RelationKind::Contains], 1);
    }

    #[test]
    fn test_unknown_source_is_skipped_with_warning() {
        let mut graph = KnowledgeGraph::new();
        let report = graph.ingest(vec![], vec![contains("a.ts", "foo")]);
        assert_eq!(report.edges_added, 0);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_imports_synthesize_module() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("b.ts")],
            vec![Relation::new(
                RelationKind::Imports,
                NodeId::file("b.ts"),
                RelTarget::Name("./lib".to_string()),
            )
            .with_payload(RelationPayload::Import {
                imported_names: vec!["x".to_string()],
                default: false,
            })],
        );

        let module = graph.node(&NodeId::module("./lib")).expect("synthesized");
        match &module.data {
            NodeData::Module(m) => assert!(!m.external),
            other => panic!("unexpected node: {other:?}"),
        }
        assert_eq!(graph.stats().edges_by_kind[&RelationKind::Imports], 1);
    }

    #[test]
    fn test_symbolic_call_resolves_within_file() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "foo"), fn_node("a.ts", "bar")],
            vec![Relation::new(
                RelationKind::Calls,
                NodeId::function("a.ts", "foo"),
                RelTarget::Name("bar".to_string()),
            )
            .at("a.ts", 1)],
        );

        let out = graph.out_edges(&NodeId::function("a.ts", "foo"), None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dst, NodeId::function("a.ts", "bar"));
    }

    #[test]
    fn test_unresolved_call_stays_symbolic() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "foo")],
            vec![Relation::new(
                RelationKind::Calls,
                NodeId::function("a.ts", "foo"),
                RelTarget::Name("bar".to_string()),
            )
            .at("a.ts", 1)],
        );

        let out = graph.out_edges(&NodeId::function("a.ts", "foo"), None);
        assert_eq!(out[0].dst.as_str(), "bar");
        assert!(!graph.has_node(&NodeId::raw("bar")));
    }

    #[test]
    fn test_remove_file_is_atomic() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "foo"), fn_node("a.ts", "bar")],
            vec![
                contains("a.ts", "foo"),
                contains("a.ts", "bar"),
                Relation::new(
                    RelationKind::Calls,
                    NodeId::function("a.ts", "foo"),
                    RelTarget::Name("bar".to_string()),
                )
                .at("a.ts", 1),
            ],
        );

        let report = graph.remove_file("a.ts");
        assert_eq!(report.nodes_removed, 3);
        assert_eq!(report.edges_removed, 3);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.nodes().next().is_none());
        assert_eq!(
            graph.stats().nodes_by_kind.values().sum::<usize>(),
            0
        );
    }

    #[test]
    fn test_remove_file_keeps_synthesized_modules() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("b.ts")],
            vec![Relation::new(
                RelationKind::Imports,
                NodeId::file("b.ts"),
                RelTarget::Name("./lib".to_string()),
            )],
        );

        graph.remove_file("b.ts");
        assert!(!graph.has_node(&NodeId::file("b.ts")));
        // Synthesized externals are not cascade-deleted.
        assert!(graph.has_node(&NodeId::module("./lib")));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_remove_never_ingested_file_is_noop() {
        let mut graph = KnowledgeGraph::new();
        let report = graph.remove_file("ghost.ts");
        assert_eq!(report, RemoveReport::default());
    }

    #[test]
    fn test_self_loops_forbidden() {
        let mut graph = KnowledgeGraph::new();
        let report = graph.ingest(
            vec![file_node("a.ts")],
            vec![Relation::new(
                RelationKind::References,
                NodeId::file("a.ts"),
                RelTarget::Id(NodeId::file("a.ts")),
            )],
        );
        assert_eq!(report.edges_added, 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_duplicate_edges_collapse_and_update_payload() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "foo"), fn_node("a.ts", "bar")],
            vec![],
        );

        let call = |line| {
            Relation::new(
                RelationKind::Calls,
                NodeId::function("a.ts", "foo"),
                RelTarget::Name("bar".to_string()),
            )
            .at("a.ts", line)
        };
        let r1 = graph.ingest(vec![], vec![call(1)]);
        let r2 = graph.ingest(vec![], vec![call(9)]);

        assert_eq!(r1.edges_added, 1);
        assert_eq!(r2.edges_added, 0);
        assert_eq!(r2.edges_updated, 1);
        let out = graph.out_edges(&NodeId::function("a.ts", "foo"), None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line, Some(9));
    }

    #[test]
    fn test_neighbors_undirected_and_sorted() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "foo"), fn_node("a.ts", "bar")],
            vec![
                contains("a.ts", "foo"),
                Relation::new(
                    RelationKind::Calls,
                    NodeId::function("a.ts", "bar"),
                    RelTarget::Id(NodeId::function("a.ts", "foo")),
                ),
            ],
        );

        let neighbors = graph.neighbors(&NodeId::function("a.ts", "foo"));
        assert_eq!(
            neighbors,
            vec![NodeId::file("a.ts"), NodeId::function("a.ts", "bar")]
        );
    }

    #[test]
    fn test_edge_kind_filter() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "foo")],
            vec![
                contains("a.ts", "foo"),
                Relation::new(
                    RelationKind::Imports,
                    NodeId::file("a.ts"),
                    RelTarget::Name("react".to_string()),
                ),
            ],
        );

        let id = NodeId::file("a.ts");
        assert_eq!(graph.out_edges(&id, None).len(), 2);
        assert_eq!(
            graph
                .out_edges(&id, Some(&[RelationKind::Imports]))
                .len(),
            1
        );
    }

    #[test]
    fn test_find_by_name_and_kind() {
        let mut graph = KnowledgeGraph::new();
        graph.ingest(
            vec![file_node("a.ts"), fn_node("a.ts", "parseConfig")],
            vec![],
        );

        assert_eq!(graph.find_by_name("parseconfig").len(), 1);
        assert_eq!(graph.find_by_name("parse").len(), 1);
        assert_eq!(graph.find_by_name("nothing").len(), 0);
        assert_eq!(graph.find_by_kind(NodeKind::Function).len(), 1);
        assert_eq!(graph.find_by_kind(NodeKind::Class).len(), 0);
    }
}
