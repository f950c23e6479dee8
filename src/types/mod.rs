//! Core entity and relation types for the knowledge graph.
//!
//! Every code entity is addressed by a deterministic [`NodeId`] derived from
//! its relative path, kind, and qualified name. Re-analyzing unchanged source
//! must produce bit-identical ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of node kinds stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Function,
    Class,
    Module,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Function => "function",
            NodeKind::Class => "class",
            NodeKind::Module => "module",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of directed edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationKind {
    Imports,
    Calls,
    Contains,
    References,
    Implements,
    Instantiates,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Imports => "IMPORTS",
            RelationKind::Calls => "CALLS",
            RelationKind::Contains => "CONTAINS",
            RelationKind::References => "REFERENCES",
            RelationKind::Implements => "IMPLEMENTS",
            RelationKind::Instantiates => "INSTANTIATES",
        }
    }

    pub const ALL: [RelationKind; 6] = [
        RelationKind::Imports,
        RelationKind::Calls,
        RelationKind::Contains,
        RelationKind::References,
        RelationKind::Implements,
        RelationKind::Instantiates,
    ];
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared visibility of a function or method, where the language has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

/// How a call site invokes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStyle {
    Direct,
    Method,
    Constructor,
}

/// What kind of symbol a REFERENCES edge points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Identifier,
    Property,
    Type,
    Variable,
}

/// Deterministic node identifier.
///
/// Formats:
/// - `file:<rel-path>`
/// - `function:<rel-path>:<name>`
/// - `method:<rel-path>:<class>:<name>`
/// - `class:<rel-path>:<name>`
/// - module specifier verbatim (e.g. `./lib`, `react`)
///
/// When multiple declarations in one file share a name, `#N` is appended in
/// source order (first occurrence unsuffixed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Box<str>);

impl NodeId {
    pub fn file(rel_path: &str) -> Self {
        Self(format!("file:{rel_path}").into())
    }

    pub fn function(rel_path: &str, name: &str) -> Self {
        Self(format!("function:{rel_path}:{name}").into())
    }

    pub fn method(rel_path: &str, class: &str, name: &str) -> Self {
        Self(format!("method:{rel_path}:{class}:{name}").into())
    }

    pub fn class(rel_path: &str, name: &str) -> Self {
        Self(format!("class:{rel_path}:{name}").into())
    }

    /// A module node id is the specifier exactly as written in source.
    pub fn module(specifier: &str) -> Self {
        Self(specifier.into())
    }

    /// An id that is just a symbolic name (unresolved edge target).
    pub fn raw(s: &str) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::raw(s)
    }
}

/// A node record: its id plus kind-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub data: NodeData,
}

/// Kind-specific node payload. Attribute access is statically typed per
/// variant; there is no open attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeData {
    File(FileNode),
    Function(FunctionNode),
    Class(ClassNode),
    Module(ModuleNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::File(_) => NodeKind::File,
            NodeData::Function(_) => NodeKind::Function,
            NodeData::Class(_) => NodeKind::Class,
            NodeData::Module(_) => NodeKind::Module,
        }
    }

    /// Display name used for symbolic resolution and projections.
    pub fn name(&self) -> &str {
        match &self.data {
            NodeData::File(f) => &f.relative_path,
            NodeData::Function(f) => &f.name,
            NodeData::Class(c) => &c.name,
            NodeData::Module(m) => &m.specifier,
        }
    }

    /// Relative path of the file this node belongs to, if any.
    /// Module nodes are not file-bound.
    pub fn file_path(&self) -> Option<&str> {
        match &self.data {
            NodeData::File(f) => Some(&f.relative_path),
            NodeData::Function(f) => Some(&f.file_path),
            NodeData::Class(c) => Some(&c.file_path),
            NodeData::Module(_) => None,
        }
    }

    pub fn line_span(&self) -> Option<(u32, u32)> {
        match &self.data {
            NodeData::Function(f) => Some((f.line_start, f.line_end)),
            NodeData::Class(c) => Some((c.line_start, c.line_end)),
            _ => None,
        }
    }
}

/// One scanned source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    /// Absolute path on disk.
    pub path: String,
    /// Path relative to the project root, forward slashes.
    pub relative_path: String,
    /// Language tag (e.g. `typescript`, `rust`, `text`).
    pub language: String,
    pub size: u64,
    /// Last-modified instant, milliseconds since the epoch.
    pub modified_ms: i64,
}

/// A function or method declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: String,
    pub file_path: String,
    /// Set iff this is a method; names the declaring class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub params: Vec<String>,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Leading doc comment, when the parser found one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl FunctionNode {
    pub fn is_method(&self) -> bool {
        self.class_name.is_some()
    }
}

/// A class declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassNode {
    pub name: String,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(default)]
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// An imported module, synthesized on demand when an IMPORTS edge would
/// otherwise dangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleNode {
    /// The specifier exactly as written in source.
    pub specifier: String,
    /// True iff the specifier does not start with `.` or `/`.
    pub external: bool,
}

impl ModuleNode {
    pub fn from_specifier(specifier: &str) -> Self {
        let external = !(specifier.starts_with('.') || specifier.starts_with('/'));
        Self {
            specifier: specifier.to_string(),
            external,
        }
    }
}

/// Destination of a relation: a resolved node id, or a symbolic name that
/// the graph resolves at ingest time (and keeps symbolic if it cannot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelTarget {
    Id(NodeId),
    Name(String),
}

impl RelTarget {
    pub fn as_str(&self) -> &str {
        match self {
            RelTarget::Id(id) => id.as_str(),
            RelTarget::Name(n) => n,
        }
    }
}

/// Kind-specific relation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationPayload {
    Import {
        imported_names: Vec<String>,
        default: bool,
    },
    Call {
        style: CallStyle,
    },
    Reference {
        ref_kind: RefKind,
    },
    None {},
}

impl Default for RelationPayload {
    fn default() -> Self {
        RelationPayload::None {}
    }
}

/// A directed, typed edge between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub src: NodeId,
    pub dst: RelTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub payload: RelationPayload,
}

impl Relation {
    pub fn new(kind: RelationKind, src: NodeId, dst: RelTarget) -> Self {
        Self {
            kind,
            src,
            dst,
            file_path: None,
            line: None,
            payload: RelationPayload::default(),
        }
    }

    pub fn at(mut self, file_path: &str, line: u32) -> Self {
        self.file_path = Some(file_path.to_string());
        self.line = Some(line);
        self
    }

    pub fn with_payload(mut self, payload: RelationPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// Kind of file-change notification fed to the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_formats() {
        assert_eq!(NodeId::file("src/a.ts").as_str(), "file:src/a.ts");
        assert_eq!(NodeId::function("a.ts", "foo").as_str(), "function:a.ts:foo");
        assert_eq!(
            NodeId::method("a.ts", "Widget", "render").as_str(),
            "method:a.ts:Widget:render"
        );
        assert_eq!(NodeId::class("a.ts", "Widget").as_str(), "class:a.ts:Widget");
        assert_eq!(NodeId::module("./lib").as_str(), "./lib");
    }

    #[test]
    fn test_node_id_determinism() {
        // Same inputs, same id, always.
        assert_eq!(NodeId::function("a.ts", "foo"), NodeId::function("a.ts", "foo"));
        assert_ne!(NodeId::function("a.ts", "foo"), NodeId::function("b.ts", "foo"));
    }

    #[test]
    fn test_module_externality() {
        assert!(ModuleNode::from_specifier("react").external);
        assert!(ModuleNode::from_specifier("@scope/pkg").external);
        assert!(!ModuleNode::from_specifier("./lib").external);
        assert!(!ModuleNode::from_specifier("../util").external);
        assert!(!ModuleNode::from_specifier("/abs/mod").external);
    }

    #[test]
    fn test_relation_kind_serde_shape() {
        let json = serde_json::to_string(&RelationKind::Imports).unwrap();
        assert_eq!(json, "\"IMPORTS\"");
        let kind: RelationKind = serde_json::from_str("\"CALLS\"").unwrap();
        assert_eq!(kind, RelationKind::Calls);
    }

    #[test]
    fn test_node_round_trip() {
        let node = Node {
            id: NodeId::function("a.ts", "foo"),
            data: NodeData::Function(FunctionNode {
                name: "foo".to_string(),
                file_path: "a.ts".to_string(),
                class_name: None,
                params: vec!["x".to_string()],
                line_start: 1,
                line_end: 3,
                exported: true,
                is_async: false,
                visibility: None,
                doc: None,
            }),
        };

        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
        assert_eq!(back.kind(), NodeKind::Function);
        assert_eq!(back.name(), "foo");
    }

    #[test]
    fn test_relation_payload_round_trip() {
        let rel = Relation::new(
            RelationKind::Imports,
            NodeId::file("b.ts"),
            RelTarget::Id(NodeId::module("./lib")),
        )
        .with_payload(RelationPayload::Import {
            imported_names: vec!["x".to_string()],
            default: false,
        });

        let json = serde_json::to_string(&rel).unwrap();
        let back: Relation = serde_json::from_str(&json).unwrap();
        assert_eq!(rel, back);
    }

    #[test]
    fn test_method_node_identity() {
        let f = FunctionNode {
            name: "render".to_string(),
            file_path: "a.ts".to_string(),
            class_name: Some("Widget".to_string()),
            params: vec![],
            line_start: 4,
            line_end: 9,
            exported: false,
            is_async: false,
            visibility: Some(Visibility::Public),
            doc: None,
        };
        assert!(f.is_method());
    }
}
