//! ctxgraph: layered context retrieval over a project knowledge graph.
//!
//! Given a user utterance, the engine produces a compact, ranked bundle of
//! project-derived facts (files, functions, classes, relationships) for
//! injection into a language-model prompt:
//!
//! 1. The **scanner** enumerates source files under ignore rules.
//! 2. The **analyzer** parses each file into nodes and relations.
//! 3. The **knowledge graph** stores them with incremental updates and
//!    on-disk persistence.
//! 4. The **vector index** answers semantic lookups over node projections.
//! 5. The **retriever** assembles an L0-L3 context bundle under a token
//!    budget and renders it as a deterministic text block.
//!
//! The engine does not reason, call an LLM, or execute tools; retrieval is
//! deterministic selection from indexed evidence under a stated budget.

pub mod analyze;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod graph;
pub mod logging;
pub mod provider;
pub mod retrieve;
pub mod scan;
pub mod types;
pub mod update;
pub mod vector;

pub use config::Settings;
pub use engine::{Engine, EngineStats, InitReport};
pub use error::{EngineError, EngineResult, FileError};
pub use graph::{Edge, KnowledgeGraph};
pub use retrieve::{ContextBundle, Intent, Layer, QueryOptions};
pub use scan::{ScanResult, Scanner};
pub use types::{
    ChangeKind, Node, NodeData, NodeId, NodeKind, Relation, RelationKind, RelTarget,
};
pub use vector::{DocumentMeta, SearchHit, TfIdfIndex, VectorProvider};
