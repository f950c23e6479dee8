//! Layered context retrieval.
//!
//! For one utterance and a token budget the builder assembles concentric
//! layers of graph evidence:
//!
//! - **L0 Core** — entities named or pattern-extracted from the utterance,
//!   plus their direct outgoing relations.
//! - **L1 Immediate** — one-hop undirected neighbors of L0 (cap 20).
//! - **L2 Extended** — two-hop neighbors excluding L0 and L1 (cap 15).
//! - **L3 Global** — a one-paragraph project summary from graph statistics.
//!
//! Layers fill in priority order under the budget; a layer that does not
//! fit is omitted and reported via `truncated`, never silently dropped.

pub mod format;
pub mod intent;
pub mod seeds;

pub use intent::{Intent, IntentClassifier};

use crate::config::ExtractorConfig;
use crate::extract;
use crate::graph::KnowledgeGraph;
use crate::types::{NodeId, RelationKind};
use crate::vector::VectorProvider;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-layer base token overhead.
const LAYER_BASE_TOKENS: usize = 50;
/// Estimated tokens per entity in structured layer content.
const TOKENS_PER_ENTITY: usize = 20;
/// Estimated tokens per relation in structured layer content.
const TOKENS_PER_RELATION: usize = 15;
/// Entity caps for the outer layers.
const L1_CAP: usize = 20;
const L2_CAP: usize = 15;
/// Vector fusion: K = min(8, budget / 100).
const MAX_FUSION_K: usize = 8;

/// Approximate tokens for free text as ceil(chars / 4).
pub fn estimate_text_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate for structured layer content; chosen to slightly overestimate.
pub fn estimate_layer_tokens(entities: usize, relations: usize) -> usize {
    LAYER_BASE_TOKENS + TOKENS_PER_ENTITY * entities + TOKENS_PER_RELATION * relations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Layer {
    L0,
    L1,
    L2,
    L3,
}

impl Layer {
    pub fn title(&self) -> &'static str {
        match self {
            Layer::L0 => "L0 Core",
            Layer::L1 => "L1 Immediate",
            Layer::L2 => "L2 Extended",
            Layer::L3 => "L3 Global",
        }
    }
}

/// A rendered relation: resolved endpoints only.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationView {
    pub src: NodeId,
    pub dst: NodeId,
    pub kind: RelationKind,
}

/// One filled layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerContent {
    pub layer: Layer,
    pub entities: Vec<NodeId>,
    /// Only L0 carries rendered relations.
    pub relations: Vec<RelationView>,
    /// Only L3 carries a summary paragraph.
    pub summary: Option<String>,
    pub tokens: usize,
}

/// The assembled context bundle.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub text: String,
    pub tokens: usize,
    pub layers: Vec<LayerContent>,
    pub truncated: bool,
    pub truncation_reason: Option<String>,
    pub intent: Intent,
}

impl ContextBundle {
    pub fn has_layer(&self, layer: Layer) -> bool {
        self.layers.iter().any(|l| l.layer == layer)
    }

    pub fn layer(&self, layer: Layer) -> Option<&LayerContent> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

/// Per-query options.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub budget_tokens: usize,
    /// Soft timeout; exceeded mid-walk, filled layers are returned with
    /// `truncated = true` and reason `timeout`.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl QueryOptions {
    pub fn with_budget(budget_tokens: usize) -> Self {
        Self {
            budget_tokens,
            ..Default::default()
        }
    }
}

enum Interrupt {
    Timeout,
    Cancelled,
}

/// Borrows read-only views of the graph and vector index; never mutates.
pub struct ContextBuilder<'a> {
    graph: &'a KnowledgeGraph,
    vectors: &'a dyn VectorProvider,
    extractor: &'a ExtractorConfig,
    classifier: &'a IntentClassifier,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(
        graph: &'a KnowledgeGraph,
        vectors: &'a dyn VectorProvider,
        extractor: &'a ExtractorConfig,
        classifier: &'a IntentClassifier,
    ) -> Self {
        Self {
            graph,
            vectors,
            extractor,
            classifier,
        }
    }

    pub fn build(&self, utterance: &str, options: &QueryOptions) -> ContextBundle {
        let intent = self.classifier.classify(utterance);
        let budget = options.budget_tokens;

        if budget == 0 {
            return ContextBundle {
                text: format::render(&[], 0, true, Some("budget=0")),
                tokens: 0,
                layers: Vec::new(),
                truncated: true,
                truncation_reason: Some("budget=0".to_string()),
                intent,
            };
        }

        let deadline = options.timeout.map(|t| Instant::now() + t);
        let mut layers: Vec<LayerContent> = Vec::new();
        let mut remaining = budget;
        let mut truncated = false;
        let mut reasons: Vec<String> = Vec::new();
        let mut interrupted = false;

        let fusion_k = MAX_FUSION_K.min(budget / 100);
        let extraction = extract::extract(utterance, self.graph, self.vectors, self.extractor, fusion_k);
        if let Some(degraded) = &extraction.degraded {
            tracing::warn!("extractor degraded to single source: {degraded}");
        }

        let core_ids: Vec<NodeId> = extraction
            .core
            .iter()
            .filter(|e| self.graph.has_node(&e.id))
            .map(|e| e.id.clone())
            .collect();
        let core_set: BTreeSet<&NodeId> = core_ids.iter().collect();

        // L0: core entities plus their direct outgoing relations. The edges
        // reaching outside the core are charged to L1, which introduces
        // their far endpoints.
        let mut l1_candidates: Vec<NodeId> = Vec::new();
        if !core_ids.is_empty() {
            match self.check_interrupt(options, deadline) {
                Some(interrupt) => {
                    truncated = true;
                    interrupted = true;
                    reasons.push(interrupt_reason(interrupt));
                }
                None => {
                    let mut relations = Vec::new();
                    for id in &core_ids {
                        for edge in self.graph.out_edges(id, None) {
                            relations.push(RelationView {
                                src: edge.src.clone(),
                                dst: edge.dst.clone(),
                                kind: edge.kind,
                            });
                        }
                    }
                    let internal = relations
                        .iter()
                        .filter(|r| core_set.contains(&r.dst))
                        .count();
                    let tokens = estimate_layer_tokens(core_ids.len(), internal);
                    if tokens <= remaining {
                        remaining -= tokens;
                        layers.push(LayerContent {
                            layer: Layer::L0,
                            entities: core_ids.clone(),
                            relations,
                            summary: None,
                            tokens,
                        });
                    } else {
                        truncated = true;
                        reasons.push(format!(
                            "L0 omitted: needs {tokens} tokens, {remaining} remaining"
                        ));
                    }
                }
            }

            // L1: supplemental vector hits fold in first, then one-hop
            // neighbors in discovery order.
            if !interrupted {
                if let Some(interrupt) = self.check_interrupt(options, deadline) {
                    truncated = true;
                    interrupted = true;
                    reasons.push(interrupt_reason(interrupt));
                } else {
                    let mut seen: BTreeSet<NodeId> = core_ids.iter().cloned().collect();
                    for entity in &extraction.supplemental {
                        if self.graph.has_node(&entity.id) && seen.insert(entity.id.clone()) {
                            l1_candidates.push(entity.id.clone());
                        }
                    }
                    for id in &core_ids {
                        for neighbor in self.graph.neighbors(id) {
                            // Unresolved symbolic targets are edge endpoints
                            // but not graph entities.
                            if seen.insert(neighbor.clone()) && self.graph.has_node(&neighbor) {
                                l1_candidates.push(neighbor);
                            }
                        }
                    }
                    l1_candidates.truncate(L1_CAP);

                    if !l1_candidates.is_empty() {
                        let l1_set: BTreeSet<&NodeId> = l1_candidates.iter().collect();
                        let crossing = self
                            .count_edges_between(&core_set, &l1_set);
                        let tokens = estimate_layer_tokens(l1_candidates.len(), crossing);
                        if tokens <= remaining {
                            remaining -= tokens;
                            layers.push(LayerContent {
                                layer: Layer::L1,
                                entities: l1_candidates.clone(),
                                relations: Vec::new(),
                                summary: None,
                                tokens,
                            });
                        } else {
                            truncated = true;
                            reasons.push(format!(
                                "L1 omitted: needs {tokens} tokens, {remaining} remaining"
                            ));
                        }
                    }
                }
            }

            // L2: two-hop neighbors, excluding everything closer.
            if !interrupted {
                if let Some(interrupt) = self.check_interrupt(options, deadline) {
                    truncated = true;
                    interrupted = true;
                    reasons.push(interrupt_reason(interrupt));
                } else {
                    let mut seen: BTreeSet<NodeId> = core_ids.iter().cloned().collect();
                    seen.extend(l1_candidates.iter().cloned());
                    let mut l2_entities = Vec::new();
                    for id in &l1_candidates {
                        for neighbor in self.graph.neighbors(id) {
                            if seen.insert(neighbor.clone()) && self.graph.has_node(&neighbor) {
                                l2_entities.push(neighbor);
                            }
                        }
                    }
                    l2_entities.truncate(L2_CAP);

                    if !l2_entities.is_empty() {
                        let tokens = estimate_layer_tokens(l2_entities.len(), 0);
                        if tokens <= remaining {
                            remaining -= tokens;
                            layers.push(LayerContent {
                                layer: Layer::L2,
                                entities: l2_entities,
                                relations: Vec::new(),
                                summary: None,
                                tokens,
                            });
                        } else {
                            truncated = true;
                            reasons.push(format!(
                                "L2 omitted: needs {tokens} tokens, {remaining} remaining"
                            ));
                        }
                    }
                }
            }
        }

        // L3: always available, whatever the seeds did.
        if !interrupted {
            let summary = self.project_summary();
            let tokens = estimate_text_tokens(&summary);
            if tokens <= remaining {
                layers.push(LayerContent {
                    layer: Layer::L3,
                    entities: Vec::new(),
                    relations: Vec::new(),
                    summary: Some(summary),
                    tokens,
                });
            } else {
                truncated = true;
                reasons.push(format!(
                    "L3 omitted: needs {tokens} tokens, {remaining} remaining"
                ));
            }
        }

        let tokens: usize = layers.iter().map(|l| l.tokens).sum();
        let truncation_reason = (!reasons.is_empty()).then(|| reasons.join("; "));
        let text = format::render(&layers, tokens, truncated, truncation_reason.as_deref());

        ContextBundle {
            text,
            tokens,
            layers,
            truncated,
            truncation_reason,
            intent,
        }
    }

    fn check_interrupt(
        &self,
        options: &QueryOptions,
        deadline: Option<Instant>,
    ) -> Option<Interrupt> {
        if options
            .cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return Some(Interrupt::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(Interrupt::Timeout);
        }
        None
    }

    fn count_edges_between(&self, a: &BTreeSet<&NodeId>, b: &BTreeSet<&NodeId>) -> usize {
        let mut count = 0;
        for id in a {
            count += self
                .graph
                .out_edges(id, None)
                .iter()
                .filter(|e| b.contains(&e.dst))
                .count();
            count += self
                .graph
                .in_edges(id, None)
                .iter()
                .filter(|e| b.contains(&e.src))
                .count();
        }
        count
    }

    /// One-paragraph project summary from graph and index statistics.
    fn project_summary(&self) -> String {
        let stats = self.graph.stats();
        let count = |kind| stats.nodes_by_kind.get(&kind).copied().unwrap_or(0);
        let edge_count = |kind| stats.edges_by_kind.get(&kind).copied().unwrap_or(0);
        let vector = self.vectors.stats();

        format!(
            "Project graph: {} files, {} functions, {} classes, {} modules; \
             {} relations ({} calls, {} imports, {} contains). \
             Vector index: {} documents over {} vocabulary terms.",
            count(crate::types::NodeKind::File),
            count(crate::types::NodeKind::Function),
            count(crate::types::NodeKind::Class),
            count(crate::types::NodeKind::Module),
            self.graph.edge_count(),
            edge_count(RelationKind::Calls),
            edge_count(RelationKind::Imports),
            edge_count(RelationKind::Contains),
            vector.doc_count,
            vector.vocab_size,
        )
    }
}

fn interrupt_reason(interrupt: Interrupt) -> String {
    match interrupt {
        Interrupt::Timeout => "timeout".to_string(),
        Interrupt::Cancelled => "cancelled".to_string(),
    }
}
