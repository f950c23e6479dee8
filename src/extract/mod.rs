//! Context extractors: graph-led, vector-led, and hybrid fusion.
//!
//! The rule extractor resolves utterance seeds against the graph; the rag
//! extractor issues a vector search; hybrid fuses both with configured
//! weights. Fusion is a pure function of the two partial results, and a
//! failed source degrades to the surviving one instead of erroring.

use crate::config::ExtractorConfig;
use crate::graph::KnowledgeGraph;
use crate::retrieve::seeds::{extract_seeds, utterance_tokens};
use crate::types::{NodeData, NodeId, NodeKind};
use crate::vector::{SearchHit, VectorProvider};

/// Vector-search threshold shared by every extractor.
const SEARCH_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntity {
    pub id: NodeId,
    pub score: f32,
}

/// Which extractor produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Rag,
    RuleBased,
    Hybrid,
}

impl ExtractorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rag" => Some(Self::Rag),
            "rule_based" | "ruleBased" => Some(Self::RuleBased),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// Outcome of extraction: core entities seed L0; supplemental entities are
/// folded into L1. `degraded` notes a source that failed and was dropped.
#[derive(Debug, Default)]
pub struct Extraction {
    pub core: Vec<ScoredEntity>,
    pub supplemental: Vec<ScoredEntity>,
    pub degraded: Option<String>,
}

/// Run the configured extractor. `top_k == 0` disables the vector side
/// entirely (e.g. when the budget cannot afford it).
pub fn extract(
    utterance: &str,
    graph: &KnowledgeGraph,
    vectors: &dyn VectorProvider,
    config: &ExtractorConfig,
    top_k: usize,
) -> Extraction {
    let kind = ExtractorKind::parse(&config.r#type).unwrap_or(ExtractorKind::Hybrid);

    match kind {
        ExtractorKind::RuleBased => Extraction {
            core: rule_extract(utterance, graph),
            ..Default::default()
        },
        ExtractorKind::Rag => match vector_hits(utterance, vectors, top_k) {
            Ok(hits) => Extraction {
                core: hits
                    .iter()
                    .map(|h| ScoredEntity {
                        id: NodeId::raw(&h.id),
                        score: h.score,
                    })
                    .collect(),
                ..Default::default()
            },
            Err(reason) => Extraction {
                core: rule_extract(utterance, graph),
                supplemental: Vec::new(),
                degraded: Some(reason),
            },
        },
        ExtractorKind::Hybrid => {
            let rule = rule_extract(utterance, graph);
            match vector_hits(utterance, vectors, top_k) {
                Ok(hits) => fuse(rule, &hits, config.rag_weight, config.rule_weight),
                Err(reason) => Extraction {
                    core: rule,
                    supplemental: Vec::new(),
                    degraded: Some(reason),
                },
            }
        }
    }
}

fn vector_hits(
    utterance: &str,
    vectors: &dyn VectorProvider,
    top_k: usize,
) -> Result<Vec<SearchHit>, String> {
    if top_k == 0 {
        return Ok(Vec::new());
    }
    vectors
        .search(utterance, top_k, SEARCH_THRESHOLD)
        .map_err(|e| format!("vector search failed: {e}"))
}

/// Graph-led extraction: resolve pattern seeds and entity-naming tokens to
/// node ids. Exact name matches score 1.0, file path matches 0.9.
pub fn rule_extract(utterance: &str, graph: &KnowledgeGraph) -> Vec<ScoredEntity> {
    let mut result: Vec<ScoredEntity> = Vec::new();
    let mut push = |entity: ScoredEntity| {
        if !result.iter().any(|e| e.id == entity.id) {
            result.push(entity);
        }
    };

    for seed in extract_seeds(utterance) {
        if seed.contains('.') || seed.contains('/') {
            for entity in resolve_file(&seed, graph) {
                push(entity);
            }
        }
        for id in resolve_name(&seed, graph) {
            push(ScoredEntity { id, score: 1.0 });
        }
    }

    // Plain tokens that exactly name an entity count as named seeds too.
    for token in utterance_tokens(utterance) {
        for id in resolve_name(&token, graph) {
            push(ScoredEntity { id, score: 1.0 });
        }
    }

    result
}

fn resolve_file(seed: &str, graph: &KnowledgeGraph) -> Vec<ScoredEntity> {
    graph
        .find_by_kind(NodeKind::File)
        .into_iter()
        .filter_map(|node| match &node.data {
            NodeData::File(f)
                if f.relative_path == seed
                    || f.relative_path.ends_with(&format!("/{seed}")) =>
            {
                Some(ScoredEntity {
                    id: node.id.clone(),
                    score: if f.relative_path == seed { 1.0 } else { 0.9 },
                })
            }
            _ => None,
        })
        .collect()
}

/// Exact (case-insensitive) name matches over non-file nodes, stable order.
fn resolve_name(token: &str, graph: &KnowledgeGraph) -> Vec<NodeId> {
    graph
        .find_by_name(token)
        .into_iter()
        .filter(|node| node.kind() != NodeKind::File)
        .filter(|node| node.name().eq_ignore_ascii_case(token))
        .map(|node| node.id.clone())
        .collect()
}

/// Combine rule and vector scores as `rag_weight * vec + rule_weight *
/// rule`. Function- and class-kind vector hits join the core only when the
/// rule side found a core at all (a seedless utterance stays seedless);
/// file-kind hits are folded into L1 via the supplemental list. Ties break
/// on stable id order.
fn fuse(rule: Vec<ScoredEntity>, hits: &[SearchHit], rag_w: f32, rule_w: f32) -> Extraction {
    let mut core: Vec<ScoredEntity> = rule
        .iter()
        .map(|e| {
            let vec_score = hits
                .iter()
                .find(|h| h.id == e.id.as_str())
                .map(|h| h.score)
                .unwrap_or(0.0);
            ScoredEntity {
                id: e.id.clone(),
                score: rule_w * e.score + rag_w * vec_score,
            }
        })
        .collect();

    let mut supplemental = Vec::new();
    for hit in hits {
        let id = NodeId::raw(&hit.id);
        if core.iter().any(|e| e.id == id) {
            continue;
        }
        let entity = ScoredEntity {
            id,
            score: rag_w * hit.score,
        };
        match hit.meta.kind {
            NodeKind::Function | NodeKind::Class if !rule.is_empty() => core.push(entity),
            _ => supplemental.push(entity),
        }
    }

    sort_scored(&mut core);
    sort_scored(&mut supplemental);
    Extraction {
        core,
        supplemental,
        degraded: None,
    }
}

fn sort_scored(entities: &mut [ScoredEntity]) {
    entities.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}
