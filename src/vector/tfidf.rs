//! Sparse TF-IDF vector index.
//!
//! Vocabulary is built once over all stored documents (batch mode) and then
//! frozen: per-document updates recompute that document's vector against the
//! existing vocabulary, and new terms are ignored until an explicit
//! `rebuild()`. Search is a linear cosine scan; the trade against
//! sub-linear structures is accepted for simplicity and determinism.

use crate::error::EngineResult;
use crate::vector::{DocumentMeta, SearchHit, VectorProvider, VectorStats};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Sorted `(term index, weight)` pairs, L2-normalized.
type SparseVector = Vec<(u32, f32)>;

#[derive(Debug, Clone)]
struct StoredDoc {
    content: String,
    meta: DocumentMeta,
}

/// Sparse TF-IDF index over node projections.
pub struct TfIdfIndex {
    min_doc_freq: usize,
    docs: BTreeMap<String, StoredDoc>,
    /// Term -> stable index, assigned in insertion order at build time.
    vocab: IndexMap<String, u32>,
    /// Per-term IDF, frozen at build time.
    idf: Vec<f32>,
    vectors: BTreeMap<String, SparseVector>,
    initialized: bool,
}

impl TfIdfIndex {
    pub fn new(min_doc_freq: usize) -> Self {
        Self {
            min_doc_freq,
            docs: BTreeMap::new(),
            vocab: IndexMap::new(),
            idf: Vec::new(),
            vectors: BTreeMap::new(),
            initialized: false,
        }
    }

    /// Split on any non-alphanumeric character (Unicode-aware), lowercase,
    /// discard tokens shorter than 2 characters.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn build(&mut self) {
        self.vocab.clear();
        self.idf.clear();
        self.vectors.clear();

        // Document frequency over all projections, first-seen term order.
        let mut df: IndexMap<String, usize> = IndexMap::new();
        for doc in self.docs.values() {
            let mut seen = std::collections::HashSet::new();
            for token in Self::tokenize(&doc.content) {
                if seen.insert(token.clone()) {
                    *df.entry(token).or_insert(0) += 1;
                }
            }
        }

        let total = self.docs.len().max(1) as f32;
        for (term, freq) in df {
            if freq >= self.min_doc_freq && term.chars().count() > 2 {
                let index = self.vocab.len() as u32;
                self.vocab.insert(term, index);
                self.idf.push((total / freq as f32).ln());
            }
        }

        let ids: Vec<String> = self.docs.keys().cloned().collect();
        for id in ids {
            let vector = self.vectorize(&self.docs[&id].content);
            self.vectors.insert(id, vector);
        }
        self.initialized = true;
    }

    /// TF-IDF against the frozen vocabulary, L2-normalized. Unknown terms
    /// are ignored.
    fn vectorize(&self, content: &str) -> SparseVector {
        let mut tf: BTreeMap<u32, f32> = BTreeMap::new();
        for token in Self::tokenize(content) {
            if let Some(&index) = self.vocab.get(&token) {
                *tf.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: SparseVector = tf
            .into_iter()
            .map(|(index, count)| (index, count * self.idf[index as usize]))
            .filter(|(_, w)| *w != 0.0)
            .collect();

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut vector {
                *w /= norm;
            }
        }
        vector
    }
}

/// Dot product of two sorted sparse vectors. Both sides are normalized, so
/// this is cosine similarity.
pub fn sparse_dot(a: &[(u32, f32)], b: &[(u32, f32)]) -> f32 {
    let (mut i, mut j, mut sum) = (0usize, 0usize, 0.0f32);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

impl VectorProvider for TfIdfIndex {
    fn initialize(&mut self) -> EngineResult<()> {
        self.build();
        Ok(())
    }

    fn index_document(
        &mut self,
        id: &str,
        content: &str,
        meta: DocumentMeta,
    ) -> EngineResult<bool> {
        if Self::tokenize(content).is_empty() {
            // Nothing to index; not an error.
            return Ok(false);
        }

        self.docs.insert(
            id.to_string(),
            StoredDoc {
                content: content.to_string(),
                meta,
            },
        );

        // After the batch build the vocabulary is frozen: only this
        // document's vector is recomputed.
        if self.initialized {
            let vector = self.vectorize(content);
            self.vectors.insert(id.to_string(), vector);
        }
        Ok(true)
    }

    fn search(&self, text: &str, top_k: usize, threshold: f32) -> EngineResult<Vec<SearchHit>> {
        if !self.initialized || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.vectorize(text);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .filter_map(|(id, vector)| {
                let score = sparse_dot(&query, vector);
                (score >= threshold).then(|| SearchHit {
                    id: id.clone(),
                    score,
                    meta: self.docs[id].meta.clone(),
                })
            })
            .collect();

        // Descending score; ties broken by stable id order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    fn remove_document(&mut self, id: &str) -> EngineResult<bool> {
        let existed = self.docs.remove(id).is_some();
        self.vectors.remove(id);
        Ok(existed)
    }

    fn rebuild(&mut self) -> EngineResult<()> {
        self.build();
        Ok(())
    }

    fn stats(&self) -> VectorStats {
        VectorStats {
            doc_count: self.docs.len(),
            vocab_size: self.vocab.len(),
        }
    }

    fn dispose(&mut self) {
        self.docs.clear();
        self.vocab.clear();
        self.idf.clear();
        self.vectors.clear();
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;

    fn meta() -> DocumentMeta {
        DocumentMeta {
            kind: NodeKind::Function,
            file_path: None,
            line_start: None,
            line_end: None,
            language: None,
        }
    }

    fn seeded_index() -> TfIdfIndex {
        let mut index = TfIdfIndex::new(2);
        index.index_document("d1", "user login", meta()).unwrap();
        index.index_document("d2", "user logout", meta()).unwrap();
        index.index_document("d3", "file reader", meta()).unwrap();
        index.index_document("d4", "http client", meta()).unwrap();
        index.initialize().unwrap();
        index
    }

    #[test]
    fn test_tokenizer() {
        assert_eq!(
            TfIdfIndex::tokenize("parse_config(v2) -> Result"),
            vec!["parse", "config", "v2", "result"]
        );
        // Single characters are discarded.
        assert_eq!(TfIdfIndex::tokenize("a b cd"), vec!["cd"]);
        assert!(TfIdfIndex::tokenize("!?.,").is_empty());
    }

    #[test]
    fn test_search_ranking() {
        let index = seeded_index();
        let hits = index.search("login user", 10, 0.1).unwrap();

        // The login document comes strictly ahead of logout; the unrelated
        // documents score below threshold.
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "d1");
        assert!(hits.iter().all(|h| h.id != "d3" && h.id != "d4"));
        if let Some(logout) = hits.iter().find(|h| h.id == "d2") {
            assert!(hits[0].score >= logout.score);
        }
    }

    #[test]
    fn test_normalized_vectors() {
        let index = seeded_index();
        for vector in index.vectors.values() {
            let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
            // Either empty (all terms out of vocabulary) or unit length.
            assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-5, "norm = {norm}");
        }
    }

    #[test]
    fn test_cosine_bounds_and_symmetry() {
        let index = seeded_index();
        let a = index.vectorize("user login");
        let b = index.vectorize("user logout");
        let ab = sparse_dot(&a, &b);
        let ba = sparse_dot(&b, &a);
        assert_eq!(ab, ba);
        assert!((0.0..=1.0 + 1e-6).contains(&ab));
    }

    #[test]
    fn test_uninitialized_search_is_empty() {
        let mut index = TfIdfIndex::new(2);
        index.index_document("d1", "user login", meta()).unwrap();
        assert!(index.search("login", 10, 0.1).unwrap().is_empty());
    }

    #[test]
    fn test_empty_projection_skipped() {
        let mut index = TfIdfIndex::new(2);
        assert!(!index.index_document("d0", "! ?", meta()).unwrap());
        assert_eq!(index.stats().doc_count, 0);
    }

    #[test]
    fn test_vocabulary_frozen_after_build() {
        let mut index = seeded_index();
        let vocab_size = index.stats().vocab_size;

        // New terms are ignored until rebuild.
        index
            .index_document("d5", "websocket transport", meta())
            .unwrap();
        index
            .index_document("d6", "websocket server", meta())
            .unwrap();
        assert_eq!(index.stats().vocab_size, vocab_size);
        assert!(index.search("websocket", 10, 0.1).unwrap().is_empty());

        // After rebuild `websocket` clears the document-frequency bar.
        index.rebuild().unwrap();
        assert!(index.stats().vocab_size > vocab_size);
        let hits = index.search("websocket", 10, 0.1).unwrap();
        assert!(hits.iter().any(|h| h.id == "d5"));
        assert!(hits.iter().any(|h| h.id == "d6"));
    }

    #[test]
    fn test_incremental_update_against_frozen_vocab() {
        let mut index = seeded_index();
        // Re-index d2 with vocabulary terms only.
        index.index_document("d2", "user user user", meta()).unwrap();
        let hits = index.search("user", 10, 0.1).unwrap();
        assert!(hits.iter().any(|h| h.id == "d2"));
    }

    #[test]
    fn test_remove_document() {
        let mut index = seeded_index();
        assert!(index.remove_document("d1").unwrap());
        assert!(!index.remove_document("d1").unwrap());
        let hits = index.search("login user", 10, 0.1).unwrap();
        assert!(hits.iter().all(|h| h.id != "d1"));
    }

    #[test]
    fn test_dispose() {
        let mut index = seeded_index();
        index.dispose();
        assert_eq!(index.stats(), VectorStats::default());
        assert!(index.search("user", 10, 0.1).unwrap().is_empty());
    }
}
