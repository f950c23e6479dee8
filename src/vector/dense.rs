//! Dense-embedding vector index (feature `dense`).
//!
//! Conforms to the same [`VectorProvider`] contract as the TF-IDF engine;
//! the retriever cannot tell them apart. Embeddings come from fastembed's
//! AllMiniLML6V2 model.

use crate::error::{EngineError, EngineResult};
use crate::vector::{DocumentMeta, SearchHit, VectorProvider, VectorStats};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredDoc {
    meta: DocumentMeta,
    embedding: Vec<f32>,
}

/// Dense vector index backed by a local embedding model.
pub struct DenseIndex {
    model: Option<Mutex<TextEmbedding>>,
    docs: BTreeMap<String, StoredDoc>,
    /// Documents fed in before the model was initialized.
    pending: BTreeMap<String, (String, DocumentMeta)>,
    dimensions: usize,
}

impl DenseIndex {
    pub fn new() -> Self {
        Self {
            model: None,
            docs: BTreeMap::new(),
            pending: BTreeMap::new(),
            dimensions: 0,
        }
    }

    fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| EngineError::internal("dense index not initialized"))?;
        let mut guard = model
            .lock()
            .map_err(|_| EngineError::internal("embedding model mutex poisoned"))?;
        let mut embeddings = guard
            .embed(vec![text], None)
            .map_err(|e| EngineError::internal(format!("embedding failed: {e}")))?;
        Ok(embeddings.pop().unwrap_or_default())
    }
}

impl Default for DenseIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorProvider for DenseIndex {
    fn initialize(&mut self) -> EngineResult<()> {
        if self.model.is_none() {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )
            .map_err(|e| EngineError::internal(format!("failed to load embedding model: {e}")))?;
            self.model = Some(Mutex::new(model));
        }

        let pending = std::mem::take(&mut self.pending);
        for (id, (content, meta)) in pending {
            let embedding = self.embed(&content)?;
            if self.dimensions == 0 {
                self.dimensions = embedding.len();
            }
            self.docs.insert(id, StoredDoc { meta, embedding });
        }
        Ok(())
    }

    fn index_document(
        &mut self,
        id: &str,
        content: &str,
        meta: DocumentMeta,
    ) -> EngineResult<bool> {
        if content.trim().is_empty() {
            return Ok(false);
        }
        if self.model.is_none() {
            self.pending
                .insert(id.to_string(), (content.to_string(), meta));
            return Ok(true);
        }
        let embedding = self.embed(content)?;
        if self.dimensions == 0 {
            self.dimensions = embedding.len();
        }
        self.docs
            .insert(id.to_string(), StoredDoc { meta, embedding });
        Ok(true)
    }

    fn search(&self, text: &str, top_k: usize, threshold: f32) -> EngineResult<Vec<SearchHit>> {
        if self.model.is_none() || self.docs.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed(text)?;
        let mut hits: Vec<SearchHit> = self
            .docs
            .iter()
            .filter_map(|(id, doc)| {
                let score = cosine_similarity(&query, &doc.embedding);
                (score >= threshold).then(|| SearchHit {
                    id: id.clone(),
                    score,
                    meta: doc.meta.clone(),
                })
            })
            .collect();

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
        let existed = self.docs.remove(id).is_some() || self.pending.remove(id).is_some();
        Ok(existed)
    }

    fn rebuild(&mut self) -> EngineResult<()> {
        // Embeddings do not drift the way a frozen vocabulary does; nothing
        // to recompute.
        Ok(())
    }

    fn stats(&self) -> VectorStats {
        VectorStats {
            doc_count: self.docs.len() + self.pending.len(),
            vocab_size: self.dimensions,
        }
    }

    fn dispose(&mut self) {
        self.docs.clear();
        self.pending.clear();
        self.model = None;
        self.dimensions = 0;
    }
}
