//! Provider factory: declarative configuration to concrete implementations.
//!
//! Three slots — graph, vector, extractor — each keyed by a `type` string.
//! Known types are registrable at process start; validation collects every
//! offense into one error instead of failing on the first. Provider
//! lifetimes are bound to the engine handle; there is no global state.

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::extract::ExtractorKind;
use crate::graph::persist::GraphPersistence;
use crate::vector::{TfIdfIndex, VectorProvider};
use std::collections::BTreeMap;
use std::path::Path;

type VectorCtor = Box<dyn Fn(&Settings) -> EngineResult<Box<dyn VectorProvider>> + Send + Sync>;
type GraphCtor =
    Box<dyn Fn(&Settings, &Path) -> EngineResult<Option<GraphPersistence>> + Send + Sync>;

/// Concrete providers for one engine instance.
pub struct ProviderSet {
    /// `None` for the purely in-memory graph provider.
    pub persistence: Option<GraphPersistence>,
    pub vectors: Box<dyn VectorProvider>,
}

/// Registry of provider constructors, keyed by type string.
///
/// A provider type may additionally be marked *trivial*: one that supplies
/// no independent evidence for fusion (a graph with no persisted corpus, a
/// vector backend that never returns hits). The hybrid extractor requires a
/// non-trivial provider on at least one side.
pub struct ProviderRegistry {
    graph: BTreeMap<String, GraphCtor>,
    vector: BTreeMap<String, VectorCtor>,
    extractors: Vec<String>,
    trivial_graph: Vec<String>,
    trivial_vector: Vec<String>,
}

impl ProviderRegistry {
    /// Empty registry; use [`ProviderRegistry::with_builtins`] for the
    /// standard set.
    pub fn new() -> Self {
        Self {
            graph: BTreeMap::new(),
            vector: BTreeMap::new(),
            extractors: Vec::new(),
            trivial_graph: Vec::new(),
            trivial_vector: Vec::new(),
        }
    }

    /// Registry with the builtin providers: `local`/`memory` graphs,
    /// `tfidf` vectors (`dense` when compiled in), and the three extractor
    /// types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_graph("local", |settings, root| {
            Ok(Some(GraphPersistence::new(
                settings.graph_file_path(root),
                root,
            )))
        });
        registry.register_graph("memory", |_, _| Ok(None));
        // The memory graph keeps nothing across runs, so it cannot ground
        // the rule-based half of a hybrid fusion on its own.
        registry.mark_trivial_graph("memory");

        registry.register_vector("tfidf", |settings| {
            Ok(Box::new(TfIdfIndex::new(settings.vector_provider.min_doc_freq)))
        });
        #[cfg(feature = "dense")]
        registry.register_vector("dense", |_| {
            Ok(Box::new(crate::vector::dense::DenseIndex::new()))
        });

        for extractor in ["rag", "rule_based", "hybrid"] {
            registry.register_extractor(extractor);
        }
        registry
    }

    pub fn register_graph(
        &mut self,
        name: &str,
        ctor: impl Fn(&Settings, &Path) -> EngineResult<Option<GraphPersistence>> + Send + Sync + 'static,
    ) {
        self.graph.insert(name.to_string(), Box::new(ctor));
    }

    pub fn register_vector(
        &mut self,
        name: &str,
        ctor: impl Fn(&Settings) -> EngineResult<Box<dyn VectorProvider>> + Send + Sync + 'static,
    ) {
        self.vector.insert(name.to_string(), Box::new(ctor));
    }

    pub fn register_extractor(&mut self, name: &str) {
        if !self.extractors.iter().any(|e| e == name) {
            self.extractors.push(name.to_string());
        }
    }

    /// Mark a graph provider type as trivial for fusion purposes.
    pub fn mark_trivial_graph(&mut self, name: &str) {
        if !self.trivial_graph.iter().any(|e| e == name) {
            self.trivial_graph.push(name.to_string());
        }
    }

    /// Mark a vector provider type as trivial for fusion purposes.
    pub fn mark_trivial_vector(&mut self, name: &str) {
        if !self.trivial_vector.iter().any(|e| e == name) {
            self.trivial_vector.push(name.to_string());
        }
    }

    /// Validate a configuration against the registry, listing every offense.
    pub fn validate(&self, settings: &Settings) -> EngineResult<()> {
        let mut offenses = Vec::new();

        if !self.graph.contains_key(&settings.graph_provider.r#type) {
            offenses.push(format!(
                "unknown graph provider type '{}' (known: {})",
                settings.graph_provider.r#type,
                self.known(self.graph.keys())
            ));
        }
        if !self.vector.contains_key(&settings.vector_provider.r#type) {
            offenses.push(format!(
                "unknown vector provider type '{}' (known: {})",
                settings.vector_provider.r#type,
                self.known(self.vector.keys())
            ));
        }

        let extractor = &settings.extractor.r#type;
        if !self.extractors.iter().any(|e| e == extractor) {
            offenses.push(format!(
                "unknown extractor type '{extractor}' (known: {})",
                self.known(self.extractors.iter())
            ));
        }

        if ExtractorKind::parse(extractor) == Some(ExtractorKind::Hybrid) {
            let sum = settings.extractor.rag_weight + settings.extractor.rule_weight;
            if (sum - 1.0).abs() > 1e-3 {
                offenses.push(format!(
                    "hybrid extractor weights must sum to 1.0 (got {sum})"
                ));
            }
            if !(0.0..=1.0).contains(&settings.extractor.rag_weight)
                || !(0.0..=1.0).contains(&settings.extractor.rule_weight)
            {
                offenses.push("extractor weights must lie in [0, 1]".to_string());
            }

            // Hybrid fusion is pointless when both of its sources are
            // trivial; reject the combination outright.
            let graph_type = &settings.graph_provider.r#type;
            let vector_type = &settings.vector_provider.r#type;
            if self.trivial_graph.iter().any(|t| t == graph_type)
                && self.trivial_vector.iter().any(|t| t == vector_type)
            {
                offenses.push(format!(
                    "hybrid extractor needs a non-trivial provider on at least one side \
                     (graph '{graph_type}' and vector '{vector_type}' are both trivial)"
                ));
            }
        }

        if settings.vector_provider.min_doc_freq == 0 {
            offenses.push("vector_provider.min_doc_freq must be at least 1".to_string());
        }

        if offenses.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidProviders { offenses })
        }
    }

    /// Validate and construct the provider set for a project root.
    pub fn build(&self, settings: &Settings, root: &Path) -> EngineResult<ProviderSet> {
        self.validate(settings)?;

        let persistence = self.graph[&settings.graph_provider.r#type](settings, root)?;
        let vectors = self.vector[&settings.vector_provider.r#type](settings)?;
        Ok(ProviderSet {
            persistence,
            vectors,
        })
    }

    fn known<'a>(&self, keys: impl Iterator<Item = &'a String>) -> String {
        keys.map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_configuration_validates() {
        let registry = ProviderRegistry::with_builtins();
        assert!(registry.validate(&Settings::default()).is_ok());
    }

    #[test]
    fn test_unknown_types_listed_together() {
        let registry = ProviderRegistry::with_builtins();
        let mut settings = Settings::default();
        settings.graph_provider.r#type = "cloud".to_string();
        settings.vector_provider.r#type = "faiss".to_string();
        settings.extractor.r#type = "psychic".to_string();

        let err = registry.validate(&settings).unwrap_err();
        match err {
            EngineError::InvalidProviders { offenses } => {
                assert_eq!(offenses.len(), 3);
                assert!(offenses[0].contains("cloud"));
                assert!(offenses[1].contains("faiss"));
                assert!(offenses[2].contains("psychic"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_hybrid_weights_must_sum_to_one() {
        let registry = ProviderRegistry::with_builtins();
        let mut settings = Settings::default();
        settings.extractor.rag_weight = 0.9;
        settings.extractor.rule_weight = 0.3;

        let err = registry.validate(&settings).unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_non_hybrid_ignores_weights() {
        let registry = ProviderRegistry::with_builtins();
        let mut settings = Settings::default();
        settings.extractor.r#type = "rule_based".to_string();
        settings.extractor.rag_weight = 0.9;
        settings.extractor.rule_weight = 0.3;
        assert!(registry.validate(&settings).is_ok());
    }

    #[test]
    fn test_build_local_vs_memory() {
        let registry = ProviderRegistry::with_builtins();
        let temp = TempDir::new().unwrap();

        let providers = registry.build(&Settings::default(), temp.path()).unwrap();
        assert!(providers.persistence.is_some());

        let mut settings = Settings::default();
        settings.graph_provider.r#type = "memory".to_string();
        let providers = registry.build(&settings, temp.path()).unwrap();
        assert!(providers.persistence.is_none());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ProviderRegistry::with_builtins();
        registry.register_vector("null", |_| {
            Ok(Box::new(TfIdfIndex::new(1)))
        });

        let mut settings = Settings::default();
        settings.vector_provider.r#type = "null".to_string();
        assert!(registry.validate(&settings).is_ok());
    }

    #[test]
    fn test_hybrid_rejects_trivial_providers_on_both_sides() {
        let mut registry = ProviderRegistry::with_builtins();
        registry.register_vector("null", |_| Ok(Box::new(TfIdfIndex::new(1))));
        registry.mark_trivial_vector("null");

        let mut settings = Settings::default();
        settings.graph_provider.r#type = "memory".to_string();
        settings.vector_provider.r#type = "null".to_string();

        let err = registry.validate(&settings).unwrap_err();
        assert!(err.to_string().contains("both trivial"));

        // One non-trivial side is enough for hybrid.
        settings.vector_provider.r#type = "tfidf".to_string();
        assert!(registry.validate(&settings).is_ok());
        settings.graph_provider.r#type = "local".to_string();
        settings.vector_provider.r#type = "null".to_string();
        assert!(registry.validate(&settings).is_ok());
    }

    #[test]
    fn test_trivial_combination_allowed_outside_hybrid() {
        let mut registry = ProviderRegistry::with_builtins();
        registry.register_vector("null", |_| Ok(Box::new(TfIdfIndex::new(1))));
        registry.mark_trivial_vector("null");

        let mut settings = Settings::default();
        settings.graph_provider.r#type = "memory".to_string();
        settings.vector_provider.r#type = "null".to_string();
        settings.extractor.r#type = "rule_based".to_string();
        assert!(registry.validate(&settings).is_ok());
    }
}
