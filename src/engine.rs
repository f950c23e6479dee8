//! Engine facade: the handle the host CLI/LLM client talks to.
//!
//! Owns the graph + vector-index pair behind a single-writer / many-reader
//! lock. Reads (query, statistics) take a shared guard; ingestion and
//! removal take the exclusive guard. Within one file-change event the new
//! state becomes visible to readers atomically.

use crate::analyze;
use crate::config::Settings;
use crate::error::{EngineError, EngineResult, FileError};
use crate::graph::KnowledgeGraph;
use crate::graph::persist::GraphPersistence;
use crate::provider::ProviderRegistry;
use crate::retrieve::{ContextBuilder, ContextBundle, IntentClassifier, QueryOptions};
use crate::scan::{ScanResult, Scanner};
use crate::types::{ChangeKind, NodeKind, RelationKind};
use crate::update::{self, FileHashes, UpdateOutcome};
use crate::vector::{VectorProvider, document_meta, project_node};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Aggregate statistics over the graph and vector index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub edges_by_kind: BTreeMap<RelationKind, usize>,
    pub vocab_size: usize,
    pub doc_count: usize,
}

/// What the initial build did.
#[derive(Debug, Clone)]
pub struct InitReport {
    pub scan: ScanResult,
    pub errors: Vec<FileError>,
    pub analysis_time_ms: i64,
}

struct EngineState {
    graph: KnowledgeGraph,
    vectors: Box<dyn VectorProvider>,
    hashes: FileHashes,
}

/// One engine instance per project root. The state directory is owned
/// exclusively by this instance; the engine does not coordinate across
/// processes.
pub struct Engine {
    root: PathBuf,
    settings: Settings,
    classifier: IntentClassifier,
    persistence: Option<GraphPersistence>,
    state: RwLock<EngineState>,
    init_report: InitReport,
    flushed: std::sync::atomic::AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .field("init_report", &self.init_report)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Scan the project, build graph + index, and persist. Fatal only on
    /// configuration errors; per-file problems are accumulated in the
    /// init report.
    pub fn initialize(project_root: impl AsRef<Path>, settings: Settings) -> EngineResult<Self> {
        Self::initialize_with_cancel(project_root, settings, &CancellationToken::new())
    }

    /// Like [`Engine::initialize`], checking the token between files. A
    /// cancelled build returns `Err(Cancelled)` and leaves any previously
    /// persisted state untouched.
    pub fn initialize_with_cancel(
        project_root: impl AsRef<Path>,
        settings: Settings,
        cancel: &CancellationToken,
    ) -> EngineResult<Self> {
        let root = project_root.as_ref().to_path_buf();
        let started = Instant::now();

        let registry = ProviderRegistry::with_builtins();
        let providers = registry.build(&settings, &root)?;
        let scanner = Scanner::new(&root, &settings)?;
        let classifier = IntentClassifier::new(&settings.retriever.intent_keyword_map);

        // Warm-start from the persisted graph when the local provider is
        // configured; on any load problem we start empty.
        let mut graph = providers
            .persistence
            .as_ref()
            .and_then(|p| p.load())
            .unwrap_or_default();
        let mut vectors = providers.vectors;

        let scan = scanner.scan(cancel)?;
        let batch = analyze::analyze_batch(&root, &scan.files, cancel)?;

        // Drop graph entries for files that no longer exist on disk.
        let scanned: HashSet<&str> = scan.files.iter().map(String::as_str).collect();
        let stale: Vec<String> = graph
            .find_by_kind(NodeKind::File)
            .iter()
            .filter_map(|n| n.file_path())
            .filter(|p| !scanned.contains(p))
            .map(str::to_string)
            .collect();
        for path in stale {
            graph.remove_file(&path);
        }

        for analysis in batch.analyses {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if let Some(path) = analysis.nodes.first().and_then(|n| n.file_path()) {
                graph.remove_file(&path.to_string());
            }
            graph.ingest(analysis.nodes, analysis.relations);
        }

        for node in graph.nodes() {
            vectors.index_document(node.id.as_str(), &project_node(node), document_meta(node))?;
        }
        vectors.initialize()?;

        let analysis_time_ms = started.elapsed().as_millis() as i64;
        if let Some(persistence) = &providers.persistence {
            if let Err(err) = persistence.save(&graph, analysis_time_ms) {
                tracing::warn!("initial graph save failed, continuing in memory: {err}");
            }
        }

        tracing::info!(
            "indexed {} files ({} skipped) into {} nodes / {} edges in {}ms",
            scan.files.len(),
            scan.skipped,
            graph.node_count(),
            graph.edge_count(),
            analysis_time_ms,
        );

        Ok(Self {
            root,
            settings,
            classifier,
            persistence: providers.persistence,
            state: RwLock::new(EngineState {
                graph,
                vectors,
                hashes: FileHashes::new(),
            }),
            init_report: InitReport {
                scan,
                errors: batch.errors,
                analysis_time_ms,
            },
            flushed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn init_report(&self) -> &InitReport {
        &self.init_report
    }

    /// Apply one file-change notification. Takes the exclusive write guard;
    /// the graph is saved afterwards (a failed save logs and continues with
    /// in-memory state).
    pub fn on_file_change(&self, path: &str, kind: ChangeKind) -> EngineResult<UpdateOutcome> {
        let relative = self.relativize(path)?;
        let mut guard = self.state.write();
        let state = &mut *guard;
        let outcome = update::apply_change(
            &self.root,
            &relative,
            kind,
            &mut state.graph,
            &mut *state.vectors,
            &mut state.hashes,
        )?;

        if let Some(persistence) = &self.persistence {
            if let Err(err) = persistence.save(&state.graph, self.init_report.analysis_time_ms) {
                tracing::warn!("graph save failed after {kind:?} of {relative}: {err}");
            }
        }
        Ok(outcome)
    }

    /// Assemble a context bundle under a token budget.
    pub fn query(&self, utterance: &str, budget_tokens: usize) -> EngineResult<ContextBundle> {
        let mut options = QueryOptions::with_budget(budget_tokens);
        if self.settings.retriever.query_timeout_ms > 0 {
            options.timeout = Some(Duration::from_millis(self.settings.retriever.query_timeout_ms));
        }
        self.query_with_options(utterance, &options)
    }

    /// Query with the configured default budget.
    pub fn query_default(&self, utterance: &str) -> EngineResult<ContextBundle> {
        self.query(utterance, self.settings.retriever.default_budget_tokens)
    }

    pub fn query_with_options(
        &self,
        utterance: &str,
        options: &QueryOptions,
    ) -> EngineResult<ContextBundle> {
        let state = self.state.read();
        let builder = ContextBuilder::new(
            &state.graph,
            &*state.vectors,
            &self.settings.extractor,
            &self.classifier,
        );
        Ok(builder.build(utterance, options))
    }

    pub fn statistics(&self) -> EngineStats {
        let state = self.state.read();
        let graph_stats = state.graph.stats();
        let vector_stats = state.vectors.stats();
        EngineStats {
            nodes_by_kind: graph_stats.nodes_by_kind.clone(),
            edges_by_kind: graph_stats.edges_by_kind.clone(),
            vocab_size: vector_stats.vocab_size,
            doc_count: vector_stats.doc_count,
        }
    }

    /// Flush state and release resources.
    pub fn shutdown(self) -> EngineResult<()> {
        self.flush()?;
        let mut state = self.state.write();
        state.vectors.dispose();
        self.flushed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn flush(&self) -> EngineResult<()> {
        if let Some(persistence) = &self.persistence {
            let state = self.state.read();
            persistence.save(&state.graph, self.init_report.analysis_time_ms)?;
        }
        Ok(())
    }

    fn relativize(&self, path: &str) -> EngineResult<String> {
        let p = Path::new(path);
        if p.is_absolute() {
            crate::scan::relative_path(&self.root, p).ok_or_else(|| {
                EngineError::config(format!(
                    "path '{path}' lies outside the project root {}",
                    self.root.display()
                ))
            })
        } else {
            Ok(path.replace('\\', "/"))
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best-effort flush for handles dropped without an explicit
        // shutdown.
        if !self.flushed.load(std::sync::atomic::Ordering::SeqCst) {
            if let Err(err) = self.flush() {
                tracing::warn!("flush on drop failed: {err}");
            }
        }
    }
}
