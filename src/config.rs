//! Layered configuration for the engine.
//!
//! Resolution order:
//! - Default values
//! - TOML file at `<root>/.contextengine/settings.toml`
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CTX_` and use double
//! underscores to separate nested levels:
//! - `CTX_SCAN__MAX_FILES=500` sets `scan.max_files`
//! - `CTX_RETRIEVER__DEFAULT_BUDGET_TOKENS=4000` sets `retriever.default_budget_tokens`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default name of the per-project state directory.
pub const DEFAULT_STATE_DIR: &str = ".contextengine";

/// Name of the persisted graph file inside the state directory.
pub const GRAPH_FILE_NAME: &str = "context_graph.json";

/// Name of the optional scan-ignore file inside the state directory.
pub const SCAN_IGNORE_FILE_NAME: &str = "scanignore";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Name of the state directory, relative to the project root.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub graph_provider: GraphProviderConfig,

    #[serde(default)]
    pub vector_provider: VectorProviderConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub retriever: RetrieverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    /// Ordered include globs. Defaults to a fixed set of source extensions.
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,

    /// Extra exclude globs layered on top of the builtin always-ignore set.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub respect_vcs_ignore: bool,

    #[serde(default = "default_true")]
    pub respect_scan_ignore: bool,

    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphProviderConfig {
    /// One of `local` (persisted) or `memory`.
    #[serde(default = "default_graph_provider")]
    pub r#type: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorProviderConfig {
    /// One of `tfidf` or `dense`.
    #[serde(default = "default_vector_provider")]
    pub r#type: String,

    /// Minimum document frequency for a term to enter the vocabulary.
    #[serde(default = "default_min_doc_freq")]
    pub min_doc_freq: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtractorConfig {
    /// One of `rag` (vector-led), `rule_based` (graph-led), or `hybrid`.
    #[serde(default = "default_extractor")]
    pub r#type: String,

    #[serde(default = "default_rag_weight")]
    pub rag_weight: f32,

    #[serde(default = "default_rule_weight")]
    pub rule_weight: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrieverConfig {
    #[serde(default = "default_budget_tokens")]
    pub default_budget_tokens: usize,

    /// Soft query timeout in milliseconds. 0 disables the timeout.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Overrides for the intent keyword map: intent name -> word set.
    #[serde(default)]
    pub intent_keyword_map: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter, e.g. `warn`, `info`, `ctxgraph=debug`.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_state_dir() -> String {
    DEFAULT_STATE_DIR.to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_files() -> usize {
    2000
}
fn default_max_file_bytes() -> u64 {
    1_048_576
}
fn default_graph_provider() -> String {
    "local".to_string()
}
fn default_vector_provider() -> String {
    "tfidf".to_string()
}
fn default_min_doc_freq() -> usize {
    2
}
fn default_extractor() -> String {
    "hybrid".to_string()
}
fn default_rag_weight() -> f32 {
    0.7
}
fn default_rule_weight() -> f32 {
    0.3
}
fn default_budget_tokens() -> usize {
    8000
}
fn default_query_timeout_ms() -> u64 {
    0
}
fn default_log_level() -> String {
    "warn".to_string()
}

fn default_include_patterns() -> Vec<String> {
    [
        "*.ts", "*.tsx", "*.mts", "*.cts", "*.js", "*.jsx", "*.mjs", "*.cjs", "*.rs", "*.py",
        "*.go", "*.java", "*.json", "*.toml", "*.yaml", "*.yml", "*.md",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            scan: ScanConfig::default(),
            graph_provider: GraphProviderConfig::default(),
            vector_provider: VectorProviderConfig::default(),
            extractor: ExtractorConfig::default(),
            retriever: RetrieverConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_patterns: default_include_patterns(),
            exclude_patterns: Vec::new(),
            respect_vcs_ignore: true,
            respect_scan_ignore: true,
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl Default for GraphProviderConfig {
    fn default() -> Self {
        Self {
            r#type: default_graph_provider(),
        }
    }
}

impl Default for VectorProviderConfig {
    fn default() -> Self {
        Self {
            r#type: default_vector_provider(),
            min_doc_freq: default_min_doc_freq(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            r#type: default_extractor(),
            rag_weight: default_rag_weight(),
            rule_weight: default_rule_weight(),
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            default_budget_tokens: default_budget_tokens(),
            query_timeout_ms: default_query_timeout_ms(),
            intent_keyword_map: HashMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings for a project root: defaults, then the TOML file in the
    /// state directory (if present), then `CTX_` environment overrides.
    pub fn load(project_root: &Path) -> Result<Self, figment::Error> {
        let config_path = project_root
            .join(DEFAULT_STATE_DIR)
            .join("settings.toml");

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore becomes a dot; single underscores stay part
            // of the field name.
            .merge(Env::prefixed("CTX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Load settings from a specific TOML file (plus env overrides).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CTX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Save current settings under the project's state directory.
    pub fn save(&self, project_root: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dir = project_root.join(&self.state_dir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("settings.toml");
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(&path, toml_string)?;
        Ok(path)
    }

    /// Absolute path of the state directory for a project root.
    pub fn state_dir_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.state_dir)
    }

    /// Absolute path of the persisted graph file.
    pub fn graph_file_path(&self, project_root: &Path) -> PathBuf {
        self.state_dir_path(project_root).join(GRAPH_FILE_NAME)
    }

    /// Absolute path of the optional scan-ignore file.
    pub fn scan_ignore_path(&self, project_root: &Path) -> PathBuf {
        self.state_dir_path(project_root).join(SCAN_IGNORE_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.state_dir, ".contextengine");
        assert_eq!(settings.scan.max_files, 2000);
        assert_eq!(settings.scan.max_file_bytes, 1_048_576);
        assert_eq!(settings.graph_provider.r#type, "local");
        assert_eq!(settings.vector_provider.r#type, "tfidf");
        assert_eq!(settings.vector_provider.min_doc_freq, 2);
        assert_eq!(settings.extractor.r#type, "hybrid");
        assert!((settings.extractor.rag_weight - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.retriever.default_budget_tokens, 8000);
        assert!(settings.scan.respect_vcs_ignore);
        assert!(settings.scan.respect_scan_ignore);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
state_dir = ".ctx"

[scan]
max_files = 100
include_patterns = ["*.ts"]
respect_vcs_ignore = false

[vector_provider]
type = "tfidf"
min_doc_freq = 3

[extractor]
type = "rag"

[retriever]
default_budget_tokens = 4000
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.state_dir, ".ctx");
        assert_eq!(settings.scan.max_files, 100);
        assert_eq!(settings.scan.include_patterns, vec!["*.ts"]);
        assert!(!settings.scan.respect_vcs_ignore);
        assert_eq!(settings.vector_provider.min_doc_freq, 3);
        assert_eq!(settings.extractor.r#type, "rag");
        assert_eq!(settings.retriever.default_budget_tokens, 4000);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[scan]\nmax_files = 7\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.scan.max_files, 7);
        // Everything else falls back to defaults.
        assert_eq!(settings.graph_provider.r#type, "local");
        assert_eq!(settings.retriever.default_budget_tokens, 8000);
    }

    #[test]
    fn test_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();

        let mut settings = Settings::default();
        settings.scan.max_files = 42;
        settings.retriever.default_budget_tokens = 1234;

        let path = settings.save(temp_dir.path()).unwrap();
        assert!(path.ends_with(".contextengine/settings.toml"));

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.scan.max_files, 42);
        assert_eq!(loaded.retriever.default_budget_tokens, 1234);
    }

    #[test]
    fn test_state_paths() {
        let settings = Settings::default();
        let root = Path::new("/proj");
        assert_eq!(
            settings.graph_file_path(root),
            PathBuf::from("/proj/.contextengine/context_graph.json")
        );
        assert_eq!(
            settings.scan_ignore_path(root),
            PathBuf::from("/proj/.contextengine/scanignore")
        );
    }

    #[test]
    fn test_intent_keyword_map_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[retriever.intent_keyword_map]
debugging = ["kaboom", "panic"]
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        let words = settings.retriever.intent_keyword_map.get("debugging").unwrap();
        assert!(words.contains(&"kaboom".to_string()));
    }
}
