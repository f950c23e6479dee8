//! Error types for the context retrieval engine.
//!
//! Structured errors via thiserror, with recovery suggestions on the
//! top-level type. Only configuration errors at initialization are fatal to
//! the host; everything else is reported per-file or per-operation and the
//! engine continues.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type surfaced by the engine API.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration. Fatal at initialization.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Provider validation collected one or more offenses.
    #[error("Provider configuration rejected:\n{}", offenses.join("\n"))]
    InvalidProviders { offenses: Vec<String> },

    /// File system errors against project files or the state directory.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Analyzer failure on one file. Never aborts a batch.
    #[error("Failed to parse {language} file '{path}': {reason}")]
    Parse {
        path: PathBuf,
        language: String,
        reason: String,
    },

    /// External cancellation signal observed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invariant violation. The offending record is dropped and logged.
    #[error("Internal invariant violated: {reason}")]
    Internal { reason: String },
}

impl EngineError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Get recovery suggestions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Config { .. } | Self::InvalidProviders { .. } => vec![
                "Check .contextengine/settings.toml against the documented options",
                "Remove the offending key to fall back to the default",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::FileWrite { .. } => vec![
                "Check disk space and permissions in the state directory",
                "The in-memory state is intact; the save will be retried on the next change",
            ],
            Self::Parse { .. } => vec![
                "The file was recorded without symbols; fix the syntax error and re-scan",
            ],
            _ => vec![],
        }
    }
}

/// Per-file error recorded in a batch result.
#[derive(Debug, Clone)]
pub struct FileError {
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = EngineError::config("include pattern '[' is not a valid glob");
        assert!(err.to_string().contains("not a valid glob"));
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_provider_offense_listing() {
        let err = EngineError::InvalidProviders {
            offenses: vec![
                "unknown vector provider type 'faiss'".to_string(),
                "extractor weights must sum to 1.0 (got 1.2)".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("faiss"));
        assert!(msg.contains("sum to 1.0"));
    }
}
