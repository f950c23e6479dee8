//! Deterministic intent classification of an utterance.
//!
//! A keyword matcher assigns a coarse label. The tag influences no ranking;
//! it rides along as bundle metadata for callers that adapt prompts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse intent label derived from utterance keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Development,
    Debugging,
    Analysis,
    Documentation,
    Testing,
    Refactoring,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Development => "development",
            Intent::Debugging => "debugging",
            Intent::Analysis => "analysis",
            Intent::Documentation => "documentation",
            Intent::Testing => "testing",
            Intent::Refactoring => "refactoring",
            Intent::General => "general",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "development" => Some(Intent::Development),
            "debugging" => Some(Intent::Debugging),
            "analysis" => Some(Intent::Analysis),
            "documentation" => Some(Intent::Documentation),
            "testing" => Some(Intent::Testing),
            "refactoring" => Some(Intent::Refactoring),
            "general" => Some(Intent::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tie-break precedence when several intents score equally.
const PRECEDENCE: [Intent; 6] = [
    Intent::Debugging,
    Intent::Testing,
    Intent::Refactoring,
    Intent::Documentation,
    Intent::Development,
    Intent::Analysis,
];

fn default_keywords(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Development => &[
            "implement", "add", "create", "build", "feature", "write", "support",
        ],
        Intent::Debugging => &[
            "debug", "bug", "error", "fix", "crash", "fail", "fails", "failing", "broken",
            "exception", "panic",
        ],
        Intent::Analysis => &[
            "explain", "understand", "analyze", "analyse", "what", "how", "why", "where", "trace",
        ],
        Intent::Documentation => &["document", "documentation", "docs", "readme", "describe"],
        Intent::Testing => &["test", "tests", "testing", "coverage", "mock", "assert"],
        Intent::Refactoring => &[
            "refactor", "rename", "cleanup", "restructure", "simplify", "reorganize",
        ],
        Intent::General => &[],
    }
}

/// Keyword matcher with optional per-intent overrides from configuration.
pub struct IntentClassifier {
    keywords: HashMap<Intent, Vec<String>>,
}

impl IntentClassifier {
    pub fn new(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut keywords = HashMap::new();
        for intent in PRECEDENCE {
            let words = overrides
                .get(intent.as_str())
                .map(|custom| custom.iter().map(|w| w.to_lowercase()).collect())
                .unwrap_or_else(|| {
                    default_keywords(intent)
                        .iter()
                        .map(|w| w.to_string())
                        .collect()
                });
            keywords.insert(intent, words);
        }
        // Overrides may name intents we would otherwise never match.
        for (name, words) in overrides {
            if let Some(intent) = Intent::from_name(name) {
                keywords.insert(intent, words.iter().map(|w| w.to_lowercase()).collect());
            }
        }
        Self { keywords }
    }

    /// Highest keyword-hit count wins; ties resolve by fixed precedence;
    /// no hits at all yield `general`.
    pub fn classify(&self, utterance: &str) -> Intent {
        let tokens: Vec<String> = utterance
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut best = Intent::General;
        let mut best_count = 0usize;
        for intent in PRECEDENCE {
            let Some(words) = self.keywords.get(&intent) else {
                continue;
            };
            let count = tokens.iter().filter(|t| words.contains(t)).count();
            if count > best_count {
                best = intent;
                best_count = count;
            }
        }
        best
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification() {
        let classifier = IntentClassifier::default();
        assert_eq!(classifier.classify("explain foo"), Intent::Analysis);
        assert_eq!(classifier.classify("fix the login crash"), Intent::Debugging);
        assert_eq!(
            classifier.classify("add coverage for the parser tests"),
            Intent::Testing
        );
        assert_eq!(
            classifier.classify("rename the session module"),
            Intent::Refactoring
        );
        assert_eq!(
            classifier.classify("write a readme section"),
            Intent::Documentation
        );
        assert_eq!(classifier.classify("implement dark mode"), Intent::Development);
        assert_eq!(classifier.classify("hello there"), Intent::General);
    }

    #[test]
    fn test_tie_break_precedence() {
        let classifier = IntentClassifier::default();
        // `add` (development) vs `test` (testing): testing wins the tie.
        assert_eq!(classifier.classify("add a test"), Intent::Testing);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("debugging".to_string(), vec!["kaboom".to_string()]);
        let classifier = IntentClassifier::new(&overrides);

        assert_eq!(classifier.classify("kaboom in prod"), Intent::Debugging);
        // The default word set for debugging was replaced wholesale.
        assert_eq!(classifier.classify("debug this"), Intent::General);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = IntentClassifier::default();
        let a = classifier.classify("why does the test fail");
        let b = classifier.classify("why does the test fail");
        assert_eq!(a, b);
    }
}
