//! Seed extraction from a user utterance.
//!
//! The retriever's L0 core is seeded by the union of:
//! - tokens that look like source file names (`auth.ts`, `src/graph.rs`)
//! - identifiers immediately following `function` / `class` / `method` / `api`
//! - the contents of single-, double- or backtick-quoted substrings
//! - PascalCase tokens
//!
//! plus plain tokens that exactly name a graph entity (resolved by the
//! caller). Seeds are deduplicated preserving discovery order.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static FILE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\w./-]+\.(?:tsx?|mts|cts|jsx?|mjs|cjs|rs|py|go|java|kt|rb|php|json|toml|yaml|yml|md)\b",
    )
    .expect("file token regex")
});

static KEYWORD_IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:function|class|method|api)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("keyword identifier regex")
});

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'([^']+)'|"([^"]+)"|`([^`]+)`"#).expect("quoted span regex")
});

static PASCAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").expect("pascal case regex")
});

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex"));

/// Pattern-extracted seed candidates, deduplicated in discovery order.
pub fn extract_seeds(utterance: &str) -> Vec<String> {
    let mut seeds = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if !candidate.is_empty() && seen.insert(candidate.to_string()) {
            seeds.push(candidate.to_string());
        }
    };

    for m in FILE_TOKEN_RE.find_iter(utterance) {
        push(m.as_str());
    }
    for caps in KEYWORD_IDENT_RE.captures_iter(utterance) {
        push(&caps[1]);
    }
    for caps in QUOTED_RE.captures_iter(utterance) {
        for group in [1, 2, 3] {
            if let Some(m) = caps.get(group) {
                push(m.as_str());
            }
        }
    }
    for m in PASCAL_RE.find_iter(utterance) {
        push(m.as_str());
    }

    seeds
}

/// Identifier-shaped tokens of the utterance, in order, for exact-name
/// entity matching. Single characters are noise and skipped.
pub fn utterance_tokens(utterance: &str) -> Vec<String> {
    IDENT_RE
        .find_iter(utterance)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_tokens() {
        let seeds = extract_seeds("why does src/auth.ts import config.json?");
        assert!(seeds.contains(&"src/auth.ts".to_string()));
        assert!(seeds.contains(&"config.json".to_string()));
    }

    #[test]
    fn test_keyword_identifiers() {
        let seeds = extract_seeds("explain function parseConfig and class Widget");
        assert!(seeds.contains(&"parseConfig".to_string()));
        assert!(seeds.contains(&"Widget".to_string()));
    }

    #[test]
    fn test_keyword_case_insensitive() {
        let seeds = extract_seeds("what does Method handleClick do");
        assert!(seeds.contains(&"handleClick".to_string()));
    }

    #[test]
    fn test_quoted_spans() {
        let seeds = extract_seeds(r#"look at 'login flow', "session store" and `refresh`"#);
        assert!(seeds.contains(&"login flow".to_string()));
        assert!(seeds.contains(&"session store".to_string()));
        assert!(seeds.contains(&"refresh".to_string()));
    }

    #[test]
    fn test_pascal_case() {
        let seeds = extract_seeds("how does HttpClient talk to RetryPolicy");
        assert!(seeds.contains(&"HttpClient".to_string()));
        assert!(seeds.contains(&"RetryPolicy".to_string()));
        // Single-hump capitalized words are ordinary prose.
        let seeds = extract_seeds("Explain the code");
        assert!(!seeds.contains(&"Explain".to_string()));
    }

    #[test]
    fn test_dedup_preserves_discovery_order() {
        let seeds = extract_seeds("class Widget uses Widget and 'Widget'");
        assert_eq!(seeds.iter().filter(|s| *s == "Widget").count(), 1);
        assert_eq!(seeds[0], "Widget");
    }

    #[test]
    fn test_no_seeds() {
        assert!(extract_seeds("how does this all work together").is_empty());
    }

    #[test]
    fn test_utterance_tokens() {
        assert_eq!(
            utterance_tokens("explain foo and _bar2"),
            vec!["explain", "foo", "and", "_bar2"]
        );
    }
}
