//! Deterministic text rendering of a context bundle.
//!
//! Sections are headed `L0`..`L3`; entities are bulleted as `- <id>`; L0
//! additionally bullets its outgoing relations (truncated to 5). A
//! truncation notice, when present, precedes the trailing metadata line.

use crate::retrieve::{Layer, LayerContent};
use std::fmt::Write;

/// Maximum relations rendered under L0.
pub const RELATION_RENDER_CAP: usize = 5;

pub fn render(
    layers: &[LayerContent],
    tokens: usize,
    truncated: bool,
    truncation_reason: Option<&str>,
) -> String {
    let mut text = String::new();

    for content in layers {
        let _ = writeln!(text, "## {}", content.layer.title());
        for entity in &content.entities {
            let _ = writeln!(text, "- {entity}");
        }
        if content.layer == Layer::L0 {
            for relation in content.relations.iter().take(RELATION_RENDER_CAP) {
                let _ = writeln!(
                    text,
                    "- {} → {} ({})",
                    relation.src, relation.dst, relation.kind
                );
            }
        }
        if let Some(summary) = &content.summary {
            let _ = writeln!(text, "{summary}");
        }
        text.push('\n');
    }

    if truncated {
        let reason = truncation_reason.unwrap_or("budget exhausted");
        let _ = writeln!(text, "**Truncation Notice**: {reason}\n");
    }

    let _ = write!(
        text,
        "*Context generated using {tokens} tokens across {} layers*",
        layers.len()
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, RelationKind};
    use crate::retrieve::RelationView;

    fn l0() -> LayerContent {
        LayerContent {
            layer: Layer::L0,
            entities: vec![NodeId::function("a.ts", "foo")],
            relations: vec![RelationView {
                src: NodeId::function("a.ts", "foo"),
                dst: NodeId::raw("bar"),
                kind: RelationKind::Calls,
            }],
            summary: None,
            tokens: 70,
        }
    }

    #[test]
    fn test_render_sections_and_metadata() {
        let layers = vec![
            l0(),
            LayerContent {
                layer: Layer::L3,
                entities: vec![],
                relations: vec![],
                summary: Some("Project graph: 1 file.".to_string()),
                tokens: 7,
            },
        ];

        let text = render(&layers, 77, false, None);
        assert!(text.contains("## L0 Core"));
        assert!(text.contains("- function:a.ts:foo"));
        assert!(text.contains("- function:a.ts:foo → bar (CALLS)"));
        assert!(text.contains("## L3 Global"));
        assert!(text.contains("Project graph: 1 file."));
        assert!(text.ends_with("*Context generated using 77 tokens across 2 layers*"));
        assert!(!text.contains("Truncation Notice"));
    }

    #[test]
    fn test_truncation_notice_precedes_metadata() {
        let text = render(&[l0()], 70, true, Some("L1 omitted: over budget"));
        let notice = text.find("Truncation Notice").unwrap();
        let metadata = text.find("*Context generated").unwrap();
        assert!(notice < metadata);
        assert!(text.contains("L1 omitted"));
    }

    #[test]
    fn test_relation_render_cap() {
        let mut content = l0();
        content.relations = (0..10)
            .map(|i| RelationView {
                src: NodeId::function("a.ts", "foo"),
                dst: NodeId::raw(&format!("callee{i}")),
                kind: RelationKind::Calls,
            })
            .collect();

        let text = render(&[content], 0, false, None);
        let rendered = text.matches("(CALLS)").count();
        assert_eq!(rendered, RELATION_RENDER_CAP);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let layers = vec![l0()];
        assert_eq!(render(&layers, 1, false, None), render(&layers, 1, false, None));
    }
}
