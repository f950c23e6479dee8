//! TypeScript/JavaScript analyzer built on tree-sitter.
//!
//! One recursive walk over the syntax tree produces function/class/method
//! nodes plus IMPORTS, CALLS, CONTAINS, REFERENCES, IMPLEMENTS and
//! INSTANTIATES edges. Anonymous functions and lambdas produce no node of
//! their own; edges found inside them attach to the nearest named ancestor,
//! or to the file when there is none.

use crate::analyze::{FileAnalysis, LanguageAnalyzer, MAX_AST_DEPTH};
use crate::types::{
    CallStyle, ClassNode, FunctionNode, Node as GraphNode, NodeData, NodeId, RefKind, Relation,
    RelationKind, RelationPayload, RelTarget, Visibility,
};
use std::collections::HashMap;
use tree_sitter::{Node, Parser};

/// Analyzer for TypeScript and JavaScript sources.
pub struct TypeScriptAnalyzer {
    parser: Parser,
    language: &'static str,
}

impl TypeScriptAnalyzer {
    /// Create an analyzer for TypeScript sources.
    pub fn new() -> Result<Self, String> {
        Self::for_language("typescript")
    }

    /// Create an analyzer for a language tag (`typescript` or `javascript`).
    pub fn for_language(language: &'static str) -> Result<Self, String> {
        let mut parser = Parser::new();
        let grammar = match language {
            "typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            "javascript" => tree_sitter_javascript::LANGUAGE.into(),
            other => return Err(format!("no grammar for language '{other}'")),
        };
        parser
            .set_language(&grammar)
            .map_err(|e| format!("failed to set {language} grammar: {e}"))?;
        Ok(Self { parser, language })
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language(&self) -> &'static str {
        self.language
    }

    fn analyze(
        &mut self,
        relative_path: &str,
        code: &str,
        file_id: &NodeId,
    ) -> Result<FileAnalysis, String> {
        let tree = self
            .parser
            .parse(code, None)
            .ok_or_else(|| "tree-sitter produced no tree".to_string())?;

        let mut walker = Walker {
            rel_path: relative_path,
            code,
            file_id: file_id.clone(),
            ids: IdAllocator::default(),
            fn_stack: Vec::new(),
            class_stack: Vec::new(),
            out: FileAnalysis::default(),
        };
        walker.walk(tree.root_node(), false, 0);
        Ok(walker.out)
    }
}

/// Allocates deterministic ids, appending `#N` when a qualified name repeats
/// within the file (first occurrence unsuffixed, second gets `#2`, ...).
#[derive(Default)]
struct IdAllocator {
    counts: HashMap<String, u32>,
}

impl IdAllocator {
    fn alloc(&mut self, base: NodeId) -> NodeId {
        let count = self.counts.entry(base.as_str().to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            NodeId::raw(&format!("{base}#{count}"))
        }
    }
}

struct Walker<'a> {
    rel_path: &'a str,
    code: &'a str,
    file_id: NodeId,
    ids: IdAllocator,
    /// Named enclosing functions/methods, innermost last.
    fn_stack: Vec<NodeId>,
    /// Enclosing classes: (name, node id), innermost last.
    class_stack: Vec<(String, NodeId)>,
    out: FileAnalysis,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> &'a str {
        &self.code[node.byte_range()]
    }

    fn line(&self, node: Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn end_line(&self, node: Node) -> u32 {
        node.end_position().row as u32 + 1
    }

    /// The node hosting edges discovered at this point of the walk.
    fn host(&self) -> NodeId {
        self.fn_stack
            .last()
            .cloned()
            .unwrap_or_else(|| self.file_id.clone())
    }

    fn walk(&mut self, node: Node, exported: bool, depth: usize) {
        if depth > MAX_AST_DEPTH {
            tracing::debug!(
                "max AST depth exceeded in {} at line {}",
                self.rel_path,
                self.line(node)
            );
            return;
        }

        match node.kind() {
            "export_statement" => {
                for child in node.children(&mut node.walk()) {
                    self.walk(child, true, depth + 1);
                }
            }
            "import_statement" => self.handle_import(node),
            "function_declaration" | "generator_function_declaration" => {
                self.handle_function(node, exported, depth);
            }
            "class_declaration" => self.handle_class(node, exported, depth),
            "method_definition" => self.handle_method(node, depth),
            "variable_declarator" => self.handle_declarator(node, exported, depth),
            "call_expression" => self.handle_call(node, depth),
            "new_expression" => self.handle_new(node, depth),
            "member_expression" => self.handle_member(node, depth),
            "identifier" => self.handle_identifier(node),
            "type_identifier" => self.handle_type_identifier(node),
            "comment" | "string" | "template_string" => {}
            _ => {
                for child in node.children(&mut node.walk()) {
                    self.walk(child, exported, depth + 1);
                }
            }
        }
    }

    fn handle_import(&mut self, node: Node) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let specifier = self.text(source).trim_matches(['\'', '"', '`']).to_string();

        let mut imported_names = Vec::new();
        let mut default = false;
        let mut cursor = node.walk();
        if let Some(clause) = node
            .children(&mut cursor)
            .find(|n| n.kind() == "import_clause")
        {
            for child in clause.children(&mut clause.walk()) {
                match child.kind() {
                    "identifier" => {
                        imported_names.push(self.text(child).to_string());
                        default = true;
                    }
                    "named_imports" => {
                        for spec in child.children(&mut child.walk()) {
                            if spec.kind() == "import_specifier" {
                                if let Some(name) = spec.child_by_field_name("name") {
                                    imported_names.push(self.text(name).to_string());
                                }
                            }
                        }
                    }
                    "namespace_import" => {
                        for inner in child.children(&mut child.walk()) {
                            if inner.kind() == "identifier" {
                                imported_names.push(self.text(inner).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        self.out.relations.push(
            Relation::new(
                RelationKind::Imports,
                self.file_id.clone(),
                RelTarget::Name(specifier),
            )
            .at(self.rel_path, self.line(node))
            .with_payload(RelationPayload::Import {
                imported_names,
                default,
            }),
        );
    }

    fn handle_function(&mut self, node: Node, exported: bool, depth: usize) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            // Anonymous: host edges via the enclosing named ancestor.
            None => {
                self.walk_body(node, depth);
                return;
            }
        };

        let id = self.ids.alloc(NodeId::function(self.rel_path, &name));
        let params = self.param_names(node);
        self.out.nodes.push(GraphNode {
            id: id.clone(),
            data: NodeData::Function(FunctionNode {
                name,
                file_path: self.rel_path.to_string(),
                class_name: None,
                params,
                line_start: self.line(node),
                line_end: self.end_line(node),
                exported,
                is_async: has_keyword_child(node, "async"),
                visibility: None,
                doc: self.doc_comment(node),
            }),
        });
        self.out.relations.push(
            Relation::new(
                RelationKind::Contains,
                self.file_id.clone(),
                RelTarget::Id(id.clone()),
            )
            .at(self.rel_path, self.line(node)),
        );

        self.fn_stack.push(id);
        self.walk_body(node, depth);
        self.fn_stack.pop();
    }

    fn handle_class(&mut self, node: Node, exported: bool, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            self.walk_body(node, depth);
            return;
        };
        let name = self.text(name_node).to_string();
        let id = self.ids.alloc(NodeId::class(self.rel_path, &name));

        let (parent_class, interfaces) = self.class_heritage(node);
        self.out.nodes.push(GraphNode {
            id: id.clone(),
            data: NodeData::Class(ClassNode {
                name: name.clone(),
                file_path: self.rel_path.to_string(),
                line_start: self.line(node),
                line_end: self.end_line(node),
                exported,
                parent_class: parent_class.clone(),
                interfaces: interfaces.clone(),
                doc: self.doc_comment(node),
            }),
        });
        self.out.relations.push(
            Relation::new(
                RelationKind::Contains,
                self.file_id.clone(),
                RelTarget::Id(id.clone()),
            )
            .at(self.rel_path, self.line(node)),
        );
        // One IMPLEMENTS edge per inherited interface or base class.
        for target in parent_class.into_iter().chain(interfaces) {
            self.out.relations.push(
                Relation::new(RelationKind::Implements, id.clone(), RelTarget::Name(target))
                    .at(self.rel_path, self.line(node)),
            );
        }

        self.class_stack.push((name, id));
        if let Some(body) = node.child_by_field_name("body") {
            for child in body.children(&mut body.walk()) {
                self.walk(child, false, depth + 1);
            }
        }
        self.class_stack.pop();
    }

    fn handle_method(&mut self, node: Node, depth: usize) {
        let Some((class_name, class_id)) = self.class_stack.last().cloned() else {
            self.walk_body(node, depth);
            return;
        };
        let name = match node.child_by_field_name("name") {
            Some(n) if n.kind() == "property_identifier" => self.text(n).to_string(),
            // Computed or string keys stay anonymous.
            _ => {
                self.walk_body(node, depth);
                return;
            }
        };

        let id = self
            .ids
            .alloc(NodeId::method(self.rel_path, &class_name, &name));
        self.out.nodes.push(GraphNode {
            id: id.clone(),
            data: NodeData::Function(FunctionNode {
                name,
                file_path: self.rel_path.to_string(),
                class_name: Some(class_name),
                params: self.param_names(node),
                line_start: self.line(node),
                line_end: self.end_line(node),
                exported: false,
                is_async: has_keyword_child(node, "async"),
                visibility: self.method_visibility(node),
                doc: self.doc_comment(node),
            }),
        });
        self.out.relations.push(
            Relation::new(RelationKind::Contains, class_id, RelTarget::Id(id.clone()))
                .at(self.rel_path, self.line(node)),
        );

        self.fn_stack.push(id);
        self.walk_body(node, depth);
        self.fn_stack.pop();
    }

    /// `const foo = () => {}` declares a function named by the declarator.
    fn handle_declarator(&mut self, node: Node, exported: bool, depth: usize) {
        let name_node = node.child_by_field_name("name");
        let value = node.child_by_field_name("value");

        if let (Some(name_node), Some(value)) = (name_node, value) {
            if name_node.kind() == "identifier"
                && matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function"
                )
            {
                let name = self.text(name_node).to_string();
                let id = self.ids.alloc(NodeId::function(self.rel_path, &name));
                self.out.nodes.push(GraphNode {
                    id: id.clone(),
                    data: NodeData::Function(FunctionNode {
                        name,
                        file_path: self.rel_path.to_string(),
                        class_name: None,
                        params: self.param_names(value),
                        line_start: self.line(node),
                        line_end: self.end_line(node),
                        exported,
                        is_async: has_keyword_child(value, "async"),
                        visibility: None,
                        doc: self.doc_comment(node),
                    }),
                });
                self.out.relations.push(
                    Relation::new(
                        RelationKind::Contains,
                        self.file_id.clone(),
                        RelTarget::Id(id.clone()),
                    )
                    .at(self.rel_path, self.line(node)),
                );

                self.fn_stack.push(id);
                self.walk(value, false, depth + 1);
                self.fn_stack.pop();
                return;
            }
        }

        // Ordinary declarator: the name is a declaration site, the value an
        // expression worth walking.
        if let Some(value) = node.child_by_field_name("value") {
            self.walk(value, false, depth + 1);
        }
    }

    fn handle_call(&mut self, node: Node, depth: usize) {
        if let Some(callee) = node.child_by_field_name("function") {
            let target = match callee.kind() {
                "identifier" => Some((self.text(callee).to_string(), CallStyle::Direct)),
                "member_expression" => callee
                    .child_by_field_name("property")
                    .map(|p| (self.text(p).to_string(), CallStyle::Method)),
                _ => None,
            };
            match target {
                Some((name, style)) => {
                    self.out.relations.push(
                        Relation::new(RelationKind::Calls, self.host(), RelTarget::Name(name))
                            .at(self.rel_path, self.line(node))
                            .with_payload(RelationPayload::Call { style }),
                    );
                    // The object side of a member callee still carries
                    // references and nested calls.
                    if callee.kind() == "member_expression" {
                        if let Some(object) = callee.child_by_field_name("object") {
                            self.walk(object, false, depth + 1);
                        }
                    }
                }
                // Chained or computed callees host calls of their own.
                None => self.walk(callee, false, depth + 1),
            }
        }
        if let Some(args) = node.child_by_field_name("arguments") {
            for child in args.children(&mut args.walk()) {
                self.walk(child, false, depth + 1);
            }
        }
    }

    fn handle_new(&mut self, node: Node, depth: usize) {
        if let Some(ctor) = node.child_by_field_name("constructor") {
            if matches!(ctor.kind(), "identifier" | "type_identifier") {
                let name = self.text(ctor).to_string();
                let host = self.host();
                self.out.relations.push(
                    Relation::new(
                        RelationKind::Calls,
                        host.clone(),
                        RelTarget::Name(name.clone()),
                    )
                    .at(self.rel_path, self.line(node))
                    .with_payload(RelationPayload::Call {
                        style: CallStyle::Constructor,
                    }),
                );
                self.out.relations.push(
                    Relation::new(RelationKind::Instantiates, host, RelTarget::Name(name))
                        .at(self.rel_path, self.line(node)),
                );
            }
        }
        if let Some(args) = node.child_by_field_name("arguments") {
            for child in args.children(&mut args.walk()) {
                self.walk(child, false, depth + 1);
            }
        }
    }

    fn handle_member(&mut self, node: Node, depth: usize) {
        if let Some(property) = node.child_by_field_name("property") {
            self.out.relations.push(
                Relation::new(
                    RelationKind::References,
                    self.host(),
                    RelTarget::Name(self.text(property).to_string()),
                )
                .at(self.rel_path, self.line(property))
                .with_payload(RelationPayload::Reference {
                    ref_kind: RefKind::Property,
                }),
            );
        }
        if let Some(object) = node.child_by_field_name("object") {
            self.walk(object, false, depth + 1);
        }
    }

    fn handle_identifier(&mut self, node: Node) {
        let Some(parent) = node.parent() else { return };

        // Declaration, callee, parameter and property-name sites reference
        // nothing by themselves.
        let is_name_of = |field: &str| {
            parent
                .child_by_field_name(field)
                .is_some_and(|n| n.id() == node.id())
        };
        match parent.kind() {
            "function_declaration"
            | "generator_function_declaration"
            | "class_declaration"
            | "method_definition" => {
                if is_name_of("name") {
                    return;
                }
            }
            "variable_declarator" => {
                if is_name_of("name") {
                    return;
                }
                // The value side of a declarator reads another variable.
                self.push_reference(node, RefKind::Variable);
                return;
            }
            "call_expression" => {
                if is_name_of("function") {
                    return;
                }
            }
            "new_expression" => {
                if is_name_of("constructor") {
                    return;
                }
            }
            "formal_parameters"
            | "required_parameter"
            | "optional_parameter"
            | "rest_pattern"
            | "import_specifier"
            | "namespace_import"
            | "import_clause"
            | "pair"
            | "labeled_statement"
            | "statement_identifier"
            | "property_signature" => return,
            "assignment_pattern" => {
                if is_name_of("left") {
                    return;
                }
            }
            _ => {}
        }

        self.push_reference(node, RefKind::Identifier);
    }

    fn handle_type_identifier(&mut self, node: Node) {
        // Class names and heritage clauses are declaration sites; heritage
        // already produced IMPLEMENTS edges.
        if let Some(parent) = node.parent() {
            if matches!(
                parent.kind(),
                "class_declaration"
                    | "extends_clause"
                    | "implements_clause"
                    | "class_heritage"
                    | "interface_declaration"
                    | "type_alias_declaration"
            ) {
                return;
            }
        }
        self.push_reference(node, RefKind::Type);
    }

    fn push_reference(&mut self, node: Node, ref_kind: RefKind) {
        self.out.relations.push(
            Relation::new(
                RelationKind::References,
                self.host(),
                RelTarget::Name(self.text(node).to_string()),
            )
            .at(self.rel_path, self.line(node))
            .with_payload(RelationPayload::Reference { ref_kind }),
        );
    }

    /// Walk the body (or every child when there is no body field).
    fn walk_body(&mut self, node: Node, depth: usize) {
        if let Some(body) = node.child_by_field_name("body") {
            for child in body.children(&mut body.walk()) {
                self.walk(child, false, depth + 1);
            }
        } else {
            for child in node.children(&mut node.walk()) {
                self.walk(child, false, depth + 1);
            }
        }
    }

    fn param_names(&self, node: Node) -> Vec<String> {
        let Some(params) = node.child_by_field_name("parameters") else {
            // Single-parameter arrow functions: `x => x + 1`.
            return node
                .child_by_field_name("parameter")
                .map(|p| vec![self.text(p).to_string()])
                .unwrap_or_default();
        };
        let mut names = Vec::new();
        for child in params.children(&mut params.walk()) {
            match child.kind() {
                "identifier" => names.push(self.text(child).to_string()),
                "required_parameter" | "optional_parameter" => {
                    if let Some(pattern) = child.child_by_field_name("pattern") {
                        if pattern.kind() == "identifier" {
                            names.push(self.text(pattern).to_string());
                        }
                    }
                }
                "assignment_pattern" => {
                    if let Some(left) = child.child_by_field_name("left") {
                        if left.kind() == "identifier" {
                            names.push(self.text(left).to_string());
                        }
                    }
                }
                "rest_pattern" => {
                    for inner in child.children(&mut child.walk()) {
                        if inner.kind() == "identifier" {
                            names.push(self.text(inner).to_string());
                        }
                    }
                }
                // Destructuring patterns carry no single name.
                _ => {}
            }
        }
        names
    }

    /// (parent class, implemented interfaces) from the heritage clause.
    fn class_heritage(&self, node: Node) -> (Option<String>, Vec<String>) {
        let mut parent_class = None;
        let mut interfaces = Vec::new();

        let mut cursor = node.walk();
        let Some(heritage) = node
            .children(&mut cursor)
            .find(|n| n.kind() == "class_heritage")
        else {
            return (parent_class, interfaces);
        };

        for child in heritage.children(&mut heritage.walk()) {
            match child.kind() {
                "extends_clause" => {
                    parent_class = first_name_in(child, self.code);
                }
                "implements_clause" => {
                    collect_names_in(child, self.code, &mut interfaces);
                }
                // JavaScript grammar: `class_heritage` is `extends <expr>`.
                "identifier" => parent_class = Some(self.code[child.byte_range()].to_string()),
                _ => {}
            }
        }
        (parent_class, interfaces)
    }

    fn method_visibility(&self, node: Node) -> Option<Visibility> {
        for child in node.children(&mut node.walk()) {
            if child.kind() == "accessibility_modifier" {
                return match self.text(child) {
                    "public" => Some(Visibility::Public),
                    "private" => Some(Visibility::Private),
                    "protected" => Some(Visibility::Protected),
                    _ => None,
                };
            }
        }
        None
    }

    /// JSDoc-style block comment immediately preceding the declaration (or
    /// its wrapping export statement).
    fn doc_comment(&self, node: Node) -> Option<String> {
        let mut anchor = node;
        if let Some(parent) = node.parent() {
            if parent.kind() == "export_statement" || parent.kind() == "lexical_declaration" {
                anchor = parent;
                if let Some(grand) = parent.parent() {
                    if grand.kind() == "export_statement" {
                        anchor = grand;
                    }
                }
            }
        }
        let prev = anchor.prev_sibling()?;
        if prev.kind() != "comment" {
            return None;
        }
        let text = self.text(prev);
        if !text.starts_with("/**") {
            return None;
        }
        let body = text
            .trim_start_matches("/**")
            .trim_end_matches("*/")
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        (!body.is_empty()).then_some(body)
    }
}

fn has_keyword_child(node: Node, keyword: &str) -> bool {
    node.children(&mut node.walk()).any(|c| c.kind() == keyword)
}

fn first_name_in(node: Node, code: &str) -> Option<String> {
    let mut names = Vec::new();
    collect_names_in(node, code, &mut names);
    names.into_iter().next()
}

fn collect_names_in(node: Node, code: &str, out: &mut Vec<String>) {
    if matches!(node.kind(), "identifier" | "type_identifier") {
        out.push(code[node.byte_range()].to_string());
        return;
    }
    for child in node.children(&mut node.walk()) {
        collect_names_in(child, code, out);
    }
}
