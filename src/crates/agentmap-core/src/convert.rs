//! NodeSpec to Graph conversion
//!
//! Folds flat [`NodeSpec`] rows into [`Graph`] instances. Two pieces of
//! interpretation happen here and nowhere else:
//!
//! - The raw context cell becomes a typed map. Precedence: strict JSON
//!   object, then a single-quoted literal dict, then opaque text stored
//!   under a `"context"` key. Keys of a parsed mapping surface at the top
//!   level so agents read `context["routing_enabled"]` directly.
//! - Edge columns become labeled edges. Conditional routing wins: when a
//!   row carries `Success_Next` or `Failure_Next`, a plain `Edge` value on
//!   the same row is ignored (with a warning) rather than stored as
//!   `default`.

use crate::error::Result;
use crate::graph::{Graph, Node, DEFAULT_AGENT_TYPE, EDGE_DEFAULT, EDGE_FAILURE, EDGE_SUCCESS};
use crate::spec::{GraphSpec, NodeSpec};
use serde_json::{Map, Value};

/// Converter from parsed CSV rows to graph domain models
#[derive(Debug, Clone, Default)]
pub struct NodeSpecConverter;

impl NodeSpecConverter {
    pub fn new() -> Self {
        Self
    }

    /// Group every row by graph name and build [`Graph`] values with entry
    /// points computed. Entry point inference failures are deferred to the
    /// per-graph conversion so one bad graph does not block the others.
    pub fn convert_all(&self, spec: &GraphSpec) -> Vec<(String, Result<Graph>)> {
        spec.graph_names()
            .into_iter()
            .map(|name| (name.to_string(), self.convert_graph(spec, name)))
            .collect()
    }

    /// Build one named graph from the spec rows
    pub fn convert_graph(&self, spec: &GraphSpec, graph_name: &str) -> Result<Graph> {
        let mut graph = Graph::new(graph_name);
        for node_spec in spec.nodes_for_graph(graph_name) {
            graph.add_node(self.build_node(node_spec));
        }
        graph.validate_edges()?;
        graph.entry_point = Some(graph.compute_entry_point()?);
        Ok(graph)
    }

    fn build_node(&self, spec: &NodeSpec) -> Node {
        let mut node = Node::new(
            &spec.name,
            spec.agent_type.as_deref().unwrap_or(DEFAULT_AGENT_TYPE),
        );
        node.inputs = spec.input_fields.clone();
        node.output = spec.output_field.clone();
        node.prompt = spec.prompt.clone();
        node.description = spec.description.clone();
        node.context = parse_context_cell(spec.context.as_deref());
        node.tool_source = spec.tool_source.clone();
        node.available_tools = spec.available_tools.clone();

        let has_conditional = spec.success_next.is_some() || spec.failure_next.is_some();
        if let Some(success) = &spec.success_next {
            node.edges.insert(EDGE_SUCCESS.to_string(), success.clone());
        }
        if let Some(failure) = &spec.failure_next {
            node.edges.insert(EDGE_FAILURE.to_string(), failure.clone());
        }
        if let Some(edge) = &spec.edge {
            if has_conditional {
                tracing::warn!(
                    node = %spec.name,
                    line = spec.line_number,
                    "Edge is ignored because Success_Next/Failure_Next are present"
                );
            } else {
                node.edges.insert(EDGE_DEFAULT.to_string(), edge.clone());
            }
        }
        node
    }
}

/// Parse a context cell into a typed map.
///
/// Empty input yields an empty map. A JSON object or a single-quoted
/// literal dict is flattened to top-level keys; anything else lands under
/// the `"context"` key verbatim.
pub fn parse_context_cell(raw: Option<&str>) -> Map<String, Value> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Map::new();
    };

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
        return map;
    }

    if let Some(map) = parse_literal_dict(raw) {
        return map;
    }

    let mut map = Map::new();
    map.insert("context".to_string(), Value::String(raw.to_string()));
    map
}

/// Interpret a single-quoted literal dict such as
/// `{'provider': 'openai', 'routing_enabled': True}`.
///
/// The translation swaps quote style and literal keywords, then defers to
/// the JSON parser. Single quotes inside double-quoted strings survive.
fn parse_literal_dict(raw: &str) -> Option<Map<String, Value>> {
    if !raw.starts_with('{') || !raw.ends_with('}') {
        return None;
    }

    let mut translated = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                translated.push('"');
            }
            '"' if !in_single => {
                in_double = !in_double;
                translated.push('"');
            }
            '\\' => {
                translated.push(c);
                if let Some(next) = chars.next() {
                    translated.push(next);
                }
            }
            _ => translated.push(c),
        }
    }

    // Bare Python keywords outside strings
    let translated = translate_keywords(&translated);
    match serde_json::from_str::<Value>(&translated) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn translate_keywords(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut rest = s;
    while let Some(c) = rest.chars().next() {
        if c == '\\' {
            let take = c.len_utf8() + rest[c.len_utf8()..].chars().next().map_or(0, char::len_utf8);
            out.push_str(&rest[..take]);
            rest = &rest[take..];
            continue;
        }
        if c == '"' {
            in_string = !in_string;
        }
        if !in_string {
            let mut replaced = false;
            for (word, replacement) in [("True", "true"), ("False", "false"), ("None", "null")] {
                if rest.starts_with(word) {
                    let boundary = !rest[word.len()..]
                        .chars()
                        .next()
                        .is_some_and(|n| n.is_alphanumeric() || n == '_');
                    if boundary {
                        out.push_str(replacement);
                        rest = &rest[word.len()..];
                        replaced = true;
                        break;
                    }
                }
            }
            if replaced {
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::EdgeTarget;
    use serde_json::json;

    fn spec_with(nodes: Vec<NodeSpec>) -> GraphSpec {
        GraphSpec {
            file_path: "test.csv".into(),
            total_rows: nodes.len(),
            nodes,
        }
    }

    fn row(name: &str) -> NodeSpec {
        NodeSpec {
            graph_name: "G".into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_context_is_empty_map() {
        assert!(parse_context_cell(None).is_empty());
        assert!(parse_context_cell(Some("")).is_empty());
        assert!(parse_context_cell(Some("   ")).is_empty());
    }

    #[test]
    fn json_context_flattens_to_top_level() {
        let map = parse_context_cell(Some(r#"{"routing_enabled": true, "provider": "openai"}"#));
        assert_eq!(map["routing_enabled"], json!(true));
        assert_eq!(map["provider"], json!("openai"));
    }

    #[test]
    fn literal_dict_context_is_parsed() {
        let map = parse_context_cell(Some("{'provider': 'openai', 'routing_enabled': True}"));
        assert_eq!(map["provider"], json!("openai"));
        assert_eq!(map["routing_enabled"], json!(true));
    }

    #[test]
    fn literal_dict_with_none_and_false() {
        let map = parse_context_cell(Some("{'a': None, 'b': False, 'n': 3}"));
        assert_eq!(map["a"], Value::Null);
        assert_eq!(map["b"], json!(false));
        assert_eq!(map["n"], json!(3));
    }

    #[test]
    fn plain_text_lands_under_context_key() {
        let map = parse_context_cell(Some("remember the user name"));
        assert_eq!(map["context"], json!("remember the user name"));
    }

    #[test]
    fn invalid_json_falls_back_to_text() {
        let map = parse_context_cell(Some("{not json at all"));
        assert_eq!(map["context"], json!("{not json at all"));
    }

    #[test]
    fn json_array_is_not_a_context_object() {
        let map = parse_context_cell(Some("[1, 2, 3]"));
        assert_eq!(map["context"], json!("[1, 2, 3]"));
    }

    #[test]
    fn conditional_routing_wins_over_edge() {
        let mut a = row("A");
        a.edge = Some(EdgeTarget::Single("B".into()));
        a.success_next = Some(EdgeTarget::Single("S".into()));
        a.failure_next = Some(EdgeTarget::Single("F".into()));
        let spec = spec_with(vec![a, row("S"), row("F"), row("B")]);

        // B becomes a second root, so entry inference fails; build the node
        // directly to observe the edge precedence.
        let converter = NodeSpecConverter::new();
        let node = converter.build_node(&spec.nodes[0]);
        assert!(!node.edges.contains_key("default"));
        assert_eq!(node.edges["success"], EdgeTarget::Single("S".into()));
        assert_eq!(node.edges["failure"], EdgeTarget::Single("F".into()));
    }

    #[test]
    fn convert_graph_sets_entry_point() {
        let mut a = row("A");
        a.edge = Some(EdgeTarget::Single("B".into()));
        let spec = spec_with(vec![a, row("B")]);

        let graph = NodeSpecConverter::new().convert_graph(&spec, "G").unwrap();
        assert_eq!(graph.entry_point.as_deref(), Some("A"));
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes["A"].agent_type, "default");
    }

    #[test]
    fn convert_graph_rejects_dangling_edge() {
        let mut a = row("A");
        a.edge = Some(EdgeTarget::Single("Ghost".into()));
        let spec = spec_with(vec![a]);
        assert!(NodeSpecConverter::new().convert_graph(&spec, "G").is_err());
    }
}
