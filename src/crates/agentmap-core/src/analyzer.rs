//! Static bundle analysis
//!
//! Turns a validated [`Graph`] plus the [`DeclarationRegistry`] into a
//! [`GraphBundle`]. Everything here reads metadata only; no agent or
//! service implementation is loaded, which keeps analysis fast even for
//! large graphs.

use crate::bundle::{GraphBundle, GraphStructure, ValidationMetadata, BUNDLE_FORMAT};
use crate::declarations::DeclarationRegistry;
use crate::error::Result;
use crate::graph::Graph;
use crate::spec::FunctionRef;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Analyzer producing portable bundles from graphs
pub struct StaticBundleAnalyzer<'a> {
    registry: &'a DeclarationRegistry,
}

impl<'a> StaticBundleAnalyzer<'a> {
    pub fn new(registry: &'a DeclarationRegistry) -> Self {
        Self { registry }
    }

    /// Analyze a graph against the declaration registry.
    ///
    /// `csv_bytes` are the exact bytes of the source CSV; their SHA-256
    /// becomes the bundle's content address.
    pub fn analyze(&self, graph: &Graph, csv_bytes: &[u8]) -> Result<GraphBundle> {
        graph.validate_edges()?;
        let entry_point = match &graph.entry_point {
            Some(entry) => entry.clone(),
            None => graph.compute_entry_point()?,
        };

        let agent_types: BTreeSet<String> = graph
            .nodes
            .values()
            .map(|node| node.agent_type.clone())
            .collect();

        let resolved = self.registry.resolve_agent_requirements(&agent_types);
        let service_load_order = self.registry.service_load_order(&resolved.services)?;
        // The closure may have pulled in transitive dependencies the BFS
        // already saw; load order is authoritative for "what gets built".
        let required_services: BTreeSet<String> =
            service_load_order.iter().cloned().collect();

        let mut agent_class_mappings = BTreeMap::new();
        for agent_type in &agent_types {
            if let Some(decl) = self.registry.agent(agent_type) {
                agent_class_mappings.insert(agent_type.clone(), decl.class_path.clone());
            }
        }

        // First provider in load order wins, deterministically
        let mut protocol_mappings: BTreeMap<String, String> = BTreeMap::new();
        for service_name in &service_load_order {
            if let Some(decl) = self.registry.service(service_name) {
                for protocol in &decl.implements_protocols {
                    protocol_mappings
                        .entry(protocol.clone())
                        .or_insert_with(|| service_name.clone());
                }
            }
        }

        let mut missing_declarations = resolved.missing;
        let mut function_mappings = BTreeMap::new();
        let mut function_edge_count = 0usize;
        for node in graph.nodes.values() {
            for target in node.edges.values() {
                for token in target.targets() {
                    if let Some(func) = FunctionRef::parse(token) {
                        function_edge_count += 1;
                        match self.registry.function(&func.name) {
                            Some(decl) => {
                                function_mappings
                                    .insert(func.name.clone(), decl.impl_path.clone());
                            }
                            None => {
                                missing_declarations.insert(format!("func:{}", func.name));
                            }
                        }
                    }
                }
            }
        }

        let graph_structure = GraphStructure {
            node_count: graph.nodes.len(),
            is_dag: !graph.has_cycles(),
            has_parallel_edges: graph.has_parallel_edges(),
            function_edge_count,
        };

        let mut validation = ValidationMetadata {
            is_valid: true,
            ..Default::default()
        };
        if !missing_declarations.is_empty() {
            validation.warnings.push(format!(
                "missing declarations: {}",
                missing_declarations
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if let Err(e) = graph.validate_reachability(&entry_point) {
            validation.is_valid = false;
            validation.errors.push(e.to_string());
        }

        Ok(GraphBundle {
            bundle_id: Uuid::new_v4().to_string(),
            graph_name: graph.name.clone(),
            csv_hash: csv_hash(csv_bytes),
            nodes: graph.nodes.clone(),
            entry_point,
            required_agents: agent_types,
            required_services,
            service_load_order,
            agent_class_mappings,
            protocol_mappings,
            function_mappings,
            missing_declarations,
            graph_structure,
            validation,
            created_at: Utc::now(),
            bundle_format: BUNDLE_FORMAT.to_string(),
        })
    }
}

/// Hex-encoded SHA-256 of the CSV bytes
pub fn csv_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::{
        AgentDeclaration, DeclarationRegistry, ServiceDeclaration, StaticDeclarationSource,
    };
    use crate::graph::{Node, EDGE_DEFAULT};
    use crate::spec::EdgeTarget;

    fn registry() -> DeclarationRegistry {
        let source = StaticDeclarationSource::new("builtin")
            .with_agent(
                AgentDeclaration::new("echo", "builtin.echo"),
            )
            .with_agent(
                AgentDeclaration::new("llm", "builtin.llm")
                    .with_required_services(&["llm_service"])
                    .with_protocols(&["llm"]),
            )
            .with_service(
                ServiceDeclaration::new("llm_service", "builtin.llm_service")
                    .with_required_deps(&["config_service"])
                    .with_protocols(&["llm"]),
            )
            .with_service(ServiceDeclaration::new(
                "config_service",
                "builtin.config_service",
            ))
            .with_function("pick", "builtin.pick");
        DeclarationRegistry::build(&[Box::new(source)]).unwrap()
    }

    fn linear_graph() -> Graph {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "echo");
        a.edges
            .insert(EDGE_DEFAULT.to_string(), EdgeTarget::Single("B".into()));
        graph.add_node(a);
        graph.add_node(Node::new("B", "llm"));
        graph
    }

    #[test]
    fn analyze_produces_complete_bundle() {
        let registry = registry();
        let analyzer = StaticBundleAnalyzer::new(&registry);
        let bundle = analyzer.analyze(&linear_graph(), b"csv-bytes").unwrap();

        assert_eq!(bundle.entry_point, "A");
        assert_eq!(
            bundle.required_agents,
            BTreeSet::from(["echo".to_string(), "llm".to_string()])
        );
        assert_eq!(
            bundle.service_load_order,
            vec!["config_service".to_string(), "llm_service".to_string()]
        );
        assert_eq!(bundle.required_services.len(), 2);
        assert_eq!(bundle.agent_class_mappings["llm"], "builtin.llm");
        assert_eq!(bundle.protocol_mappings["llm"], "llm_service");
        assert!(bundle.missing_declarations.is_empty());
        assert_eq!(bundle.graph_structure.node_count, 2);
        assert!(bundle.graph_structure.is_dag);
        assert_eq!(bundle.bundle_format, BUNDLE_FORMAT);
    }

    #[test]
    fn missing_agent_type_is_recorded_not_fatal() {
        let registry = registry();
        let analyzer = StaticBundleAnalyzer::new(&registry);
        let mut graph = Graph::new("G");
        graph.add_node(Node::new("A", "nonexistent"));

        let bundle = analyzer.analyze(&graph, b"x").unwrap();
        assert_eq!(
            bundle.missing_declarations,
            BTreeSet::from(["nonexistent".to_string()])
        );
        assert!(bundle.agent_class_mappings.is_empty());
    }

    #[test]
    fn function_edges_are_mapped_or_reported() {
        let registry = registry();
        let analyzer = StaticBundleAnalyzer::new(&registry);

        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "echo");
        a.edges.insert(
            EDGE_DEFAULT.to_string(),
            EdgeTarget::Single("func:pick(B,C)".into()),
        );
        graph.add_node(a);
        graph.add_node(Node::new("B", "echo"));
        graph.add_node(Node::new("C", "echo"));

        let bundle = analyzer.analyze(&graph, b"x").unwrap();
        assert_eq!(bundle.function_mappings["pick"], "builtin.pick");
        assert_eq!(bundle.graph_structure.function_edge_count, 1);

        let mut graph2 = Graph::new("G2");
        let mut a2 = Node::new("A", "echo");
        a2.edges.insert(
            EDGE_DEFAULT.to_string(),
            EdgeTarget::Single("func:unknown(B,C)".into()),
        );
        graph2.add_node(a2);
        graph2.add_node(Node::new("B", "echo"));
        graph2.add_node(Node::new("C", "echo"));

        let bundle2 = analyzer.analyze(&graph2, b"x").unwrap();
        assert!(bundle2.missing_declarations.contains("func:unknown"));
    }

    #[test]
    fn csv_hash_is_stable_hex_sha256() {
        let h = csv_hash(b"hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, csv_hash(b"hello"));
        assert_ne!(h, csv_hash(b"hello!"));
    }

    #[test]
    fn fresh_bundle_ids_per_analysis() {
        let registry = registry();
        let analyzer = StaticBundleAnalyzer::new(&registry);
        let graph = linear_graph();
        let a = analyzer.analyze(&graph, b"x").unwrap();
        let b = analyzer.analyze(&graph, b"x").unwrap();
        assert_ne!(a.bundle_id, b.bundle_id);
        assert_eq!(a.csv_hash, b.csv_hash);
        assert_eq!(a.service_load_order, b.service_load_order);
    }
}
