//! Graph domain model
//!
//! A [`Graph`] is the structured form of a CSV workflow: named nodes with
//! typed context and labeled edges. Structural analysis lives here: entry
//! point inference, dangling edge detection, reachability, cycle and
//! parallel-edge detection, and join-node computation for fan-outs.

use crate::error::{AgentMapError, Result};
use crate::spec::{EdgeTarget, FunctionRef, OutputField};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Edge label for an unconditional transition
pub const EDGE_DEFAULT: &str = "default";
/// Edge label taken when the previous action succeeded
pub const EDGE_SUCCESS: &str = "success";
/// Edge label taken when the previous action failed
pub const EDGE_FAILURE: &str = "failure";

/// Agent type assumed when a row omits `AgentType`
pub const DEFAULT_AGENT_TYPE: &str = "default";

/// One executable node of a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub agent_type: String,
    pub inputs: Vec<String>,
    pub output: Option<OutputField>,
    pub prompt: Option<String>,
    pub description: Option<String>,
    /// Typed context parsed from the CSV context cell
    pub context: serde_json::Map<String, serde_json::Value>,
    /// Label to target(s); labels are `default`, `success`, `failure`
    pub edges: BTreeMap<String, EdgeTarget>,
    pub tool_source: Option<String>,
    pub available_tools: Vec<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent_type: agent_type.into(),
            inputs: Vec::new(),
            output: None,
            prompt: None,
            description: None,
            context: serde_json::Map::new(),
            edges: BTreeMap::new(),
            tool_source: None,
            available_tools: Vec::new(),
        }
    }

    /// Node names this node can transition to (function tokens excluded,
    /// but their embedded success/failure targets included)
    pub fn edge_targets(&self) -> Vec<String> {
        let mut targets = Vec::new();
        for target in self.edges.values() {
            for token in target.targets() {
                match FunctionRef::parse(token) {
                    Some(func) => {
                        targets.push(func.success_target);
                        targets.push(func.failure_target);
                    }
                    None => targets.push(token.to_string()),
                }
            }
        }
        targets
    }

    /// Whether any edge fans out to parallel targets
    pub fn has_parallel_edge(&self) -> bool {
        self.edges.values().any(EdgeTarget::is_parallel)
    }
}

/// A named workflow graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    pub nodes: BTreeMap<String, Node>,
    pub entry_point: Option<String>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// Infer the entry point: the single node referenced by no edge.
    ///
    /// Zero or more than one candidate is an [`AgentMapError::AmbiguousEntryPoint`].
    pub fn compute_entry_point(&self) -> Result<String> {
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for node in self.nodes.values() {
            referenced.extend(node.edge_targets());
        }
        let candidates: Vec<String> = self
            .nodes
            .keys()
            .filter(|name| !referenced.contains(*name))
            .cloned()
            .collect();

        match candidates.as_slice() {
            [single] => Ok(single.clone()),
            _ => Err(AgentMapError::AmbiguousEntryPoint {
                graph: self.name.clone(),
                candidates,
            }),
        }
    }

    /// Check that every edge target exists in this graph
    pub fn validate_edges(&self) -> Result<()> {
        for node in self.nodes.values() {
            for target in node.edge_targets() {
                if !self.nodes.contains_key(&target) {
                    return Err(AgentMapError::DanglingEdge {
                        node: node.name.clone(),
                        target,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that every node can be reached from the entry point
    pub fn validate_reachability(&self, entry_point: &str) -> Result<()> {
        let reachable = self.reachable_from(entry_point);
        for name in self.nodes.keys() {
            if !reachable.contains(name) {
                return Err(AgentMapError::UnreachableNode {
                    graph: self.name.clone(),
                    node: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Nodes reachable from `start` (inclusive), breadth-first
    pub fn reachable_from(&self, start: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for target in node.edge_targets() {
                    if !seen.contains(&target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        seen
    }

    /// Whether the node edge graph contains a cycle
    pub fn has_cycles(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        fn visit<'a>(
            graph: &'a Graph,
            node: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
        ) -> bool {
            match marks.get(node) {
                Some(Mark::InProgress) => return true,
                Some(Mark::Done) => return false,
                None => {}
            }
            marks.insert(node, Mark::InProgress);
            if let Some(n) = graph.nodes.get(node) {
                for target in n.edge_targets() {
                    if let Some((key, _)) = graph.nodes.get_key_value(&target) {
                        if visit(graph, key, marks) {
                            return true;
                        }
                    }
                }
            }
            marks.insert(node, Mark::Done);
            false
        }

        self.nodes
            .keys()
            .any(|name| visit(self, name, &mut marks))
    }

    /// Whether any node fans out in parallel
    pub fn has_parallel_edges(&self) -> bool {
        self.nodes.values().any(Node::has_parallel_edge)
    }

    /// First node reachable by every branch of a fan-out, where branches
    /// merge. `None` when the branches never converge (each runs to
    /// termination).
    ///
    /// "First" is measured by breadth-first depth from the first branch,
    /// which makes the choice deterministic.
    pub fn join_node(&self, branches: &[String]) -> Option<String> {
        if branches.len() < 2 {
            return None;
        }
        let reachable: Vec<BTreeSet<String>> = branches
            .iter()
            .map(|b| self.reachable_from(b))
            .collect();

        // BFS order from the first branch, skipping the branch entry nodes
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([branches[0].clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let is_branch_entry = branches.contains(&current);
            if !is_branch_entry && reachable.iter().all(|set| set.contains(&current)) {
                return Some(current);
            }
            if let Some(node) = self.nodes.get(&current) {
                for target in node.edge_targets() {
                    queue.push_back(target);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_edge(name: &str, label: &str, target: EdgeTarget) -> Node {
        let mut node = Node::new(name, "echo");
        node.edges.insert(label.to_string(), target);
        node
    }

    fn linear_graph() -> Graph {
        let mut graph = Graph::new("G");
        graph.add_node(node_with_edge("A", EDGE_DEFAULT, EdgeTarget::Single("B".into())));
        graph.add_node(node_with_edge("B", EDGE_DEFAULT, EdgeTarget::Single("C".into())));
        graph.add_node(Node::new("C", "echo"));
        graph
    }

    #[test]
    fn entry_point_is_unreferenced_node() {
        let graph = linear_graph();
        assert_eq!(graph.compute_entry_point().unwrap(), "A");
    }

    #[test]
    fn two_roots_are_ambiguous() {
        let mut graph = linear_graph();
        graph.add_node(Node::new("Orphan", "echo"));
        let err = graph.compute_entry_point().unwrap_err();
        match err {
            AgentMapError::AmbiguousEntryPoint { candidates, .. } => {
                assert_eq!(candidates, vec!["A".to_string(), "Orphan".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dangling_edge_detected() {
        let mut graph = Graph::new("G");
        graph.add_node(node_with_edge("A", EDGE_DEFAULT, EdgeTarget::Single("Ghost".into())));
        let err = graph.validate_edges().unwrap_err();
        assert!(matches!(err, AgentMapError::DanglingEdge { .. }));
    }

    #[test]
    fn function_edge_targets_are_validated() {
        let mut graph = Graph::new("G");
        graph.add_node(node_with_edge(
            "A",
            EDGE_DEFAULT,
            EdgeTarget::Single("func:pick(B,Ghost)".into()),
        ));
        graph.add_node(Node::new("B", "echo"));
        let err = graph.validate_edges().unwrap_err();
        match err {
            AgentMapError::DanglingEdge { target, .. } => assert_eq!(target, "Ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycle_detection() {
        let mut graph = Graph::new("G");
        graph.add_node(node_with_edge("A", EDGE_DEFAULT, EdgeTarget::Single("B".into())));
        graph.add_node(node_with_edge("B", EDGE_DEFAULT, EdgeTarget::Single("A".into())));
        assert!(graph.has_cycles());
        assert!(!linear_graph().has_cycles());
    }

    #[test]
    fn join_node_of_diamond() {
        // A fans out to B and C; both continue to D
        let mut graph = Graph::new("G");
        graph.add_node(node_with_edge(
            "A",
            EDGE_DEFAULT,
            EdgeTarget::Parallel(vec!["B".into(), "C".into()]),
        ));
        graph.add_node(node_with_edge("B", EDGE_DEFAULT, EdgeTarget::Single("D".into())));
        graph.add_node(node_with_edge("C", EDGE_DEFAULT, EdgeTarget::Single("D".into())));
        graph.add_node(Node::new("D", "echo"));

        assert_eq!(
            graph.join_node(&["B".to_string(), "C".to_string()]),
            Some("D".to_string())
        );
        assert!(graph.has_parallel_edges());
    }

    #[test]
    fn diverging_branches_have_no_join() {
        let mut graph = Graph::new("G");
        graph.add_node(node_with_edge(
            "A",
            EDGE_DEFAULT,
            EdgeTarget::Parallel(vec!["B".into(), "C".into()]),
        ));
        graph.add_node(Node::new("B", "echo"));
        graph.add_node(Node::new("C", "echo"));
        assert_eq!(graph.join_node(&["B".to_string(), "C".to_string()]), None);
    }

    #[test]
    fn reachability_validation() {
        let mut graph = linear_graph();
        graph.add_node(Node::new("Island", "echo"));
        assert!(matches!(
            graph.validate_reachability("A").unwrap_err(),
            AgentMapError::UnreachableNode { .. }
        ));
    }
}
