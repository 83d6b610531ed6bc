//! Error types for graph compilation and execution
//!
//! One enum covers the whole pipeline, from CSV parsing through execution.
//! The variants fall into behavioral categories:
//!
//! - **Parse**: `InvalidCsv`
//! - **Graph structure**: `AmbiguousEntryPoint`, `DanglingEdge`,
//!   `UnreachableNode`
//! - **Configuration**: `CyclicServiceGraph`, `MissingDeclaration`,
//!   `MissingService`, `UnconfigurableAgent`, `Configuration`
//! - **Bundles**: `CorruptBundle`, `BundleRehydration`
//! - **Execution**: `NodeExecution`, `Execution`
//! - **Wrapped**: `Checkpoint`, `Serialization`, `Yaml`, `Io`
//!
//! Agent failures during a run are recorded on the tracker and routed
//! through failure edges; they only surface as `NodeExecution` when the
//! engine itself cannot continue. Suspension is not an error at all; it is
//! a typed agent outcome handled at the node boundary.

use thiserror::Error;

/// Convenience result type using [`AgentMapError`]
pub type Result<T> = std::result::Result<T, AgentMapError>;

/// Errors surfaced by the AgentMap engine
#[derive(Error, Debug)]
pub enum AgentMapError {
    /// CSV structure or content is invalid
    #[error("Invalid CSV{}: {message}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    InvalidCsv {
        /// What was wrong
        message: String,
        /// 1-based line in the source file, when attributable to one
        line: Option<u64>,
    },

    /// A graph has zero or multiple candidate entry points
    #[error("Graph '{graph}' has no unambiguous entry point (candidates: {candidates:?})")]
    AmbiguousEntryPoint {
        graph: String,
        candidates: Vec<String>,
    },

    /// An edge references a node that does not exist in the same graph
    #[error("Node '{node}' has edge to undefined node '{target}'")]
    DanglingEdge { node: String, target: String },

    /// A node is not reachable from the entry point
    #[error("Node '{node}' in graph '{graph}' is unreachable from the entry point")]
    UnreachableNode { graph: String, node: String },

    /// Service declarations form a dependency cycle
    #[error("Service dependency cycle: {}", cycle.join(" -> "))]
    CyclicServiceGraph { cycle: Vec<String> },

    /// Declarations referenced by the graph are not registered
    #[error("Missing declarations: {}", names.join(", "))]
    MissingDeclaration { names: Vec<String> },

    /// A service in the load order has no runtime registration
    #[error("Service '{0}' is declared but has no registered implementation")]
    MissingService(String),

    /// An agent capability has no providing service
    #[error("Agent '{agent}' requires capability '{protocol}' but no service provides it")]
    UnconfigurableAgent { agent: String, protocol: String },

    /// A bundle file could not be decoded
    #[error("Corrupt bundle: {0}")]
    CorruptBundle(String),

    /// Resume could not locate or rebuild the graph bundle
    #[error("Bundle rehydration failed: {0}")]
    BundleRehydration(String),

    /// A node's agent failed and the failure could not be routed
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    /// General execution error without node context
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Invalid engine or service configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Checkpoint storage error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agentmap_checkpoint::CheckpointError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentMapError {
    /// CSV error attributable to a specific line
    pub fn invalid_csv_at(message: impl Into<String>, line: u64) -> Self {
        Self::InvalidCsv {
            message: message.into(),
            line: Some(line),
        }
    }

    /// CSV error for the file as a whole
    pub fn invalid_csv(message: impl Into<String>) -> Self {
        Self::InvalidCsv {
            message: message.into(),
            line: None,
        }
    }

    /// Node execution failure with context
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Missing declaration for a single name
    pub fn missing_declaration(name: impl Into<String>) -> Self {
        Self::MissingDeclaration {
            names: vec![name.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_error_includes_line_when_known() {
        let err = AgentMapError::invalid_csv_at("missing Node value", 7);
        assert_eq!(err.to_string(), "Invalid CSV at line 7: missing Node value");

        let err = AgentMapError::invalid_csv("no data rows");
        assert_eq!(err.to_string(), "Invalid CSV: no data rows");
    }

    #[test]
    fn cycle_error_formats_path() {
        let err = AgentMapError::CyclicServiceGraph {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Service dependency cycle: a -> b -> a");
    }
}
