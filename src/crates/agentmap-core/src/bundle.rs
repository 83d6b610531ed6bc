//! Graph bundles: portable compiled-graph metadata
//!
//! A [`GraphBundle`] is everything the runtime needs to execute a graph,
//! minus the implementations: nodes and edges, the resolved service load
//! order, agent class and protocol mappings, and structural statistics.
//! Bundles carry no code and no instances, so they serialize compactly and
//! ship between processes.
//!
//! On disk a bundle is a tagged bincode payload named
//! `{csv_hash}.{graph_name}.bundle`.

use crate::error::{AgentMapError, Result};
use crate::graph::Node;
use agentmap_checkpoint::{BincodeSerializer, SerializerProtocol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Format tag embedded in every bundle
pub const BUNDLE_FORMAT: &str = "metadata-v1";

/// Structural statistics computed during analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStructure {
    pub node_count: usize,
    pub is_dag: bool,
    pub has_parallel_edges: bool,
    pub function_edge_count: usize,
}

/// Validation findings carried in the bundle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationMetadata {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Where an executed bundle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompiledFrom {
    /// Loaded from the bundle cache
    Precompiled,
    /// Built in-process from the CSV
    Memory,
    /// Rehydrated during a resume
    Resumed,
}

/// Portable, content-addressable metadata describing one compiled graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphBundle {
    /// Fresh per build; not part of the content address
    pub bundle_id: String,
    pub graph_name: String,
    /// SHA-256 of the source CSV bytes, hex encoded
    pub csv_hash: String,
    pub nodes: BTreeMap<String, Node>,
    pub entry_point: String,
    pub required_agents: BTreeSet<String>,
    pub required_services: BTreeSet<String>,
    /// Topological order; no service appears before its dependencies
    pub service_load_order: Vec<String>,
    pub agent_class_mappings: BTreeMap<String, String>,
    /// Capability protocol to providing service
    pub protocol_mappings: BTreeMap<String, String>,
    /// Function reference name to implementation key
    pub function_mappings: BTreeMap<String, String>,
    pub missing_declarations: BTreeSet<String>,
    pub graph_structure: GraphStructure,
    pub validation: ValidationMetadata,
    pub created_at: DateTime<Utc>,
    pub bundle_format: String,
}

impl GraphBundle {
    /// Content-addressed file name for this bundle
    pub fn file_name(&self) -> String {
        bundle_file_name(&self.csv_hash, &self.graph_name)
    }

    /// Encode to the tagged binary file format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        BincodeSerializer::new()
            .dumps(self)
            .map_err(|e| AgentMapError::CorruptBundle(e.to_string()))
    }

    /// Decode from the tagged binary file format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bundle: Self = BincodeSerializer::new()
            .loads(bytes)
            .map_err(|e| AgentMapError::CorruptBundle(e.to_string()))?;
        if bundle.bundle_format != BUNDLE_FORMAT {
            return Err(AgentMapError::CorruptBundle(format!(
                "unsupported bundle format '{}'",
                bundle.bundle_format
            )));
        }
        Ok(bundle)
    }
}

/// `{csv_hash}.{graph_name}.bundle`
pub fn bundle_file_name(csv_hash: &str, graph_name: &str) -> String {
    format!("{csv_hash}.{graph_name}.bundle")
}
