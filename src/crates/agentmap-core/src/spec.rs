//! Flat CSV row models
//!
//! A parsed CSV becomes a [`GraphSpec`]: an ordered sequence of
//! [`NodeSpec`] rows, one per CSV data row, before any graph structure is
//! imposed. The converter folds these into `Graph` instances.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One routing target cell: a single node or a parallel fan-out list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeTarget {
    /// Transition to a single node
    Single(String),
    /// Fan out to every listed node concurrently
    Parallel(Vec<String>),
}

impl EdgeTarget {
    /// Parse a raw cell. Empty cells yield `None`; a cell containing `|`
    /// yields the trimmed non-empty tokens as parallel targets.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains('|') {
            let targets: Vec<String> = raw
                .split('|')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            match targets.len() {
                0 => None,
                1 => Some(Self::Single(targets.into_iter().next().unwrap())),
                _ => Some(Self::Parallel(targets)),
            }
        } else {
            Some(Self::Single(raw.to_string()))
        }
    }

    /// All referenced node names (or function tokens), in declaration order
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Single(t) => vec![t.as_str()],
            Self::Parallel(ts) => ts.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel(_))
    }
}

/// Declared output destination for a node's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputField {
    /// The whole agent result lands under one state key
    Single(String),
    /// The agent result is an object; each listed key is copied out of it
    Multi(Vec<String>),
}

impl OutputField {
    /// Parse a pipe-separated cell. An exactly-one entry collapses back to
    /// a scalar for downstream compatibility.
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<String> = raw
            .split('|')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect();
        match fields.len() {
            0 => None,
            1 => Some(Self::Single(fields.into_iter().next().unwrap())),
            _ => Some(Self::Multi(fields)),
        }
    }
}

/// A function-reference edge token: `func:name(success_target,failure_target)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub name: String,
    pub success_target: String,
    pub failure_target: String,
}

static FUNC_REF_RE: OnceLock<Regex> = OnceLock::new();

impl FunctionRef {
    /// Parse an edge token; returns `None` when the token is a plain node name
    pub fn parse(token: &str) -> Option<Self> {
        let re = FUNC_REF_RE.get_or_init(|| {
            Regex::new(r"^func:([A-Za-z_][A-Za-z0-9_]*)\(\s*([^,()\s]+)\s*,\s*([^,()\s]+)\s*\)$")
                .expect("function reference pattern")
        });
        let caps = re.captures(token.trim())?;
        Some(Self {
            name: caps[1].to_string(),
            success_target: caps[2].to_string(),
            failure_target: caps[3].to_string(),
        })
    }

    /// Whether a token looks like a function reference at all
    pub fn is_function_token(token: &str) -> bool {
        token.trim_start().starts_with("func:")
    }
}

/// One parsed CSV row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub graph_name: String,
    pub name: String,
    pub agent_type: Option<String>,
    pub prompt: Option<String>,
    pub description: Option<String>,
    /// Raw context cell; typed parsing happens in the converter
    pub context: Option<String>,
    pub input_fields: Vec<String>,
    pub output_field: Option<OutputField>,
    pub edge: Option<EdgeTarget>,
    pub success_next: Option<EdgeTarget>,
    pub failure_next: Option<EdgeTarget>,
    pub tool_source: Option<String>,
    pub available_tools: Vec<String>,
    /// 1-based line in the source CSV (header is line 1)
    pub line_number: u64,
}

/// Flat parse result for a whole CSV file
#[derive(Debug, Clone, Default)]
pub struct GraphSpec {
    /// Source file path, for diagnostics
    pub file_path: String,
    /// Number of data rows seen (including skipped ones)
    pub total_rows: usize,
    /// Parsed rows in file order
    pub nodes: Vec<NodeSpec>,
}

impl GraphSpec {
    /// Distinct graph names in first-appearance order
    pub fn graph_names(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for node in &self.nodes {
            if !seen.contains(&node.graph_name.as_str()) {
                seen.push(node.graph_name.as_str());
            }
        }
        seen
    }

    /// Rows belonging to one graph, in file order
    pub fn nodes_for_graph(&self, graph_name: &str) -> Vec<&NodeSpec> {
        self.nodes
            .iter()
            .filter(|n| n.graph_name == graph_name)
            .collect()
    }
}
