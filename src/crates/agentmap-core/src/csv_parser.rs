//! CSV parsing into flat graph specifications
//!
//! The CSV format is the authoring surface of AgentMap: one row per node,
//! with columns matched case-insensitively against a canonical set plus an
//! alias table. Parsing is a pure transformation from file bytes to
//! [`GraphSpec`]; no graph structure is validated here beyond row-level
//! contracts.
//!
//! Two entry points:
//!
//! - [`CsvGraphParser::parse_file`] - strict parse, fails with `InvalidCsv`
//! - [`CsvGraphParser::validate_structure`] - non-fatal pre-validation
//!   collecting every issue into a [`ValidationResult`]

use crate::error::{AgentMapError, Result};
use crate::spec::{EdgeTarget, GraphSpec, NodeSpec, OutputField};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// Canonical column names, index-aligned with nothing; order is cosmetic
pub const CANONICAL_COLUMNS: &[&str] = &[
    "GraphName",
    "Node",
    "AgentType",
    "Prompt",
    "Description",
    "Context",
    "Input_Fields",
    "Output_Field",
    "Edge",
    "Success_Next",
    "Failure_Next",
    "Tool_Source",
    "Available_Tools",
];

const REQUIRED_COLUMNS: &[&str] = &["GraphName", "Node"];

/// Lowercase alias to canonical name
fn alias_table() -> &'static HashMap<String, &'static str> {
    static TABLE: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table: HashMap<String, &'static str> = HashMap::new();
        for canonical in CANONICAL_COLUMNS {
            table.insert(canonical.to_lowercase(), canonical);
        }
        // Common shorthands seen in authored workflows
        let aliases: &[(&str, &'static str)] = &[
            ("graph", "GraphName"),
            ("graph_name", "GraphName"),
            ("workflow", "GraphName"),
            ("node_name", "Node"),
            ("type", "AgentType"),
            ("agent", "AgentType"),
            ("agent_type", "AgentType"),
            ("input", "Input_Fields"),
            ("inputs", "Input_Fields"),
            ("output", "Output_Field"),
            ("next", "Edge"),
            ("success", "Success_Next"),
            ("failure", "Failure_Next"),
            ("tools", "Available_Tools"),
        ];
        for (alias, canonical) in aliases {
            table.insert((*alias).to_string(), canonical);
        }
        table
    })
}

fn tool_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("tool token pattern"))
}

/// Issue severity in a [`ValidationResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One finding from CSV pre-validation
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    pub line: Option<u64>,
    pub field: Option<String>,
}

/// Collected findings from [`CsvGraphParser::validate_structure`]
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub file_path: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    fn push(&mut self, severity: Severity, message: String, line: Option<u64>, field: Option<&str>) {
        self.issues.push(ValidationIssue {
            severity,
            message,
            line,
            field: field.map(String::from),
        });
    }
}

/// Parser for AgentMap workflow CSV files
#[derive(Debug, Clone, Default)]
pub struct CsvGraphParser;

impl CsvGraphParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a CSV file into a [`GraphSpec`].
    ///
    /// Rows missing `GraphName` or `Node` are skipped with a warning; the
    /// parse fails only on structural problems (missing file, missing
    /// required columns, no usable rows, malformed tool fields).
    pub fn parse_file(&self, csv_path: &Path) -> Result<GraphSpec> {
        let bytes = self.read_csv_bytes(csv_path)?;
        self.parse_bytes(&bytes, &csv_path.display().to_string())
    }

    /// Read the raw bytes of a CSV, applying the file-level checks
    pub fn read_csv_bytes(&self, csv_path: &Path) -> Result<Vec<u8>> {
        if !csv_path.exists() {
            return Err(AgentMapError::invalid_csv(format!(
                "CSV file not found: {}",
                csv_path.display()
            )));
        }
        if !csv_path.is_file() {
            return Err(AgentMapError::invalid_csv(format!(
                "path is not a file: {}",
                csv_path.display()
            )));
        }
        Ok(std::fs::read(csv_path)?)
    }

    /// Parse in-memory CSV bytes (the path is only used in diagnostics)
    pub fn parse_bytes(&self, bytes: &[u8], file_path: &str) -> Result<GraphSpec> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            AgentMapError::invalid_csv(format!("CSV is not valid UTF-8: {e}"))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns = self.normalize_headers(reader.headers().map_err(|e| {
            AgentMapError::invalid_csv(format!("cannot read CSV header: {e}"))
        })?)?;

        let mut spec = GraphSpec {
            file_path: file_path.to_string(),
            ..Default::default()
        };
        let mut populated_graph_name = 0usize;
        let mut populated_node = 0usize;

        for (idx, record) in reader.records().enumerate() {
            let line_number = (idx + 2) as u64;
            let record = record.map_err(|e| {
                AgentMapError::invalid_csv_at(format!("malformed row: {e}"), line_number)
            })?;
            spec.total_rows += 1;

            let cell = |name: &str| -> String {
                columns
                    .get(name)
                    .and_then(|&i| record.get(i))
                    .map(str::trim)
                    .unwrap_or("")
                    .to_string()
            };

            let graph_name = cell("GraphName");
            let name = cell("Node");
            if !graph_name.is_empty() {
                populated_graph_name += 1;
            }
            if !name.is_empty() {
                populated_node += 1;
            }
            if graph_name.is_empty() || name.is_empty() {
                tracing::warn!(
                    line = line_number,
                    "skipping row without GraphName and Node values"
                );
                continue;
            }

            let node_spec = self.parse_row(&graph_name, &name, line_number, &cell)?;
            spec.nodes.push(node_spec);
        }

        if spec.total_rows == 0 {
            return Err(AgentMapError::invalid_csv("CSV contains no data rows"));
        }
        if populated_graph_name == 0 {
            return Err(AgentMapError::invalid_csv(
                "required column 'GraphName' is entirely empty",
            ));
        }
        if populated_node == 0 {
            return Err(AgentMapError::invalid_csv(
                "required column 'Node' is entirely empty",
            ));
        }

        tracing::debug!(
            rows = spec.total_rows,
            nodes = spec.nodes.len(),
            graphs = spec.graph_names().len(),
            "parsed CSV"
        );
        Ok(spec)
    }

    fn parse_row(
        &self,
        graph_name: &str,
        name: &str,
        line_number: u64,
        cell: &dyn Fn(&str) -> String,
    ) -> Result<NodeSpec> {
        let tool_source = non_empty(cell("Tool_Source"));
        if let Some(source) = &tool_source {
            if !valid_tool_source(source) {
                return Err(AgentMapError::invalid_csv_at(
                    format!(
                        "Tool_Source must be 'toolnode' or a source file path, got '{source}'"
                    ),
                    line_number,
                ));
            }
        }

        let available_tools = split_pipe(&cell("Available_Tools"));
        for tool in &available_tools {
            if !tool_token_re().is_match(tool) {
                return Err(AgentMapError::invalid_csv_at(
                    format!("Available_Tools entry '{tool}' contains invalid characters"),
                    line_number,
                ));
            }
        }

        Ok(NodeSpec {
            graph_name: graph_name.to_string(),
            name: name.to_string(),
            agent_type: non_empty(cell("AgentType")),
            prompt: non_empty(cell("Prompt")),
            description: non_empty(cell("Description")),
            context: non_empty(cell("Context")),
            input_fields: split_pipe(&cell("Input_Fields")),
            output_field: OutputField::parse(&cell("Output_Field")),
            edge: EdgeTarget::parse(&cell("Edge")),
            success_next: EdgeTarget::parse(&cell("Success_Next")),
            failure_next: EdgeTarget::parse(&cell("Failure_Next")),
            tool_source,
            available_tools,
            line_number,
        })
    }

    /// Map canonical column names to their index in the header row
    fn normalize_headers(&self, headers: &csv::StringRecord) -> Result<HashMap<String, usize>> {
        let aliases = alias_table();
        let mut columns: HashMap<String, usize> = HashMap::new();

        for (idx, raw) in headers.iter().enumerate() {
            let key = raw.trim().to_lowercase();
            match aliases.get(key.as_str()) {
                Some(canonical) => {
                    // First binding wins when a file repeats a column
                    columns.entry((*canonical).to_string()).or_insert(idx);
                }
                None => {
                    tracing::warn!(column = raw, "ignoring unknown CSV column");
                }
            }
        }

        for required in REQUIRED_COLUMNS {
            if !columns.contains_key(*required) {
                return Err(AgentMapError::invalid_csv(format!(
                    "required column '{required}' is missing"
                )));
            }
        }
        Ok(columns)
    }

    /// Pre-validate a CSV without failing fast, collecting every issue
    pub fn validate_structure(&self, csv_path: &Path) -> ValidationResult {
        let mut result = ValidationResult {
            file_path: csv_path.display().to_string(),
            ..Default::default()
        };

        let bytes = match self.read_csv_bytes(csv_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                result.push(Severity::Error, e.to_string(), None, None);
                return result;
            }
        };
        let Ok(text) = std::str::from_utf8(&bytes) else {
            result.push(
                Severity::Error,
                "CSV is not valid UTF-8".to_string(),
                None,
                None,
            );
            return result;
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = match reader.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                result.push(
                    Severity::Error,
                    format!("cannot read CSV header: {e}"),
                    None,
                    None,
                );
                return result;
            }
        };

        let aliases = alias_table();
        let mut columns: HashMap<String, usize> = HashMap::new();
        for (idx, raw) in headers.iter().enumerate() {
            match aliases.get(raw.trim().to_lowercase().as_str()) {
                Some(canonical) => {
                    columns.entry((*canonical).to_string()).or_insert(idx);
                }
                None => result.push(
                    Severity::Warning,
                    format!("unknown column '{raw}' will be ignored"),
                    Some(1),
                    Some(raw),
                ),
            }
        }
        for required in REQUIRED_COLUMNS {
            if !columns.contains_key(*required) {
                result.push(
                    Severity::Error,
                    format!("required column '{required}' is missing"),
                    Some(1),
                    Some(required),
                );
            }
        }
        if !result.is_valid() {
            return result;
        }

        let mut seen_nodes: Vec<(String, String)> = Vec::new();
        let mut row_count = 0usize;
        for (idx, record) in reader.records().enumerate() {
            let line = (idx + 2) as u64;
            let Ok(record) = record else {
                result.push(Severity::Error, "malformed row".to_string(), Some(line), None);
                continue;
            };
            row_count += 1;
            let cell = |name: &str| -> String {
                columns
                    .get(name)
                    .and_then(|&i| record.get(i))
                    .map(str::trim)
                    .unwrap_or("")
                    .to_string()
            };

            let graph = cell("GraphName");
            let node = cell("Node");
            if graph.is_empty() || node.is_empty() {
                result.push(
                    Severity::Warning,
                    "row missing GraphName or Node will be skipped".to_string(),
                    Some(line),
                    None,
                );
                continue;
            }
            let key = (graph.clone(), node.clone());
            if seen_nodes.contains(&key) {
                result.push(
                    Severity::Error,
                    format!("duplicate node '{node}' in graph '{graph}'"),
                    Some(line),
                    Some("Node"),
                );
            } else {
                seen_nodes.push(key);
            }

            let tool_source = cell("Tool_Source");
            if !tool_source.is_empty() && !valid_tool_source(&tool_source) {
                result.push(
                    Severity::Error,
                    format!("invalid Tool_Source '{tool_source}'"),
                    Some(line),
                    Some("Tool_Source"),
                );
            }
            for tool in split_pipe(&cell("Available_Tools")) {
                if !tool_token_re().is_match(&tool) {
                    result.push(
                        Severity::Error,
                        format!("invalid tool name '{tool}'"),
                        Some(line),
                        Some("Available_Tools"),
                    );
                }
            }
        }

        if row_count == 0 {
            result.push(
                Severity::Error,
                "CSV contains no data rows".to_string(),
                None,
                None,
            );
        } else {
            result.push(
                Severity::Info,
                format!("{} data rows, {} nodes", row_count, seen_nodes.len()),
                None,
                None,
            );
        }
        result
    }
}

/// `toolnode` (any case) or a path with a recognized source suffix
fn valid_tool_source(source: &str) -> bool {
    source.eq_ignore_ascii_case("toolnode")
        || source.ends_with(".py")
        || source.ends_with(".rs")
}

fn split_pipe(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
