//! # agentmap
//!
//! CLI for compiling, running and resuming AgentMap CSV workflows.
//!
//! Exit codes: 0 success, 1 error, 2 interrupted (resumable).

use agentmap_core::{
    CsvGraphParser, EngineConfig, ExecutionResult, ExecutionState, GraphBundle, Severity,
    WorkflowOrchestrator,
};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

const EXIT_ERROR: i32 = 1;
const EXIT_INTERRUPTED: i32 = 2;

#[derive(Parser)]
#[command(name = "agentmap")]
#[command(about = "CSV-driven workflow orchestration", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow from a CSV file
    Run {
        /// Path to the workflow CSV
        #[arg(long)]
        csv: PathBuf,

        /// Graph name (defaults to the first graph in the file)
        #[arg(long)]
        graph: Option<String>,

        /// Initial state as JSON
        #[arg(long, default_value = "{}")]
        state: String,

        /// Validate the CSV before executing
        #[arg(long)]
        validate: bool,
    },

    /// Compile a CSV into a cached graph bundle
    Compile {
        /// Graph name
        #[arg(long)]
        graph: Option<String>,

        /// Path to the workflow CSV
        #[arg(long)]
        csv: PathBuf,

        /// Output directory (defaults to the configured cache)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Resume a suspended workflow thread
    Resume {
        /// Thread id printed when the run was interrupted
        thread_id: String,

        /// Response action (e.g. approve, reject, submit)
        #[arg(long)]
        action: String,

        /// Response payload as JSON
        #[arg(long)]
        data: Option<String>,
    },

    /// Write a starter workflow CSV and custom agent stub
    Scaffold {
        /// Graph name for the starter workflow
        #[arg(long, default_value = "HelloWorld")]
        graph: String,

        /// Where to write the starter CSV
        #[arg(long, default_value = "workflow.csv")]
        csv: PathBuf,
    },

    /// Export a compiled graph in a readable format
    Export {
        /// Graph name
        #[arg(long)]
        graph: Option<String>,

        /// Path to the workflow CSV
        #[arg(long)]
        csv: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "debug")]
        format: ExportFormat,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    /// LangGraph-style pseudo source
    Python,
    /// CSV-like row listing
    Source,
    /// Full bundle metadata dump
    Debug,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            csv,
            graph,
            state,
            validate,
        } => {
            let orchestrator = build_orchestrator(config)?;
            let initial_state = parse_state(&state)?;
            let result = orchestrator
                .execute_workflow(&csv, graph.as_deref(), initial_state, validate)
                .await?;
            print_result(&result);
            Ok(run_exit_code(&result))
        }

        Commands::Compile { graph, csv, output } => {
            let mut config = config;
            if let Some(output) = output {
                config.cache_dir = output;
            }
            let validation = CsvGraphParser::new().validate_structure(&csv);
            for issue in &validation.issues {
                let line = issue
                    .line
                    .map(|l| format!(" (line {l})"))
                    .unwrap_or_default();
                match issue.severity {
                    Severity::Error => eprintln!("error{line}: {}", issue.message),
                    Severity::Warning => eprintln!("warning{line}: {}", issue.message),
                    Severity::Info => println!("{}", issue.message),
                }
            }
            if !validation.is_valid() {
                return Ok(EXIT_ERROR);
            }

            let orchestrator = build_orchestrator(config)?;
            let (bundle, from) = orchestrator.compile(&csv, graph.as_deref())?;
            let path = orchestrator
                .bundle_store()
                .bundle_path(&bundle.csv_hash, &bundle.graph_name);
            println!(
                "compiled '{}' ({} nodes, {from:?}) -> {}",
                bundle.graph_name,
                bundle.graph_structure.node_count,
                path.display()
            );
            if !bundle.missing_declarations.is_empty() {
                eprintln!(
                    "warning: missing declarations: {}",
                    bundle
                        .missing_declarations
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            Ok(0)
        }

        Commands::Resume {
            thread_id,
            action,
            data,
        } => {
            let orchestrator = build_orchestrator(config)?;
            let data = data
                .map(|raw| {
                    serde_json::from_str(&raw)
                        .with_context(|| format!("invalid JSON in --data: {raw}"))
                })
                .transpose()?;
            let result = orchestrator.resume(&thread_id, &action, data).await?;
            print_result(&result);
            Ok(run_exit_code(&result))
        }

        Commands::Scaffold { graph, csv } => {
            scaffold(&graph, &csv)?;
            println!("wrote starter workflow to {}", csv.display());
            Ok(0)
        }

        Commands::Export {
            graph,
            csv,
            format,
            output,
        } => {
            let orchestrator = build_orchestrator(config)?;
            let (bundle, _) = orchestrator.compile(&csv, graph.as_deref())?;
            let rendered = render_bundle(&bundle, format);
            std::fs::write(&output, rendered)
                .with_context(|| format!("cannot write {}", output.display()))?;
            println!("exported '{}' -> {}", bundle.graph_name, output.display());
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            EngineConfig::from_file(path).with_context(|| format!("bad config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn build_orchestrator(config: EngineConfig) -> anyhow::Result<WorkflowOrchestrator> {
    Ok(WorkflowOrchestrator::builder(config).build()?)
}

fn parse_state(raw: &str) -> anyhow::Result<ExecutionState> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("invalid JSON in --state: {raw}"))?;
    value
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow!("--state must be a JSON object"))
}

fn run_exit_code(result: &ExecutionResult) -> i32 {
    if result
        .final_state
        .get("__interrupted")
        .is_some_and(|v| v == &serde_json::json!(true))
    {
        EXIT_INTERRUPTED
    } else if result.success {
        0
    } else {
        EXIT_ERROR
    }
}

fn print_result(result: &ExecutionResult) {
    if result
        .final_state
        .get("__interrupted")
        .is_some_and(|v| v == &serde_json::json!(true))
    {
        let thread_id = result
            .final_state
            .get("__thread_id")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown>");
        println!("workflow interrupted; resume with:");
        println!("  agentmap resume {thread_id} --action <action>");
        return;
    }

    println!(
        "graph '{}' {} in {}ms ({} nodes)",
        result.graph_name,
        if result.success { "succeeded" } else { "failed" },
        result.total_duration_ms,
        result.execution_summary.node_executions.len(),
    );
    let user_state: serde_json::Map<String, serde_json::Value> = result
        .final_state
        .iter()
        .filter(|(k, _)| !k.starts_with("__"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    match serde_json::to_string_pretty(&user_state) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("cannot render final state: {e}"),
    }
}

/// Write a starter CSV and a host agent stub next to it
fn scaffold(graph: &str, csv_path: &Path) -> anyhow::Result<()> {
    if csv_path.exists() {
        return Err(anyhow!("{} already exists", csv_path.display()));
    }
    let csv = format!(
        "GraphName,Node,AgentType,Prompt,Input_Fields,Output_Field,Edge\n\
         {graph},Start,echo,,user_input,started,Process\n\
         {graph},Process,default,Handle: {{user_input}},user_input,result,Finish\n\
         {graph},Finish,echo,,result,final,\n"
    );
    std::fs::write(csv_path, csv)?;

    let stub_path = csv_path.with_file_name("custom_agent.rs");
    let stub = r#"//! Starter custom agent. Register its constructor and a declaration
//! with the orchestrator builder, then reference the agent type in CSV.

use agentmap_core::{
    Agent, AgentContext, AgentOutcome, ExecutionState, Result,
};
use async_trait::async_trait;
use serde_json::Value;

pub struct CustomAgent {
    context: AgentContext,
}

pub fn construct(context: AgentContext) -> Box<dyn Agent> {
    Box::new(CustomAgent { context })
}

#[async_trait]
impl Agent for CustomAgent {
    fn name(&self) -> &str {
        &self.context.name
    }

    async fn execute(
        &self,
        inputs: &ExecutionState,
        _state: &ExecutionState,
    ) -> Result<AgentOutcome> {
        let echoed = inputs.values().cloned().collect::<Vec<Value>>();
        Ok(AgentOutcome::Output(Value::Array(echoed)))
    }
}
"#;
    std::fs::write(&stub_path, stub)?;
    Ok(())
}

/// Render a bundle for `export`
fn render_bundle(bundle: &GraphBundle, format: ExportFormat) -> String {
    match format {
        ExportFormat::Debug => format!("{bundle:#?}\n"),
        ExportFormat::Source => {
            let mut out = String::from(
                "GraphName,Node,AgentType,Input_Fields,Output_Field,Edges\n",
            );
            for (name, node) in &bundle.nodes {
                let edges: Vec<String> = node
                    .edges
                    .iter()
                    .map(|(label, target)| {
                        format!("{label}={}", target.targets().join("|"))
                    })
                    .collect();
                out.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    bundle.graph_name,
                    name,
                    node.agent_type,
                    node.inputs.join("|"),
                    match &node.output {
                        Some(agentmap_core::OutputField::Single(f)) => f.clone(),
                        Some(agentmap_core::OutputField::Multi(fs)) => fs.join("|"),
                        None => String::new(),
                    },
                    edges.join(";"),
                ));
            }
            out
        }
        ExportFormat::Python => {
            let mut out = String::new();
            out.push_str(&format!(
                "# Graph '{}' compiled from CSV {}\n",
                bundle.graph_name, bundle.csv_hash
            ));
            out.push_str("builder = StateGraph(dict)\n");
            for (name, node) in &bundle.nodes {
                out.push_str(&format!(
                    "builder.add_node(\"{name}\", make_agent(\"{}\"))\n",
                    node.agent_type
                ));
            }
            out.push_str(&format!(
                "builder.set_entry_point(\"{}\")\n",
                bundle.entry_point
            ));
            for (name, node) in &bundle.nodes {
                for (label, target) in &node.edges {
                    for t in target.targets() {
                        out.push_str(&format!(
                            "builder.add_edge(\"{name}\", \"{t}\")  # {label}\n"
                        ));
                    }
                }
            }
            out.push_str("graph = builder.compile()\n");
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parsing_accepts_objects_only() {
        assert!(parse_state("{}").unwrap().is_empty());
        assert_eq!(
            parse_state(r#"{"a": 1}"#).unwrap()["a"],
            serde_json::json!(1)
        );
        assert!(parse_state("[1,2]").is_err());
        assert!(parse_state("not json").is_err());
    }

    #[test]
    fn scaffold_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("workflow.csv");
        scaffold("Demo", &csv).unwrap();
        assert!(csv.exists());
        assert!(dir.path().join("custom_agent.rs").exists());

        let err = scaffold("Demo", &csv).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
