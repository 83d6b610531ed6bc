//! # agentmap-core
//!
//! CSV-driven workflow orchestration engine.
//!
//! Authors describe a directed graph of nodes in a CSV, each bound to an
//! agent type. This crate compiles that CSV into a portable, metadata-only
//! [`GraphBundle`] and executes it as an async state machine with
//! success/failure branching, parallel fan-out, durable checkpoints and
//! human-in-the-loop suspend/resume.
//!
//! ## Pipeline
//!
//! ```text
//! CSV file
//!   -> CsvGraphParser        (rows -> GraphSpec)
//!   -> NodeSpecConverter     (GraphSpec -> Graph, typed context, edges)
//!   -> StaticBundleAnalyzer  (+ DeclarationRegistry -> GraphBundle)
//!   -> GraphBundleStore      (content-addressed cache)
//!   -> ServiceContainer + AgentFactory   (instances, capability injection)
//!   -> GraphAssembler        (compiled routers, checkpoint wiring)
//!   -> GraphRunner           (execution, tracking, policies)
//! ```
//!
//! [`WorkflowOrchestrator`] ties the pipeline together and adds the
//! suspend/resume protocol on top of `agentmap-checkpoint` storage.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agentmap_core::{EngineConfig, WorkflowOrchestrator};
//! use std::path::Path;
//!
//! # async fn example() -> agentmap_core::Result<()> {
//! let orchestrator = WorkflowOrchestrator::builder(EngineConfig::default()).build()?;
//! let result = orchestrator
//!     .execute_workflow(Path::new("workflow.csv"), Some("MyGraph"), Default::default(), false)
//!     .await?;
//! println!("success: {}", result.success);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod analyzer;
pub mod assembler;
pub mod bundle;
pub mod bundle_store;
pub mod config;
pub mod convert;
pub mod csv_parser;
pub mod declarations;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod orchestration;
pub mod policy;
pub mod prebuilt;
pub mod prompts;
pub mod resume;
pub mod runner;
pub mod services;
pub mod spec;
pub mod state;
pub mod tracker;

pub use agent::{
    protocols, Agent, AgentContext, AgentFactory, AgentOutcome, ServiceHandle, ServiceLookup,
};
pub use analyzer::{csv_hash, StaticBundleAnalyzer};
pub use assembler::{ExecutableGraph, GraphAssembler, NodeStep, Router, RoutingFn};
pub use bundle::{CompiledFrom, GraphBundle, GraphStructure, BUNDLE_FORMAT};
pub use bundle_store::GraphBundleStore;
pub use config::EngineConfig;
pub use convert::NodeSpecConverter;
pub use csv_parser::{CsvGraphParser, Severity, ValidationIssue, ValidationResult};
pub use declarations::{
    AgentDeclaration, DeclarationRegistry, DeclarationSource, FunctionDeclaration,
    ServiceDeclaration, StaticDeclarationSource,
};
pub use error::{AgentMapError, Result};
pub use graph::{Graph, Node};
pub use interrupt::{
    BundleInfo, HumanInteractionRequest, HumanInteractionResponse, InteractionType,
    ThreadMetadata, ThreadStatus,
};
pub use orchestration::{CandidateNode, MatchStrategy, OrchestratorService};
pub use policy::SuccessPolicy;
pub use prebuilt::{
    register_builtin_agents, register_builtin_services, BuiltinDeclarationSource,
    CheckpointService,
};
pub use prompts::PromptResolver;
pub use resume::{InteractionHandler, WorkflowOrchestrator, WorkflowOrchestratorBuilder};
pub use runner::{CancelToken, GraphRunner, RunOutcome};
pub use spec::{EdgeTarget, FunctionRef, GraphSpec, NodeSpec, OutputField};
pub use state::{reserved, ExecutionState, StateAdapter};
pub use tracker::{
    ExecutionResult, ExecutionStatus, ExecutionSummary, ExecutionTracker, NodeExecution,
};
