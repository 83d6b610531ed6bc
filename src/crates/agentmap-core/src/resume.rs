//! Suspend/resume orchestration
//!
//! [`InteractionHandler`] persists interaction requests, responses and
//! thread metadata in the document collections (`interactions`,
//! `interactions_threads`, `interactions_responses`) and enforces the
//! thread status machine. [`WorkflowOrchestrator`] is the facade tying the
//! whole pipeline together: CSV to bundle to container to assembled graph
//! to runner, plus the resume path that rehydrates a bundle, injects the
//! human response and continues from the suspended node.

use crate::agent::AgentConstructor;
use crate::assembler::{GraphAssembler, RoutingFn};
use crate::agent::AgentFactory;
use crate::bundle::{CompiledFrom, GraphBundle};
use crate::bundle_store::GraphBundleStore;
use crate::config::EngineConfig;
use crate::csv_parser::CsvGraphParser;
use crate::declarations::{DeclarationRegistry, DeclarationSource};
use crate::error::{AgentMapError, Result};
use crate::interrupt::{
    BundleInfo, HumanInteractionRequest, HumanInteractionResponse, ThreadMetadata, ThreadStatus,
};
use crate::prebuilt::{
    register_builtin_agents, register_builtin_services, BuiltinDeclarationSource,
};
use crate::runner::{CancelToken, GraphRunner, RunOutcome};
use crate::services::ServiceContainer;
use crate::state::{reserved, ExecutionState};
use crate::tracker::ExecutionResult;
use agentmap_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    DocumentStore, FileDocumentStore, FileSaver,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Document collection names used by the suspend/resume protocol
pub mod collections {
    pub const INTERACTIONS: &str = "interactions";
    pub const THREADS: &str = "interactions_threads";
    pub const RESPONSES: &str = "interactions_responses";
}

/// Persistence and lifecycle for interaction threads
pub struct InteractionHandler {
    documents: Arc<dyn DocumentStore>,
}

impl InteractionHandler {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Persist an interaction request keyed by its id
    pub async fn save_request(&self, request: &HumanInteractionRequest) -> Result<()> {
        let doc = serde_json::to_value(request)?;
        let result = self
            .documents
            .write(collections::INTERACTIONS, &request.id, doc)
            .await;
        if !result.success {
            return Err(AgentMapError::Execution(format!(
                "failed to persist interaction request: {}",
                result.error.unwrap_or_default()
            )));
        }
        Ok(())
    }

    pub async fn get_request(&self, id: &str) -> Result<Option<HumanInteractionRequest>> {
        match self.documents.read(collections::INTERACTIONS, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Persist a response keyed by its request id. Re-submitting the same
    /// response for a request is a no-op, making resume idempotent.
    pub async fn save_response(&self, response: &HumanInteractionResponse) -> Result<bool> {
        if let Some(existing) = self.get_response(&response.request_id).await? {
            if existing.action == response.action {
                tracing::debug!(
                    request_id = %response.request_id,
                    "response already recorded; ignoring duplicate"
                );
                return Ok(false);
            }
        }
        let doc = serde_json::to_value(response)?;
        let result = self
            .documents
            .write(collections::RESPONSES, &response.request_id, doc)
            .await;
        if !result.success {
            return Err(AgentMapError::Execution(format!(
                "failed to persist interaction response: {}",
                result.error.unwrap_or_default()
            )));
        }
        Ok(true)
    }

    pub async fn get_response(
        &self,
        request_id: &str,
    ) -> Result<Option<HumanInteractionResponse>> {
        match self
            .documents
            .read(collections::RESPONSES, request_id)
            .await?
        {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Option<ThreadMetadata>> {
        match self.documents.read(collections::THREADS, thread_id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite thread metadata, stamping `updated_at`
    pub async fn upsert_thread(&self, metadata: &mut ThreadMetadata) -> Result<()> {
        metadata.updated_at = Utc::now();
        let doc = serde_json::to_value(&*metadata)?;
        let result = self
            .documents
            .write(collections::THREADS, &metadata.thread_id, doc)
            .await;
        if !result.success {
            return Err(AgentMapError::Execution(format!(
                "failed to persist thread metadata: {}",
                result.error.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Move a thread through the status machine; invalid transitions fail
    pub async fn transition(
        &self,
        metadata: &mut ThreadMetadata,
        next: ThreadStatus,
    ) -> Result<()> {
        if !metadata.status.can_transition_to(next) {
            return Err(AgentMapError::Execution(format!(
                "thread '{}' cannot move from {} to {next}",
                metadata.thread_id, metadata.status
            )));
        }
        tracing::debug!(
            thread_id = %metadata.thread_id,
            from = %metadata.status,
            to = %next,
            "thread status transition"
        );
        metadata.status = next;
        self.upsert_thread(metadata).await
    }
}

/// Builder for [`WorkflowOrchestrator`]
pub struct WorkflowOrchestratorBuilder {
    config: EngineConfig,
    host_sources: Vec<Box<dyn DeclarationSource>>,
    agent_constructors: Vec<(String, AgentConstructor)>,
    functions: HashMap<String, RoutingFn>,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
    documents: Option<Arc<dyn DocumentStore>>,
}

impl WorkflowOrchestratorBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            host_sources: Vec::new(),
            agent_constructors: Vec::new(),
            functions: HashMap::new(),
            checkpointer: None,
            documents: None,
        }
    }

    /// Add a host declaration source (loaded after builtins, so it can
    /// override them)
    pub fn with_source(mut self, source: Box<dyn DeclarationSource>) -> Self {
        self.host_sources.push(source);
        self
    }

    /// Register a host agent constructor under a class path
    pub fn with_agent_constructor(
        mut self,
        class_path: impl Into<String>,
        constructor: AgentConstructor,
    ) -> Self {
        self.agent_constructors.push((class_path.into(), constructor));
        self
    }

    /// Register a routing function implementation
    pub fn with_function(mut self, impl_path: impl Into<String>, function: RoutingFn) -> Self {
        self.functions.insert(impl_path.into(), function);
        self
    }

    /// Override the checkpoint backend (default: file saver under the
    /// configured storage dir)
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = Some(saver);
        self
    }

    /// Override the document store (default: file store under the
    /// configured storage dir)
    pub fn with_documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn build(self) -> Result<WorkflowOrchestrator> {
        let mut sources: Vec<Box<dyn DeclarationSource>> =
            vec![Box::new(BuiltinDeclarationSource::new())];
        sources.extend(self.host_sources);
        let registry = DeclarationRegistry::build(&sources)?;

        let checkpointer: Arc<dyn CheckpointSaver> = match self.checkpointer {
            Some(saver) => saver,
            None => Arc::new(FileSaver::new(&self.config.storage_dir)?),
        };
        let documents: Arc<dyn DocumentStore> = match self.documents {
            Some(documents) => documents,
            None => Arc::new(FileDocumentStore::new(
                self.config.storage_dir.join("documents"),
            )?),
        };

        let mut factory = AgentFactory::new();
        register_builtin_agents(&mut factory);
        for (class_path, constructor) in self.agent_constructors {
            factory.register(class_path, constructor);
        }

        let mut container = ServiceContainer::new();
        register_builtin_services(
            &mut container,
            &self.config.prompts_dir,
            checkpointer.clone(),
        );

        Ok(WorkflowOrchestrator {
            bundle_store: GraphBundleStore::new(&self.config.cache_dir)?,
            runner: GraphRunner::new(self.config.policy()),
            handler: InteractionHandler::new(documents),
            registry,
            factory,
            container,
            functions: self.functions,
            checkpointer,
        })
    }
}

/// End-to-end workflow facade: execute and resume CSV workflows
pub struct WorkflowOrchestrator {
    registry: DeclarationRegistry,
    factory: AgentFactory,
    container: ServiceContainer,
    functions: HashMap<String, RoutingFn>,
    bundle_store: GraphBundleStore,
    checkpointer: Arc<dyn CheckpointSaver>,
    handler: InteractionHandler,
    runner: GraphRunner,
}

impl WorkflowOrchestrator {
    pub fn builder(config: EngineConfig) -> WorkflowOrchestratorBuilder {
        WorkflowOrchestratorBuilder::new(config)
    }

    pub fn bundle_store(&self) -> &GraphBundleStore {
        &self.bundle_store
    }

    pub fn registry(&self) -> &DeclarationRegistry {
        &self.registry
    }

    pub fn interaction_handler(&self) -> &InteractionHandler {
        &self.handler
    }

    /// Compile (or fetch from cache) the bundle for a CSV
    pub fn compile(
        &self,
        csv_path: &Path,
        graph_name: Option<&str>,
    ) -> Result<(GraphBundle, CompiledFrom)> {
        self.bundle_store
            .get_or_create(csv_path, graph_name, &self.registry)
    }

    /// Execute a workflow end to end.
    ///
    /// With `validate` set, structural CSV validation runs first and any
    /// error aborts before compilation.
    pub async fn execute_workflow(
        &self,
        csv_path: &Path,
        graph_name: Option<&str>,
        mut initial_state: ExecutionState,
        validate: bool,
    ) -> Result<ExecutionResult> {
        if validate {
            let validation = CsvGraphParser::new().validate_structure(csv_path);
            if !validation.is_valid() {
                let messages: Vec<String> =
                    validation.errors().map(|i| i.message.clone()).collect();
                return Err(AgentMapError::invalid_csv(messages.join("; ")));
            }
        }

        let (bundle, compiled_from) = self.compile(csv_path, graph_name)?;
        self.container.instantiate_for_bundle(&bundle)?;

        let mut assembler = GraphAssembler::new(&self.factory);
        for (impl_path, function) in &self.functions {
            assembler.register_function(impl_path.clone(), function.clone());
        }
        let graph = Arc::new(assembler.assemble(
            &bundle,
            &self.container,
            Some(self.checkpointer.clone()),
        )?);

        let thread_id = match initial_state.get(reserved::THREAD_ID).and_then(Value::as_str) {
            Some(existing) => existing.to_string(),
            None => {
                let fresh = Uuid::new_v4().to_string();
                initial_state.insert(
                    reserved::THREAD_ID.to_string(),
                    Value::String(fresh.clone()),
                );
                fresh
            }
        };

        let bundle_info = BundleInfo {
            bundle_path: Some(
                self.bundle_store
                    .bundle_path(&bundle.csv_hash, &bundle.graph_name),
            ),
            csv_hash: Some(bundle.csv_hash.clone()),
            csv_path: Some(csv_path.to_path_buf()),
            graph_name: bundle.graph_name.clone(),
        };

        let outcome = self
            .runner
            .run(graph, initial_state, compiled_from, &CancelToken::new())
            .await?;

        match outcome {
            RunOutcome::Completed(result) => {
                let mut metadata =
                    ThreadMetadata::new(&thread_id, &bundle.graph_name, bundle_info);
                metadata.status = if result.success {
                    ThreadStatus::Completed
                } else {
                    ThreadStatus::Failed
                };
                if let Err(e) = self.handler.upsert_thread(&mut metadata).await {
                    tracing::warn!(error = %e, "failed to record completed thread metadata");
                }
                Ok(result)
            }
            RunOutcome::Suspended {
                result,
                request,
                checkpoint_data,
            } => {
                self.persist_suspension(
                    &thread_id,
                    &bundle,
                    bundle_info,
                    &result,
                    &request,
                    checkpoint_data,
                )
                .await?;
                Ok(result)
            }
        }
    }

    /// Resume a suspended thread with a human response.
    ///
    /// Resubmitting a response to an already-resumed thread is a no-op
    /// that reports the thread's terminal state.
    pub async fn resume(
        &self,
        thread_id: &str,
        action: &str,
        data: Option<Value>,
    ) -> Result<ExecutionResult> {
        let mut metadata = self
            .handler
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| AgentMapError::Execution(format!("unknown thread '{thread_id}'")))?;

        match metadata.status {
            ThreadStatus::Suspended => {}
            ThreadStatus::Resuming | ThreadStatus::Completed => {
                tracing::info!(thread_id, status = %metadata.status, "duplicate resume is a no-op");
                return self.noop_resume_result(&metadata).await;
            }
            other => {
                return Err(AgentMapError::Execution(format!(
                    "thread '{thread_id}' is {other}, not resumable"
                )));
            }
        }

        let bundle = self.rehydrate_bundle(&metadata)?;

        // Persist the response before anything that can fail, so a crashed
        // resume can be retried without asking the human again
        let request_id = metadata.pending_interaction_id.clone();
        if let Some(request_id) = &request_id {
            let response = HumanInteractionResponse::new(
                request_id.clone(),
                action,
                data.clone().unwrap_or(Value::Null),
            );
            self.handler.save_response(&response).await?;
            metadata.last_response_id = Some(request_id.clone());
        }
        self.handler
            .transition(&mut metadata, ThreadStatus::Resuming)
            .await?;

        let mut state = self
            .latest_state(thread_id)
            .await?
            .or_else(|| metadata.checkpoint_data.clone())
            .unwrap_or_default();
        state.remove(reserved::INTERRUPTED);
        state.remove(reserved::INTERRUPT_INFO);
        state.insert(
            reserved::THREAD_ID.to_string(),
            Value::String(thread_id.to_string()),
        );
        if let Some(request_id) = &request_id {
            state.insert(
                reserved::HUMAN_RESPONSE.to_string(),
                json!({
                    "action": action,
                    "data": data.unwrap_or(Value::Null),
                    "request_id": request_id,
                }),
            );
        }

        self.container.instantiate_for_bundle(&bundle)?;
        let mut assembler = GraphAssembler::new(&self.factory);
        for (impl_path, function) in &self.functions {
            assembler.register_function(impl_path.clone(), function.clone());
        }
        let graph = Arc::new(assembler.assemble(
            &bundle,
            &self.container,
            Some(self.checkpointer.clone()),
        )?);

        let start_node = metadata
            .node_name
            .clone()
            .unwrap_or_else(|| bundle.entry_point.clone());

        let run = self
            .runner
            .run_from(
                graph,
                &start_node,
                state,
                CompiledFrom::Resumed,
                &CancelToken::new(),
            )
            .await;

        match run {
            Ok(RunOutcome::Completed(result)) => {
                metadata.node_name = None;
                metadata.pending_interaction_id = None;
                metadata.timeout_seconds = None;
                metadata.checkpoint_data = None;
                self.handler
                    .transition(&mut metadata, ThreadStatus::Completed)
                    .await?;
                Ok(result)
            }
            Ok(RunOutcome::Suspended {
                result,
                request,
                checkpoint_data,
            }) => {
                let bundle_info = metadata.bundle_info.clone();
                self.persist_resuspension(
                    &mut metadata,
                    bundle_info,
                    &result,
                    &request,
                    checkpoint_data,
                )
                .await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(persist) = self
                    .handler
                    .transition(&mut metadata, ThreadStatus::Failed)
                    .await
                {
                    tracing::warn!(error = %persist, "failed to record failed thread");
                }
                Err(e)
            }
        }
    }

    async fn noop_resume_result(&self, metadata: &ThreadMetadata) -> Result<ExecutionResult> {
        let final_state = self
            .latest_state(&metadata.thread_id)
            .await?
            .unwrap_or_default();
        Ok(ExecutionResult {
            graph_name: metadata.graph_name.clone(),
            final_state,
            execution_summary: crate::tracker::ExecutionTracker::new(
                &metadata.thread_id,
                &metadata.graph_name,
            )
            .summary(),
            success: metadata.status == ThreadStatus::Completed,
            total_duration_ms: 0,
            error: None,
            compiled_from: CompiledFrom::Resumed,
        })
    }

    /// Three-step rehydration: explicit bundle path, then cache lookup,
    /// then rebuild from the CSV
    fn rehydrate_bundle(&self, metadata: &ThreadMetadata) -> Result<GraphBundle> {
        let info = &metadata.bundle_info;

        if let Some(path) = &info.bundle_path {
            match self.bundle_store.load(path) {
                Ok(bundle) => return Ok(bundle),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "bundle path load failed")
                }
            }
        }
        if let Some(csv_hash) = &info.csv_hash {
            if let Some(bundle) = self.bundle_store.lookup(csv_hash, &info.graph_name) {
                return Ok(bundle);
            }
        }
        if let Some(csv_path) = &info.csv_path {
            match self
                .bundle_store
                .get_or_create(csv_path, Some(&info.graph_name), &self.registry)
            {
                Ok((bundle, _)) => return Ok(bundle),
                Err(e) => {
                    tracing::warn!(csv = %csv_path.display(), error = %e, "CSV rebuild failed")
                }
            }
        }

        Err(AgentMapError::BundleRehydration(format!(
            "no bundle path, cache entry or rebuildable CSV for thread '{}'",
            metadata.thread_id
        )))
    }

    /// Latest checkpointed state for a thread
    async fn latest_state(&self, thread_id: &str) -> Result<Option<ExecutionState>> {
        let tuple = self
            .checkpointer
            .get_tuple(&CheckpointConfig::for_thread(thread_id))
            .await?;
        match tuple {
            Some(tuple) => Ok(Some(serde_json::from_slice(
                &tuple.checkpoint.state_snapshot,
            )?)),
            None => Ok(None),
        }
    }

    async fn persist_suspension(
        &self,
        thread_id: &str,
        bundle: &GraphBundle,
        bundle_info: BundleInfo,
        result: &ExecutionResult,
        request: &HumanInteractionRequest,
        checkpoint_data: serde_json::Map<String, Value>,
    ) -> Result<()> {
        self.handler.save_request(request).await?;

        let mut metadata = ThreadMetadata::new(thread_id, &bundle.graph_name, bundle_info);
        metadata.status = ThreadStatus::Suspended;
        metadata.node_name = Some(request.node_name.clone());
        metadata.pending_interaction_id = Some(request.id.clone());
        metadata.timeout_seconds = request.timeout_seconds;
        metadata.checkpoint_data = Some(checkpoint_data);
        self.handler.upsert_thread(&mut metadata).await?;

        self.write_suspend_checkpoint(thread_id, result, &request.node_name)
            .await;
        Ok(())
    }

    async fn persist_resuspension(
        &self,
        metadata: &mut ThreadMetadata,
        bundle_info: BundleInfo,
        result: &ExecutionResult,
        request: &HumanInteractionRequest,
        checkpoint_data: serde_json::Map<String, Value>,
    ) -> Result<()> {
        self.handler.save_request(request).await?;
        metadata.bundle_info = bundle_info;
        metadata.node_name = Some(request.node_name.clone());
        metadata.pending_interaction_id = Some(request.id.clone());
        metadata.timeout_seconds = request.timeout_seconds;
        metadata.checkpoint_data = Some(checkpoint_data);
        self.handler
            .transition(metadata, ThreadStatus::Suspended)
            .await?;
        self.write_suspend_checkpoint(&metadata.thread_id, result, &request.node_name)
            .await;
        Ok(())
    }

    /// Snapshot the suspended state (including `__interrupted`) so resume
    /// picks up exactly what the caller saw
    async fn write_suspend_checkpoint(
        &self,
        thread_id: &str,
        result: &ExecutionResult,
        node_name: &str,
    ) {
        let snapshot = match serde_json::to_vec(&result.final_state) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "suspended state not serializable");
                return;
            }
        };
        let write = self
            .checkpointer
            .put(
                &CheckpointConfig::for_thread(thread_id),
                Checkpoint::new(snapshot),
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Suspend)
                    .with_node(node_name),
            )
            .await;
        if !write.success {
            tracing::warn!(
                error = write.error.as_deref().unwrap_or("unknown"),
                "suspend checkpoint write failed"
            );
        }
    }
}
