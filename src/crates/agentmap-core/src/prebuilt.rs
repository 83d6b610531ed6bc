//! Builtin agents, services and declarations
//!
//! The engine's own agent library: enough to author useful workflows and
//! to exercise every engine feature without host-provided code. Hosts
//! register their own agents the same way these are registered, through
//! declaration sources and the constructor registry.
//!
//! Builtin agent types: `default`, `echo`, `branching`, `human` (and its
//! `input` alias), `orchestrator`, `failure`.

use crate::agent::{
    protocols, Agent, AgentContext, AgentFactory, AgentOutcome, ServiceHandle,
};
use crate::declarations::{
    AgentDeclaration, DeclarationSource, FunctionDeclaration, ServiceDeclaration,
};
use crate::error::{AgentMapError, Result};
use crate::interrupt::{HumanInteractionRequest, InteractionType};
use crate::orchestration::{CandidateNode, MatchStrategy, OrchestratorService};
use crate::prompts::PromptResolver;
use crate::services::ServiceContainer;
use crate::state::{reserved, ExecutionState};
use agentmap_checkpoint::CheckpointSaver;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Container-owned wrapper around the checkpoint saver, handed to
/// checkpoint-capable agents
pub struct CheckpointService {
    saver: Arc<dyn CheckpointSaver>,
}

impl CheckpointService {
    pub fn new(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver }
    }

    pub fn saver(&self) -> Arc<dyn CheckpointSaver> {
        self.saver.clone()
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Fallback agent bound to rows without an `AgentType`. Resolves its prompt
/// through the prompt manager and emits the resolved text.
struct DefaultAgent {
    context: AgentContext,
    prompts: Option<Arc<PromptResolver>>,
}

#[async_trait]
impl Agent for DefaultAgent {
    fn name(&self) -> &str {
        &self.context.name
    }

    fn capabilities(&self) -> Vec<String> {
        vec![protocols::PROMPT_MANAGER.to_string()]
    }

    fn configure(&mut self, protocol: &str, service: ServiceHandle) -> Result<()> {
        if protocol == protocols::PROMPT_MANAGER {
            self.prompts = service.downcast::<PromptResolver>().ok();
            return Ok(());
        }
        Err(AgentMapError::UnconfigurableAgent {
            agent: self.context.name.clone(),
            protocol: protocol.to_string(),
        })
    }

    async fn execute(
        &self,
        inputs: &ExecutionState,
        _state: &ExecutionState,
    ) -> Result<AgentOutcome> {
        let reference = self.context.prompt.clone().unwrap_or_default();
        let vars: HashMap<String, String> = inputs
            .iter()
            .map(|(k, v)| (k.clone(), value_to_text(v)))
            .collect();
        let text = match &self.prompts {
            Some(prompts) if !reference.is_empty() => prompts.format_prompt(&reference, &vars),
            _ if !reference.is_empty() => reference,
            _ => format!("{} completed", self.context.name),
        };
        Ok(AgentOutcome::Output(Value::String(text)))
    }
}

/// Copies its inputs through unchanged
struct EchoAgent {
    context: AgentContext,
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.context.name
    }

    async fn execute(
        &self,
        inputs: &ExecutionState,
        _state: &ExecutionState,
    ) -> Result<AgentOutcome> {
        if inputs.is_empty() {
            return Ok(AgentOutcome::Output(Value::String(format!(
                "{}: processed",
                self.context.name
            ))));
        }
        Ok(AgentOutcome::Output(Value::Object(inputs.clone())))
    }
}

/// Decides the success/failure branch from its inputs.
///
/// Reads the field named by context `success_field` (default `success`);
/// anything but explicit `false` counts as success.
struct BranchingAgent {
    context: AgentContext,
}

#[async_trait]
impl Agent for BranchingAgent {
    fn name(&self) -> &str {
        &self.context.name
    }

    async fn execute(
        &self,
        inputs: &ExecutionState,
        _state: &ExecutionState,
    ) -> Result<AgentOutcome> {
        let field = self
            .context
            .context
            .get("success_field")
            .and_then(Value::as_str)
            .unwrap_or("success");
        let succeeded = !matches!(inputs.get(field), Some(Value::Bool(false)));
        let branch = if succeeded { "success" } else { "failure" };
        Ok(AgentOutcome::Output(json!({
            reserved::LAST_ACTION_SUCCESS: succeeded,
            "branch": branch,
        })))
    }
}

/// Suspends the thread for human input; completes when a response has been
/// injected by the resume path
struct HumanAgent {
    context: AgentContext,
    #[allow(dead_code)]
    checkpoints: Option<Arc<CheckpointService>>,
}

#[async_trait]
impl Agent for HumanAgent {
    fn name(&self) -> &str {
        &self.context.name
    }

    fn capabilities(&self) -> Vec<String> {
        vec![protocols::CHECKPOINT.to_string()]
    }

    fn configure(&mut self, protocol: &str, service: ServiceHandle) -> Result<()> {
        if protocol == protocols::CHECKPOINT {
            self.checkpoints = service.downcast::<CheckpointService>().ok();
            return Ok(());
        }
        Err(AgentMapError::UnconfigurableAgent {
            agent: self.context.name.clone(),
            protocol: protocol.to_string(),
        })
    }

    async fn execute(
        &self,
        inputs: &ExecutionState,
        state: &ExecutionState,
    ) -> Result<AgentOutcome> {
        // A response injected by resume completes the interaction
        if let Some(response) = state.get(reserved::HUMAN_RESPONSE) {
            return Ok(AgentOutcome::Output(json!({
                "action": response.get("action").cloned().unwrap_or(Value::Null),
                "data": response.get("data").cloned().unwrap_or(Value::Null),
            })));
        }

        let thread_id = state
            .get(reserved::THREAD_ID)
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let interaction_type = self
            .context
            .context
            .get("interaction_type")
            .and_then(Value::as_str)
            .map(parse_interaction_type)
            .unwrap_or_default();
        let options = self
            .context
            .context
            .get("options")
            .and_then(Value::as_array)
            .map(|opts| {
                opts.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let mut request = HumanInteractionRequest::new(
            thread_id,
            &self.context.name,
            interaction_type,
            self.context.prompt.clone().unwrap_or_default(),
        )
        .with_options(options)
        .with_context(self.context.context.clone());
        if let Some(timeout) = self
            .context
            .context
            .get("timeout_seconds")
            .and_then(Value::as_u64)
        {
            request = request.with_timeout(timeout);
        }

        let mut checkpoint_data = Map::new();
        checkpoint_data.insert("node_name".to_string(), json!(self.context.name));
        checkpoint_data.insert("inputs".to_string(), Value::Object(inputs.clone()));

        Ok(AgentOutcome::Suspend {
            request,
            checkpoint_data,
        })
    }
}

fn parse_interaction_type(raw: &str) -> InteractionType {
    match raw.to_ascii_lowercase().as_str() {
        "choice" => InteractionType::Choice,
        "text_input" => InteractionType::TextInput,
        "edit" => InteractionType::Edit,
        "conversation" => InteractionType::Conversation,
        _ => InteractionType::Approval,
    }
}

/// Selects the next node at runtime and publishes it as `__next_node`
struct OrchestratorAgent {
    context: AgentContext,
    orchestrator: Option<Arc<OrchestratorService>>,
}

#[async_trait]
impl Agent for OrchestratorAgent {
    fn name(&self) -> &str {
        &self.context.name
    }

    fn capabilities(&self) -> Vec<String> {
        vec![protocols::ORCHESTRATION.to_string()]
    }

    fn configure(&mut self, protocol: &str, service: ServiceHandle) -> Result<()> {
        if protocol == protocols::ORCHESTRATION {
            self.orchestrator = service.downcast::<OrchestratorService>().ok();
            return Ok(());
        }
        Err(AgentMapError::UnconfigurableAgent {
            agent: self.context.name.clone(),
            protocol: protocol.to_string(),
        })
    }

    async fn execute(
        &self,
        inputs: &ExecutionState,
        _state: &ExecutionState,
    ) -> Result<AgentOutcome> {
        let orchestrator = self.orchestrator.as_ref().ok_or_else(|| {
            AgentMapError::node_execution(&self.context.name, "orchestrator service not configured")
        })?;

        let input_text = inputs
            .values()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(" ");

        let candidates = candidate_nodes(&self.context.context);
        let strategy = self
            .context
            .context
            .get("matching_strategy")
            .and_then(Value::as_str)
            .map(MatchStrategy::parse)
            .unwrap_or_default();
        let threshold = self
            .context
            .context
            .get("confidence_threshold")
            .and_then(Value::as_f64)
            .unwrap_or(0.8);
        let default_target = self
            .context
            .context
            .get("default_target")
            .and_then(Value::as_str);

        let selection = orchestrator
            .select_best_node(&input_text, &candidates, strategy, threshold, default_target)
            .ok_or_else(|| {
                AgentMapError::node_execution(
                    &self.context.name,
                    "no routable nodes available",
                )
            })?;

        tracing::debug!(
            node = %self.context.name,
            selected = %selection.node,
            confidence = selection.confidence,
            "orchestrator selected next node"
        );
        Ok(AgentOutcome::Output(json!({
            reserved::NEXT_NODE: selection.node,
            "selection_confidence": selection.confidence,
        })))
    }
}

/// Candidate map from the agent's `available_nodes` context: either
/// `{"Name": "description"}` or `{"Name": {"description": .., "keywords": [..]}}`
fn candidate_nodes(context: &Map<String, Value>) -> BTreeMap<String, CandidateNode> {
    let mut candidates = BTreeMap::new();
    let Some(Value::Object(nodes)) = context.get("available_nodes") else {
        return candidates;
    };
    for (name, meta) in nodes {
        let candidate = match meta {
            Value::String(description) => CandidateNode {
                description: description.clone(),
                keywords: Vec::new(),
            },
            Value::Object(obj) => CandidateNode {
                description: obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                keywords: obj
                    .get("keywords")
                    .and_then(Value::as_array)
                    .map(|ks| {
                        ks.iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            _ => continue,
        };
        candidates.insert(name.clone(), candidate);
    }
    candidates
}

/// Always fails; exists to exercise failure routing and policies
struct FailureAgent {
    context: AgentContext,
}

#[async_trait]
impl Agent for FailureAgent {
    fn name(&self) -> &str {
        &self.context.name
    }

    async fn execute(
        &self,
        _inputs: &ExecutionState,
        _state: &ExecutionState,
    ) -> Result<AgentOutcome> {
        Err(AgentMapError::node_execution(
            &self.context.name,
            self.context
                .prompt
                .clone()
                .unwrap_or_else(|| "intentional failure".to_string()),
        ))
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Builtin class paths
pub mod class_paths {
    pub const DEFAULT: &str = "builtin.default";
    pub const ECHO: &str = "builtin.echo";
    pub const BRANCHING: &str = "builtin.branching";
    pub const HUMAN: &str = "builtin.human";
    pub const ORCHESTRATOR: &str = "builtin.orchestrator";
    pub const FAILURE: &str = "builtin.failure";
}

/// Builtin service names
pub mod service_names {
    pub const PROMPT_MANAGER: &str = "prompt_manager";
    pub const ORCHESTRATION: &str = "orchestration";
    pub const CHECKPOINT: &str = "checkpoint";
}

/// Register builtin agent constructors into a factory
pub fn register_builtin_agents(factory: &mut AgentFactory) {
    factory.register(class_paths::DEFAULT, |context| {
        Box::new(DefaultAgent {
            context,
            prompts: None,
        })
    });
    factory.register(class_paths::ECHO, |context| Box::new(EchoAgent { context }));
    factory.register(class_paths::BRANCHING, |context| {
        Box::new(BranchingAgent { context })
    });
    factory.register(class_paths::HUMAN, |context| {
        Box::new(HumanAgent {
            context,
            checkpoints: None,
        })
    });
    factory.register(class_paths::ORCHESTRATOR, |context| {
        Box::new(OrchestratorAgent {
            context,
            orchestrator: None,
        })
    });
    factory.register(class_paths::FAILURE, |context| {
        Box::new(FailureAgent { context })
    });
}

/// Register builtin service factories into a container.
///
/// The checkpoint service wraps the same saver the runner persists
/// through, so agents and engine observe one history.
pub fn register_builtin_services(
    container: &mut ServiceContainer,
    prompts_dir: &Path,
    checkpointer: Arc<dyn CheckpointSaver>,
) {
    let prompts_dir = prompts_dir.to_path_buf();
    container.register(
        ServiceDeclaration::new(service_names::PROMPT_MANAGER, "builtin.prompt_resolver")
            .with_protocols(&[protocols::PROMPT_MANAGER]),
        move |_| Ok(Arc::new(PromptResolver::new(prompts_dir.clone())) as ServiceHandle),
    );
    container.register(
        ServiceDeclaration::new(service_names::ORCHESTRATION, "builtin.orchestrator_service")
            .with_required_deps(&[service_names::PROMPT_MANAGER])
            .with_protocols(&[protocols::ORCHESTRATION]),
        |_| Ok(Arc::new(OrchestratorService::new()) as ServiceHandle),
    );
    container.register(
        ServiceDeclaration::new(service_names::CHECKPOINT, "builtin.checkpoint_service")
            .with_protocols(&[protocols::CHECKPOINT]),
        move |_| Ok(Arc::new(CheckpointService::new(checkpointer.clone())) as ServiceHandle),
    );
}

/// Declaration source describing the builtin agents and services
#[derive(Debug, Default)]
pub struct BuiltinDeclarationSource;

impl BuiltinDeclarationSource {
    pub fn new() -> Self {
        Self
    }
}

impl DeclarationSource for BuiltinDeclarationSource {
    fn name(&self) -> &str {
        "builtin"
    }

    fn load_agents(&self) -> Vec<AgentDeclaration> {
        vec![
            AgentDeclaration::new("default", class_paths::DEFAULT)
                .with_required_services(&[service_names::PROMPT_MANAGER])
                .with_protocols(&[protocols::PROMPT_MANAGER]),
            AgentDeclaration::new("echo", class_paths::ECHO),
            AgentDeclaration::new("branching", class_paths::BRANCHING),
            AgentDeclaration::new("human", class_paths::HUMAN)
                .with_required_services(&[service_names::CHECKPOINT])
                .with_protocols(&[protocols::CHECKPOINT]),
            AgentDeclaration::new("input", class_paths::HUMAN)
                .with_required_services(&[service_names::CHECKPOINT])
                .with_protocols(&[protocols::CHECKPOINT]),
            AgentDeclaration::new("orchestrator", class_paths::ORCHESTRATOR)
                .with_required_services(&[service_names::ORCHESTRATION])
                .with_protocols(&[protocols::ORCHESTRATION]),
            AgentDeclaration::new("failure", class_paths::FAILURE),
        ]
    }

    fn load_services(&self) -> Vec<ServiceDeclaration> {
        vec![
            ServiceDeclaration::new(service_names::PROMPT_MANAGER, "builtin.prompt_resolver")
                .with_protocols(&[protocols::PROMPT_MANAGER]),
            ServiceDeclaration::new(service_names::ORCHESTRATION, "builtin.orchestrator_service")
                .with_required_deps(&[service_names::PROMPT_MANAGER])
                .with_protocols(&[protocols::ORCHESTRATION]),
            ServiceDeclaration::new(service_names::CHECKPOINT, "builtin.checkpoint_service")
                .with_protocols(&[protocols::CHECKPOINT]),
        ]
    }

    fn load_functions(&self) -> Vec<FunctionDeclaration> {
        Vec::new()
    }
}
