//! Graph assembly: bundle + instances to an executable state machine
//!
//! The assembler instantiates one agent per node through the
//! [`AgentFactory`], compiles each node's edge map into a [`Router`], and
//! packages everything as an [`ExecutableGraph`] the runner walks.
//! Orchestration-capable agents get a dynamic-router flag so the runner
//! consults `__next_node` after them; when the bundle requires the
//! checkpoint service, the provided saver is wired in so every node step
//! persists a snapshot.

use crate::agent::{protocols, Agent, AgentContext, AgentFactory};
use crate::bundle::GraphBundle;
use crate::error::{AgentMapError, Result};
use crate::graph::{Graph, EDGE_DEFAULT, EDGE_FAILURE, EDGE_SUCCESS};
use crate::prebuilt::service_names;
use crate::services::ServiceContainer;
use crate::spec::{EdgeTarget, FunctionRef, OutputField};
use crate::state::ExecutionState;
use agentmap_checkpoint::CheckpointSaver;
use std::collections::HashMap;
use std::sync::Arc;

/// Routing function resolved from a `func:` edge: receives the state and
/// the declared success/failure targets, returns the next node name
pub type RoutingFn = Arc<dyn Fn(&ExecutionState, &str, &str) -> String + Send + Sync>;

/// Compiled routing behavior of one node
#[derive(Clone)]
pub enum Router {
    /// No outgoing edges; the path halts here
    End,
    /// Unconditional transition
    Unconditional(EdgeTarget),
    /// Branch on `last_action_success`; a missing side halts
    Branch {
        success: Option<EdgeTarget>,
        failure: Option<EdgeTarget>,
    },
    /// Function-reference edge deciding the next node at runtime
    Function {
        impl_path: String,
        success_target: String,
        failure_target: String,
    },
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::End => write!(f, "End"),
            Self::Unconditional(target) => f.debug_tuple("Unconditional").field(target).finish(),
            Self::Branch { success, failure } => f
                .debug_struct("Branch")
                .field("success", success)
                .field("failure", failure)
                .finish(),
            Self::Function { impl_path, .. } => {
                f.debug_tuple("Function").field(impl_path).finish()
            }
        }
    }
}

/// One executable node: its agent instance plus compiled routing
pub struct NodeStep {
    pub node_name: String,
    pub agent: Arc<dyn Agent>,
    pub input_fields: Vec<String>,
    pub output_field: Option<OutputField>,
    pub router: Router,
    /// Consult `__next_node` after this node (orchestration-capable agent)
    pub dynamic_route: bool,
}

/// A fully wired, runnable graph
pub struct ExecutableGraph {
    pub graph_name: String,
    pub entry_point: String,
    pub steps: HashMap<String, NodeStep>,
    /// Routing functions keyed by implementation path
    pub functions: HashMap<String, RoutingFn>,
    /// Present when the bundle requires the checkpoint service
    pub checkpointer: Option<Arc<dyn CheckpointSaver>>,
    /// Structural copy used for join-node computation at fan-outs
    pub structure: Graph,
}

impl std::fmt::Debug for ExecutableGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableGraph")
            .field("graph_name", &self.graph_name)
            .field("entry_point", &self.entry_point)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExecutableGraph {
    pub fn step(&self, node_name: &str) -> Result<&NodeStep> {
        self.steps.get(node_name).ok_or_else(|| {
            AgentMapError::Execution(format!(
                "graph '{}' has no node '{node_name}'",
                self.graph_name
            ))
        })
    }
}

/// Assembler wiring bundles into executable graphs
pub struct GraphAssembler<'a> {
    factory: &'a AgentFactory,
    functions: HashMap<String, RoutingFn>,
}

impl<'a> GraphAssembler<'a> {
    pub fn new(factory: &'a AgentFactory) -> Self {
        Self {
            factory,
            functions: HashMap::new(),
        }
    }

    /// Register a routing function under its implementation path
    pub fn register_function(
        &mut self,
        impl_path: impl Into<String>,
        function: RoutingFn,
    ) -> &mut Self {
        self.functions.insert(impl_path.into(), function);
        self
    }

    /// Assemble an executable graph.
    ///
    /// Fails before any instantiation when the bundle carries missing
    /// declarations; a bundle that analyzed incompletely must not run.
    pub fn assemble(
        &self,
        bundle: &GraphBundle,
        container: &ServiceContainer,
        checkpointer: Option<Arc<dyn CheckpointSaver>>,
    ) -> Result<ExecutableGraph> {
        if !bundle.missing_declarations.is_empty() {
            return Err(AgentMapError::MissingDeclaration {
                names: bundle.missing_declarations.iter().cloned().collect(),
            });
        }

        let mut steps = HashMap::with_capacity(bundle.nodes.len());
        for (name, node) in &bundle.nodes {
            let class_path = bundle
                .agent_class_mappings
                .get(&node.agent_type)
                .ok_or_else(|| AgentMapError::missing_declaration(node.agent_type.clone()))?;

            let agent = self.factory.create_agent(
                class_path,
                AgentContext {
                    name: name.clone(),
                    prompt: node.prompt.clone(),
                    description: node.description.clone(),
                    context: node.context.clone(),
                },
                &bundle.protocol_mappings,
                container,
            )?;

            let dynamic_route = agent
                .capabilities()
                .iter()
                .any(|c| c == protocols::ORCHESTRATION);
            let router = self.compile_router(bundle, name, &node.edges)?;

            steps.insert(
                name.clone(),
                NodeStep {
                    node_name: name.clone(),
                    agent: Arc::from(agent),
                    input_fields: node.inputs.clone(),
                    output_field: node.output.clone(),
                    router,
                    dynamic_route,
                },
            );
        }

        let wants_checkpoints = bundle
            .required_services
            .contains(service_names::CHECKPOINT);
        let structure = Graph {
            name: bundle.graph_name.clone(),
            nodes: bundle.nodes.clone(),
            entry_point: Some(bundle.entry_point.clone()),
        };

        tracing::debug!(
            graph = %bundle.graph_name,
            nodes = steps.len(),
            checkpointed = wants_checkpoints && checkpointer.is_some(),
            "assembled executable graph"
        );
        Ok(ExecutableGraph {
            graph_name: bundle.graph_name.clone(),
            entry_point: bundle.entry_point.clone(),
            steps,
            functions: self.functions.clone(),
            checkpointer: if wants_checkpoints { checkpointer } else { None },
            structure,
        })
    }

    fn compile_router(
        &self,
        bundle: &GraphBundle,
        node_name: &str,
        edges: &std::collections::BTreeMap<String, EdgeTarget>,
    ) -> Result<Router> {
        let success = edges.get(EDGE_SUCCESS).cloned();
        let failure = edges.get(EDGE_FAILURE).cloned();
        if success.is_some() || failure.is_some() {
            return Ok(Router::Branch { success, failure });
        }

        match edges.get(EDGE_DEFAULT) {
            None => Ok(Router::End),
            Some(EdgeTarget::Single(token)) => match FunctionRef::parse(token) {
                Some(func) => {
                    let impl_path =
                        bundle.function_mappings.get(&func.name).ok_or_else(|| {
                            AgentMapError::missing_declaration(format!("func:{}", func.name))
                        })?;
                    if !self.functions.contains_key(impl_path) {
                        return Err(AgentMapError::Configuration(format!(
                            "routing function '{}' ({impl_path}) referenced by node \
                             '{node_name}' is not registered",
                            func.name
                        )));
                    }
                    Ok(Router::Function {
                        impl_path: impl_path.clone(),
                        success_target: func.success_target,
                        failure_target: func.failure_target,
                    })
                }
                None => Ok(Router::Unconditional(EdgeTarget::Single(token.clone()))),
            },
            Some(parallel) => Ok(Router::Unconditional(parallel.clone())),
        }
    }
}
