//! Agent contract and the agent factory
//!
//! An [`Agent`] is the unit of work bound to a node. The contract is
//! state-in, outcome-out: the runner hands the agent its declared inputs
//! plus a read-only view of the full state, and the agent returns an
//! [`AgentOutcome`]: either an output value to merge, or a suspension
//! carrying a human interaction request. Suspension is data, not an
//! unwound error; only the runner ever sees the variant.
//!
//! Capability injection is table-driven. An agent reports the capability
//! protocols it implements via [`Agent::capabilities`]; for each one the
//! factory looks up the providing service in the bundle's protocol
//! mappings and hands it to [`Agent::configure`] as an untyped
//! [`ServiceHandle`] the agent downcasts. A capability with no provider
//! fails agent creation with `UnconfigurableAgent`.
//!
//! Class paths never load code at runtime: [`AgentFactory`] maps each
//! class path to a constructor registered at startup.

use crate::error::{AgentMapError, Result};
use crate::interrupt::HumanInteractionRequest;
use crate::state::ExecutionState;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known capability protocol ids
pub mod protocols {
    /// Access to a language model service
    pub const LLM: &str = "llm";
    /// Access to document/key-value storage
    pub const STORAGE: &str = "storage";
    /// Prompt reference resolution
    pub const PROMPT_MANAGER: &str = "prompt_manager";
    /// Dynamic next-node selection
    pub const ORCHESTRATION: &str = "orchestration";
    /// Durable execution checkpoints
    pub const CHECKPOINT: &str = "checkpoint";
}

/// Untyped, shareable service reference handed to agents during
/// configuration; agents downcast to the concrete service type
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// What an agent invocation produced
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// A value to merge into state under the node's output field
    Output(Value),
    /// Pause the thread and wait for human input
    Suspend {
        request: HumanInteractionRequest,
        /// Minimal snapshot the agent wants preserved across the suspension
        checkpoint_data: Map<String, Value>,
    },
}

impl AgentOutcome {
    pub fn output(value: impl Into<Value>) -> Self {
        Self::Output(value.into())
    }
}

/// Static construction-time context for one agent instance
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    /// Node name the agent is bound to
    pub name: String,
    pub prompt: Option<String>,
    pub description: Option<String>,
    /// Typed context map from the CSV context cell
    pub context: Map<String, Value>,
}

/// The unit of work bound to a graph node
#[async_trait]
pub trait Agent: Send + Sync {
    /// Node name this instance is bound to
    fn name(&self) -> &str;

    /// Capability protocols this agent must be configured with
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Receive the service providing `protocol`. Called once per declared
    /// capability before the first invocation.
    fn configure(&mut self, protocol: &str, _service: ServiceHandle) -> Result<()> {
        Err(AgentMapError::UnconfigurableAgent {
            agent: self.name().to_string(),
            protocol: protocol.to_string(),
        })
    }

    /// Execute against the declared inputs. `state` is the full state map,
    /// read-only; reserved keys such as `__human_response` are visible.
    async fn execute(
        &self,
        inputs: &ExecutionState,
        state: &ExecutionState,
    ) -> Result<AgentOutcome>;
}

impl std::fmt::Debug for dyn Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Agent").field(&self.name()).finish()
    }
}

/// Constructor registered for one agent class path
pub type AgentConstructor = fn(AgentContext) -> Box<dyn Agent>;

/// Provider of service handles during agent configuration
pub trait ServiceLookup {
    /// Resolve a service by name, `None` when not constructed
    fn service(&self, name: &str) -> Option<ServiceHandle>;
}

/// Statically registered class-path to constructor map
#[derive(Default)]
pub struct AgentFactory {
    constructors: HashMap<String, AgentConstructor>,
}

impl AgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a class path. Later registrations
    /// replace earlier ones, mirroring declaration override order.
    pub fn register(&mut self, class_path: impl Into<String>, constructor: AgentConstructor) {
        self.constructors.insert(class_path.into(), constructor);
    }

    pub fn has_class(&self, class_path: &str) -> bool {
        self.constructors.contains_key(class_path)
    }

    /// Instantiate and configure one agent for a node.
    ///
    /// `protocol_mappings` maps capability protocols to service names;
    /// `services` resolves those names to live handles.
    pub fn create_agent(
        &self,
        class_path: &str,
        context: AgentContext,
        protocol_mappings: &std::collections::BTreeMap<String, String>,
        services: &dyn ServiceLookup,
    ) -> Result<Box<dyn Agent>> {
        let constructor = self.constructors.get(class_path).ok_or_else(|| {
            AgentMapError::missing_declaration(format!("agent class '{class_path}'"))
        })?;

        let node_name = context.name.clone();
        let mut agent = constructor(context);

        for protocol in agent.capabilities() {
            let service_name = protocol_mappings.get(&protocol).ok_or_else(|| {
                AgentMapError::UnconfigurableAgent {
                    agent: node_name.clone(),
                    protocol: protocol.clone(),
                }
            })?;
            let handle = services.service(service_name).ok_or_else(|| {
                AgentMapError::UnconfigurableAgent {
                    agent: node_name.clone(),
                    protocol: protocol.clone(),
                }
            })?;
            agent.configure(&protocol, handle)?;
            tracing::debug!(
                agent = %node_name,
                protocol = %protocol,
                service = %service_name,
                "configured agent capability"
            );
        }

        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct NullLookup;
    impl ServiceLookup for NullLookup {
        fn service(&self, _name: &str) -> Option<ServiceHandle> {
            None
        }
    }

    struct MapLookup(HashMap<String, ServiceHandle>);
    impl ServiceLookup for MapLookup {
        fn service(&self, name: &str) -> Option<ServiceHandle> {
            self.0.get(name).cloned()
        }
    }

    struct ProbeAgent {
        name: String,
        configured: bool,
    }

    #[async_trait]
    impl Agent for ProbeAgent {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> Vec<String> {
            vec![protocols::LLM.to_string()]
        }

        fn configure(&mut self, protocol: &str, service: ServiceHandle) -> Result<()> {
            assert_eq!(protocol, protocols::LLM);
            let value = service.downcast::<u32>().expect("typed service");
            assert_eq!(*value, 7);
            self.configured = true;
            Ok(())
        }

        async fn execute(
            &self,
            _inputs: &ExecutionState,
            _state: &ExecutionState,
        ) -> Result<AgentOutcome> {
            assert!(self.configured);
            Ok(AgentOutcome::output("ok"))
        }
    }

    fn probe_constructor(context: AgentContext) -> Box<dyn Agent> {
        Box::new(ProbeAgent {
            name: context.name,
            configured: false,
        })
    }

    #[tokio::test]
    async fn create_configures_declared_capabilities() {
        let mut factory = AgentFactory::new();
        factory.register("test.probe", probe_constructor);

        let mappings = BTreeMap::from([(
            protocols::LLM.to_string(),
            "llm_service".to_string(),
        )]);
        let lookup = MapLookup(HashMap::from([(
            "llm_service".to_string(),
            Arc::new(7u32) as ServiceHandle,
        )]));

        let agent = factory
            .create_agent(
                "test.probe",
                AgentContext {
                    name: "Node".into(),
                    ..Default::default()
                },
                &mappings,
                &lookup,
            )
            .unwrap();

        let outcome = agent
            .execute(&ExecutionState::new(), &ExecutionState::new())
            .await
            .unwrap();
        assert!(matches!(outcome, AgentOutcome::Output(_)));
    }

    #[test]
    fn missing_provider_is_unconfigurable() {
        let mut factory = AgentFactory::new();
        factory.register("test.probe", probe_constructor);

        let err = factory
            .create_agent(
                "test.probe",
                AgentContext {
                    name: "Node".into(),
                    ..Default::default()
                },
                &BTreeMap::new(),
                &NullLookup,
            )
            .unwrap_err();
        assert!(matches!(err, AgentMapError::UnconfigurableAgent { .. }));
    }

    #[test]
    fn unregistered_class_is_missing_declaration() {
        let factory = AgentFactory::new();
        let err = factory
            .create_agent(
                "nope",
                AgentContext::default(),
                &BTreeMap::new(),
                &NullLookup,
            )
            .unwrap_err();
        assert!(matches!(err, AgentMapError::MissingDeclaration { .. }));
    }
}
