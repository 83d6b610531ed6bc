//! Declaration registry: pure metadata about agents, services and routing
//! functions
//!
//! Declarations describe what exists without loading anything. The
//! registry is built once from an ordered list of [`DeclarationSource`]s
//! (builtin first, host application sources after); later sources override
//! earlier ones at the same key, with a warning. After load the service
//! dependency graph is checked for cycles and the registry becomes
//! immutable.
//!
//! [`DeclarationRegistry::resolve_agent_requirements`] is the static
//! analysis workhorse: from a set of agent types it computes required
//! services (closed under service dependencies), the union of capability
//! protocols in play, and the set of missing declarations. No
//! implementation code is touched, which is what keeps bundle analysis
//! fast and portable.

use crate::error::{AgentMapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Metadata describing one agent type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDeclaration {
    pub agent_type: String,
    /// Key into the agent constructor registry
    pub class_path: String,
    pub required_services: Vec<String>,
    pub optional_services: Vec<String>,
    /// Capability protocols this agent type expects to be configured with
    pub implements_protocols: Vec<String>,
    /// Declaration source name, for diagnostics
    pub source: String,
}

impl AgentDeclaration {
    pub fn new(agent_type: impl Into<String>, class_path: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            class_path: class_path.into(),
            required_services: Vec::new(),
            optional_services: Vec::new(),
            implements_protocols: Vec::new(),
            source: String::new(),
        }
    }

    pub fn with_required_services(mut self, services: &[&str]) -> Self {
        self.required_services = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_protocols(mut self, protocols: &[&str]) -> Self {
        self.implements_protocols = protocols.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Metadata describing one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDeclaration {
    pub service_name: String,
    /// Key into the service factory registry
    pub class_path: String,
    pub required_deps: Vec<String>,
    pub optional_deps: Vec<String>,
    /// Capability protocols this service provides
    pub implements_protocols: Vec<String>,
    /// Protocols this service needs from its dependencies
    pub requires_protocols: Vec<String>,
    pub singleton: bool,
    pub factory_method: Option<String>,
    pub source: String,
}

impl ServiceDeclaration {
    pub fn new(service_name: impl Into<String>, class_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            class_path: class_path.into(),
            required_deps: Vec::new(),
            optional_deps: Vec::new(),
            implements_protocols: Vec::new(),
            requires_protocols: Vec::new(),
            singleton: true,
            factory_method: None,
            source: String::new(),
        }
    }

    pub fn with_required_deps(mut self, deps: &[&str]) -> Self {
        self.required_deps = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_optional_deps(mut self, deps: &[&str]) -> Self {
        self.optional_deps = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_protocols(mut self, protocols: &[&str]) -> Self {
        self.implements_protocols = protocols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn transient(mut self) -> Self {
        self.singleton = false;
        self
    }

    /// Required and optional dependencies together
    pub fn all_deps(&self) -> impl Iterator<Item = &String> {
        self.required_deps.iter().chain(self.optional_deps.iter())
    }
}

/// Metadata describing one routing function referenced by `func:` edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    /// Key into the routing function registry
    pub impl_path: String,
    pub source: String,
}

/// A provider of declarations. Loading must be total and idempotent.
pub trait DeclarationSource: Send + Sync {
    /// Source name used in override warnings
    fn name(&self) -> &str;

    fn load_agents(&self) -> Vec<AgentDeclaration>;

    fn load_services(&self) -> Vec<ServiceDeclaration>;

    fn load_functions(&self) -> Vec<FunctionDeclaration> {
        Vec::new()
    }
}

/// Result of [`DeclarationRegistry::resolve_agent_requirements`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRequirements {
    /// Required services, closed under service dependencies
    pub services: BTreeSet<String>,
    /// Protocols implemented by the agents plus protocols provided by the
    /// resolved services
    pub protocols: BTreeSet<String>,
    /// Agent types with no declaration
    pub missing: BTreeSet<String>,
}

/// Immutable registry of agent, service and function declarations
#[derive(Debug, Default)]
pub struct DeclarationRegistry {
    agents: HashMap<String, AgentDeclaration>,
    services: HashMap<String, ServiceDeclaration>,
    functions: HashMap<String, FunctionDeclaration>,
}

impl DeclarationRegistry {
    /// Load declarations from ordered sources and validate the service
    /// dependency graph. Later sources override earlier ones at the same
    /// key.
    pub fn build(sources: &[Box<dyn DeclarationSource>]) -> Result<Self> {
        let mut registry = Self::default();

        for source in sources {
            for mut decl in source.load_agents() {
                decl.source = source.name().to_string();
                if let Some(previous) = registry.agents.get(&decl.agent_type) {
                    tracing::warn!(
                        agent_type = %decl.agent_type,
                        previous = %previous.source,
                        overriding = %source.name(),
                        "agent declaration overridden by later source"
                    );
                }
                registry.agents.insert(decl.agent_type.clone(), decl);
            }
            for mut decl in source.load_services() {
                decl.source = source.name().to_string();
                if let Some(previous) = registry.services.get(&decl.service_name) {
                    tracing::warn!(
                        service = %decl.service_name,
                        previous = %previous.source,
                        overriding = %source.name(),
                        "service declaration overridden by later source"
                    );
                }
                registry.services.insert(decl.service_name.clone(), decl);
            }
            for mut decl in source.load_functions() {
                decl.source = source.name().to_string();
                registry.functions.insert(decl.name.clone(), decl);
            }
        }

        if let Some(cycle) = registry.find_service_cycle() {
            return Err(AgentMapError::CyclicServiceGraph { cycle });
        }
        Ok(registry)
    }

    pub fn agent(&self, agent_type: &str) -> Option<&AgentDeclaration> {
        self.agents.get(agent_type)
    }

    pub fn service(&self, service_name: &str) -> Option<&ServiceDeclaration> {
        self.services.get(service_name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.functions.get(name)
    }

    pub fn agent_types(&self) -> impl Iterator<Item = &String> {
        self.agents.keys()
    }

    pub fn service_names(&self) -> impl Iterator<Item = &String> {
        self.services.keys()
    }

    /// Resolve everything a set of agent types needs to run.
    ///
    /// Breadth-first from the agent declarations: collect their required
    /// services, then the transitive required deps of those services.
    /// Optional dependencies are included only when declared; absent
    /// optional services are silently skipped rather than reported missing.
    pub fn resolve_agent_requirements(
        &self,
        agent_types: &BTreeSet<String>,
    ) -> ResolvedRequirements {
        let mut resolved = ResolvedRequirements::default();
        let mut queue: VecDeque<String> = VecDeque::new();

        for agent_type in agent_types {
            match self.agents.get(agent_type) {
                Some(decl) => {
                    resolved
                        .protocols
                        .extend(decl.implements_protocols.iter().cloned());
                    queue.extend(decl.required_services.iter().cloned());
                    // Optional services count only when actually declared
                    queue.extend(
                        decl.optional_services
                            .iter()
                            .filter(|s| self.services.contains_key(*s))
                            .cloned(),
                    );
                }
                None => {
                    resolved.missing.insert(agent_type.clone());
                }
            }
        }

        while let Some(service_name) = queue.pop_front() {
            if !resolved.services.insert(service_name.clone()) {
                continue;
            }
            match self.services.get(&service_name) {
                Some(decl) => {
                    resolved
                        .protocols
                        .extend(decl.implements_protocols.iter().cloned());
                    queue.extend(decl.required_deps.iter().cloned());
                    queue.extend(
                        decl.optional_deps
                            .iter()
                            .filter(|s| self.services.contains_key(*s))
                            .cloned(),
                    );
                }
                None => {
                    resolved.missing.insert(service_name.clone());
                }
            }
        }

        resolved
    }

    /// Topological order over the given services and their dependencies,
    /// dependencies first, alphabetical tie-break for determinism.
    pub fn service_load_order(&self, services: &BTreeSet<String>) -> Result<Vec<String>> {
        // Close the set under required deps so a caller can pass just the
        // direct requirements.
        let mut closed: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = services.iter().cloned().collect();
        while let Some(name) = queue.pop_front() {
            if !closed.insert(name.clone()) {
                continue;
            }
            if let Some(decl) = self.services.get(&name) {
                queue.extend(decl.required_deps.iter().cloned());
                queue.extend(
                    decl.optional_deps
                        .iter()
                        .filter(|d| self.services.contains_key(*d))
                        .cloned(),
                );
            }
        }

        // Kahn's algorithm with a sorted ready set
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for name in &closed {
            let degree = self
                .services
                .get(name)
                .map(|decl| {
                    decl.all_deps()
                        .filter(|d| closed.contains(*d))
                        .count()
                })
                .unwrap_or(0);
            in_degree.insert(name.as_str(), degree);
            if let Some(decl) = self.services.get(name) {
                for dep in decl.all_deps() {
                    if closed.contains(dep) {
                        dependents.entry(dep.as_str()).or_default().push(name.as_str());
                    }
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(closed.len());

        while let Some(&next) = ready.iter().next() {
            ready.remove(next);
            order.push(next.to_string());
            for dependent in dependents.get(next).cloned().unwrap_or_default() {
                let degree = in_degree.get_mut(dependent).expect("known node");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != closed.len() {
            let cycle: Vec<String> = closed
                .iter()
                .filter(|n| !order.contains(*n))
                .cloned()
                .collect();
            return Err(AgentMapError::CyclicServiceGraph { cycle });
        }
        Ok(order)
    }

    /// Detect a cycle across all declared services, or return `None`
    fn find_service_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit(
            registry: &DeclarationRegistry,
            name: &str,
            marks: &mut HashMap<String, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            match marks.get(name) {
                Some(Mark::Done) => return None,
                Some(Mark::InProgress) => {
                    let start = stack.iter().position(|n| n == name).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].to_vec();
                    cycle.push(name.to_string());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(name.to_string(), Mark::InProgress);
            stack.push(name.to_string());
            if let Some(decl) = registry.services.get(name) {
                for dep in decl.all_deps() {
                    if registry.services.contains_key(dep) {
                        if let Some(cycle) = visit(registry, dep, marks, stack) {
                            return Some(cycle);
                        }
                    }
                }
            }
            stack.pop();
            marks.insert(name.to_string(), Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        for name in names {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(self, name, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}

/// Declaration source backed by in-memory lists, used by host applications
/// and tests
#[derive(Debug, Default)]
pub struct StaticDeclarationSource {
    name: String,
    agents: Vec<AgentDeclaration>,
    services: Vec<ServiceDeclaration>,
    functions: Vec<FunctionDeclaration>,
}

impl StaticDeclarationSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, decl: AgentDeclaration) -> Self {
        self.agents.push(decl);
        self
    }

    pub fn with_service(mut self, decl: ServiceDeclaration) -> Self {
        self.services.push(decl);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, impl_path: impl Into<String>) -> Self {
        self.functions.push(FunctionDeclaration {
            name: name.into(),
            impl_path: impl_path.into(),
            source: String::new(),
        });
        self
    }
}

impl DeclarationSource for StaticDeclarationSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_agents(&self) -> Vec<AgentDeclaration> {
        self.agents.clone()
    }

    fn load_services(&self) -> Vec<ServiceDeclaration> {
        self.services.clone()
    }

    fn load_functions(&self) -> Vec<FunctionDeclaration> {
        self.functions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(
        agents: Vec<AgentDeclaration>,
        services: Vec<ServiceDeclaration>,
    ) -> DeclarationRegistry {
        let mut source = StaticDeclarationSource::new("test");
        for a in agents {
            source = source.with_agent(a);
        }
        for s in services {
            source = source.with_service(s);
        }
        DeclarationRegistry::build(&[Box::new(source)]).unwrap()
    }

    #[test]
    fn later_source_overrides_earlier() {
        let first = StaticDeclarationSource::new("builtin")
            .with_agent(AgentDeclaration::new("echo", "builtin.echo"));
        let second = StaticDeclarationSource::new("host")
            .with_agent(AgentDeclaration::new("echo", "host.custom_echo"));

        let registry =
            DeclarationRegistry::build(&[Box::new(first), Box::new(second)]).unwrap();
        let decl = registry.agent("echo").unwrap();
        assert_eq!(decl.class_path, "host.custom_echo");
        assert_eq!(decl.source, "host");
    }

    #[test]
    fn resolve_collects_transitive_services() {
        let registry = registry_with(
            vec![AgentDeclaration::new("llm", "builtin.llm")
                .with_required_services(&["llm_service"])
                .with_protocols(&["llm"])],
            vec![
                ServiceDeclaration::new("llm_service", "builtin.llm_service")
                    .with_required_deps(&["config_service"])
                    .with_protocols(&["llm"]),
                ServiceDeclaration::new("config_service", "builtin.config_service"),
            ],
        );

        let resolved = registry
            .resolve_agent_requirements(&BTreeSet::from(["llm".to_string()]));
        assert_eq!(
            resolved.services,
            BTreeSet::from(["llm_service".to_string(), "config_service".to_string()])
        );
        assert!(resolved.protocols.contains("llm"));
        assert!(resolved.missing.is_empty());
    }

    #[test]
    fn resolve_records_missing_agent_types() {
        let registry = registry_with(vec![], vec![]);
        let resolved = registry
            .resolve_agent_requirements(&BTreeSet::from(["nonexistent".to_string()]));
        assert_eq!(
            resolved.missing,
            BTreeSet::from(["nonexistent".to_string()])
        );
        assert!(resolved.services.is_empty());
    }

    #[test]
    fn load_order_is_topological_with_alphabetical_ties() {
        let registry = registry_with(
            vec![],
            vec![
                ServiceDeclaration::new("zeta", "z").with_required_deps(&["base"]),
                ServiceDeclaration::new("alpha", "a").with_required_deps(&["base"]),
                ServiceDeclaration::new("base", "b"),
            ],
        );

        let order = registry
            .service_load_order(&BTreeSet::from([
                "zeta".to_string(),
                "alpha".to_string(),
            ]))
            .unwrap();
        assert_eq!(order, vec!["base", "alpha", "zeta"]);
    }

    #[test]
    fn cycle_in_declarations_fails_build() {
        let source = StaticDeclarationSource::new("test")
            .with_service(ServiceDeclaration::new("a", "a").with_required_deps(&["b"]))
            .with_service(ServiceDeclaration::new("b", "b").with_optional_deps(&["a"]));

        let err = DeclarationRegistry::build(&[Box::new(source)]).unwrap_err();
        assert!(matches!(err, AgentMapError::CyclicServiceGraph { .. }));
    }

    #[test]
    fn optional_deps_are_skipped_when_undeclared() {
        let registry = registry_with(
            vec![AgentDeclaration::new("a", "a").with_required_services(&["svc"])],
            vec![ServiceDeclaration::new("svc", "svc")
                .with_optional_deps(&["nice_to_have"])],
        );
        let resolved =
            registry.resolve_agent_requirements(&BTreeSet::from(["a".to_string()]));
        assert_eq!(resolved.services, BTreeSet::from(["svc".to_string()]));
        assert!(resolved.missing.is_empty());
    }
}
