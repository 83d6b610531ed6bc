//! Graph execution
//!
//! The runner walks an [`ExecutableGraph`] from its entry point, threading
//! the state map through node steps. Per node, the order is fixed: extract
//! inputs, record start, invoke agent, merge output, record end, persist a
//! checkpoint when wired, route. Suspension surfaces as a typed
//! [`RunOutcome::Suspended`]; callers outside the engine only ever see
//! [`ExecutionResult`]s.
//!
//! Parallel fan-outs spawn one task per branch. Each branch runs its
//! subgraph until the statically computed join node (or termination); the
//! parent then merges branch states by keyed overlay in declaration order,
//! so the merged result is deterministic regardless of scheduling.

use crate::agent::AgentOutcome;
use crate::assembler::{ExecutableGraph, Router};
use crate::bundle::CompiledFrom;
use crate::error::{AgentMapError, Result};
use crate::interrupt::HumanInteractionRequest;
use crate::policy::SuccessPolicy;
use crate::spec::EdgeTarget;
use crate::state::{reserved, ExecutionState, StateAdapter};
use crate::tracker::{ExecutionResult, ExecutionStatus, ExecutionTracker};
use agentmap_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource,
};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Cooperative cancellation flag propagated to every branch
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a run produced
#[derive(Debug)]
pub enum RunOutcome {
    Completed(ExecutionResult),
    /// The run suspended for human input. The result is already shaped for
    /// callers (`success=false`, `__interrupted=true`); the request and
    /// checkpoint data are for the suspend/resume machinery to persist.
    Suspended {
        result: ExecutionResult,
        request: HumanInteractionRequest,
        checkpoint_data: Map<String, Value>,
    },
}

impl RunOutcome {
    pub fn result(&self) -> &ExecutionResult {
        match self {
            Self::Completed(result) => result,
            Self::Suspended { result, .. } => result,
        }
    }

    pub fn into_result(self) -> ExecutionResult {
        match self {
            Self::Completed(result) => result,
            Self::Suspended { result, .. } => result,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }
}

enum PathOutcome {
    Completed(ExecutionState),
    Suspended {
        state: ExecutionState,
        request: HumanInteractionRequest,
        checkpoint_data: Map<String, Value>,
    },
}

enum RouteDecision {
    Halt,
    Single(String),
    FanOut(Vec<String>),
}

/// Drives executions of assembled graphs
#[derive(Debug, Clone, Default)]
pub struct GraphRunner {
    policy: SuccessPolicy,
}

impl GraphRunner {
    pub fn new(policy: SuccessPolicy) -> Self {
        Self { policy }
    }

    /// Execute a graph from its entry point
    #[tracing::instrument(skip_all, fields(graph = %graph.graph_name))]
    pub async fn run(
        &self,
        graph: Arc<ExecutableGraph>,
        initial_state: ExecutionState,
        compiled_from: CompiledFrom,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let entry = graph.entry_point.clone();
        self.run_from(graph, &entry, initial_state, compiled_from, cancel)
            .await
    }

    /// Execute a graph starting at an arbitrary node (resume path)
    pub async fn run_from(
        &self,
        graph: Arc<ExecutableGraph>,
        start_node: &str,
        mut state: ExecutionState,
        compiled_from: CompiledFrom,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        graph.step(start_node)?;

        let thread_id = match state.get(reserved::THREAD_ID).and_then(Value::as_str) {
            Some(existing) => existing.to_string(),
            None => {
                let fresh = Uuid::new_v4().to_string();
                state.insert(reserved::THREAD_ID.to_string(), Value::String(fresh.clone()));
                fresh
            }
        };

        let tracker = Arc::new(Mutex::new(ExecutionTracker::new(
            &thread_id,
            &graph.graph_name,
        )));

        if let Some(saver) = &graph.checkpointer {
            let result = saver
                .put(
                    &CheckpointConfig::for_thread(&thread_id),
                    Checkpoint::new(serde_json::to_vec(&state)?),
                    CheckpointMetadata::new()
                        .with_source(CheckpointSource::Input)
                        .with_step(-1),
                )
                .await;
            if !result.success {
                tracing::warn!(
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "input checkpoint write failed; continuing"
                );
            }
        }

        tracing::info!(thread_id = %thread_id, start = %start_node, "starting graph execution");
        let outcome = execute_path(
            graph.clone(),
            start_node.to_string(),
            state,
            None,
            tracker.clone(),
            cancel.clone(),
        )
        .await?;

        match outcome {
            PathOutcome::Completed(mut final_state) => {
                let mut tracker = tracker.lock().await;
                tracker.finish(ExecutionStatus::Completed);
                let graph_success = self.policy.evaluate(&tracker);
                final_state.insert(
                    reserved::POLICY_SUCCESS.to_string(),
                    Value::Bool(graph_success),
                );
                let summary = tracker.summary();
                final_state.insert(
                    reserved::EXECUTION_SUMMARY.to_string(),
                    serde_json::to_value(&summary)?,
                );

                tracing::info!(
                    thread_id = %thread_id,
                    success = graph_success,
                    nodes = summary.node_executions.len(),
                    "graph execution completed"
                );
                Ok(RunOutcome::Completed(ExecutionResult {
                    graph_name: graph.graph_name.clone(),
                    final_state,
                    success: graph_success,
                    total_duration_ms: summary.total_duration_ms,
                    execution_summary: summary,
                    error: None,
                    compiled_from,
                }))
            }
            PathOutcome::Suspended {
                mut state,
                request,
                checkpoint_data,
            } => {
                let mut tracker = tracker.lock().await;
                tracker.finish(ExecutionStatus::Suspended);
                state.insert(reserved::INTERRUPTED.to_string(), Value::Bool(true));
                state.insert(
                    reserved::INTERRUPT_INFO.to_string(),
                    serde_json::to_value(&request)?,
                );
                let summary = tracker.summary();

                tracing::info!(
                    thread_id = %thread_id,
                    node = %request.node_name,
                    interaction = %request.id,
                    "graph execution suspended for human input"
                );
                Ok(RunOutcome::Suspended {
                    result: ExecutionResult {
                        graph_name: graph.graph_name.clone(),
                        final_state: state,
                        success: false,
                        total_duration_ms: summary.total_duration_ms,
                        execution_summary: summary,
                        error: None,
                        compiled_from,
                    },
                    request,
                    checkpoint_data,
                })
            }
        }
    }
}

/// Walk one path of the graph until halt, the `stop_at` join node, or a
/// suspension. Returns a boxed future so fan-out branches can recurse.
fn execute_path(
    graph: Arc<ExecutableGraph>,
    start: String,
    mut state: ExecutionState,
    stop_at: Option<String>,
    tracker: Arc<Mutex<ExecutionTracker>>,
    cancel: CancelToken,
) -> BoxFuture<'static, Result<PathOutcome>> {
    Box::pin(async move {
        let mut current = start;
        loop {
            if stop_at.as_deref() == Some(current.as_str()) {
                return Ok(PathOutcome::Completed(state));
            }
            if cancel.is_cancelled() {
                return Err(AgentMapError::Execution("execution cancelled".to_string()));
            }

            let step = graph.step(&current)?;
            let inputs = StateAdapter::extract_inputs(&state, &step.input_fields);
            let index = tracker
                .lock()
                .await
                .record_node_start(&current, inputs.clone());

            tracing::debug!(node = %current, "invoking agent");
            let node_success = match step.agent.execute(&inputs, &state).await {
                Ok(AgentOutcome::Suspend {
                    request,
                    checkpoint_data,
                }) => {
                    // The node did not execute; the resumed run records it
                    tracker.lock().await.discard_node_start(index);
                    return Ok(PathOutcome::Suspended {
                        state,
                        request,
                        checkpoint_data,
                    });
                }
                Ok(AgentOutcome::Output(value)) => {
                    let (value, success_override) = extract_control_keys(value, &mut state);
                    let success = success_override.unwrap_or(true);
                    StateAdapter::apply_output(&mut state, step.output_field.as_ref(), value.clone());
                    state.insert(
                        reserved::LAST_ACTION_SUCCESS.to_string(),
                        Value::Bool(success),
                    );
                    tracker
                        .lock()
                        .await
                        .record_node_end(index, success, Some(value), None);
                    success
                }
                Err(e) => {
                    // Recoverable: the failure is recorded and routing
                    // decides what happens next
                    tracing::warn!(node = %current, error = %e, "agent execution failed");
                    state.insert(
                        reserved::LAST_ACTION_SUCCESS.to_string(),
                        Value::Bool(false),
                    );
                    tracker
                        .lock()
                        .await
                        .record_node_end(index, false, None, Some(e.to_string()));
                    false
                }
            };

            if let Some(saver) = &graph.checkpointer {
                persist_step_checkpoint(saver.as_ref(), &state, &current, index).await;
            }

            if step.dynamic_route {
                if let Some(next) = StateAdapter::take_next_node(&mut state) {
                    tracing::debug!(node = %current, next = %next, "dynamic route");
                    current = next;
                    continue;
                }
            }

            match decide_route(&graph, step, &state, node_success)? {
                RouteDecision::Halt => return Ok(PathOutcome::Completed(state)),
                RouteDecision::Single(next) => current = next,
                RouteDecision::FanOut(targets) => {
                    let join = graph.structure.join_node(&targets);
                    tracing::debug!(
                        node = %current,
                        branches = targets.len(),
                        join = join.as_deref().unwrap_or("<none>"),
                        "parallel fan-out"
                    );

                    let mut handles = Vec::with_capacity(targets.len());
                    for target in &targets {
                        handles.push(tokio::spawn(execute_path(
                            graph.clone(),
                            target.clone(),
                            state.clone(),
                            join.clone(),
                            tracker.clone(),
                            cancel.clone(),
                        )));
                    }

                    // Await in declaration order; merge is keyed overlay in
                    // the same order, so scheduling cannot change the result
                    let mut suspension: Option<PathOutcome> = None;
                    let mut branch_states = Vec::with_capacity(handles.len());
                    for handle in handles {
                        let branch = handle.await.map_err(|e| {
                            AgentMapError::Execution(format!("branch task failed: {e}"))
                        })??;
                        match branch {
                            PathOutcome::Completed(branch_state) => {
                                branch_states.push(branch_state)
                            }
                            suspended @ PathOutcome::Suspended { .. } => {
                                if suspension.is_none() {
                                    suspension = Some(suspended);
                                }
                            }
                        }
                    }
                    if let Some(suspended) = suspension {
                        return Ok(suspended);
                    }

                    // Record what each branch contributed before the merge
                    if let Some(saver) = &graph.checkpointer {
                        for (target, branch_state) in targets.iter().zip(&branch_states) {
                            persist_branch_writes(
                                saver.as_ref(),
                                &state,
                                branch_state,
                                target,
                            )
                            .await;
                        }
                    }

                    for branch_state in branch_states {
                        StateAdapter::overlay(&mut state, branch_state);
                    }
                    match join {
                        Some(join_node) => current = join_node,
                        None => return Ok(PathOutcome::Completed(state)),
                    }
                }
            }
        }
    })
}

/// Pull engine control keys out of an agent's object output.
///
/// `last_action_success` overrides the routing outcome; `__next_node` is
/// moved into the state for the dynamic router. Both are removed from the
/// merged output value.
fn extract_control_keys(
    value: Value,
    state: &mut ExecutionState,
) -> (Value, Option<bool>) {
    let mut map = match value {
        Value::Object(map) => map,
        other => return (other, None),
    };
    let success_override = match map.remove(reserved::LAST_ACTION_SUCCESS) {
        Some(Value::Bool(b)) => Some(b),
        Some(other) => {
            map.insert(reserved::LAST_ACTION_SUCCESS.to_string(), other);
            None
        }
        None => None,
    };
    if let Some(next) = map.remove(reserved::NEXT_NODE) {
        state.insert(reserved::NEXT_NODE.to_string(), next);
    }
    (Value::Object(map), success_override)
}

fn decide_route(
    graph: &ExecutableGraph,
    step: &crate::assembler::NodeStep,
    state: &ExecutionState,
    node_success: bool,
) -> Result<RouteDecision> {
    let from_target = |target: &EdgeTarget| match target {
        EdgeTarget::Single(next) => RouteDecision::Single(next.clone()),
        EdgeTarget::Parallel(targets) => RouteDecision::FanOut(targets.clone()),
    };

    match &step.router {
        Router::End => Ok(RouteDecision::Halt),
        Router::Unconditional(target) => Ok(from_target(target)),
        Router::Branch { success, failure } => {
            let succeeded = node_success && StateAdapter::last_action_success(state);
            let chosen = if succeeded { success } else { failure };
            Ok(chosen
                .as_ref()
                .map(from_target)
                .unwrap_or(RouteDecision::Halt))
        }
        Router::Function {
            impl_path,
            success_target,
            failure_target,
        } => {
            let function = graph.functions.get(impl_path).ok_or_else(|| {
                AgentMapError::Configuration(format!(
                    "routing function '{impl_path}' is not registered"
                ))
            })?;
            Ok(RouteDecision::Single(function(
                state,
                success_target,
                failure_target,
            )))
        }
    }
}

/// Record a branch's new state keys in the `writes` namespace, keyed by
/// thread id and branch entry node; best effort
async fn persist_branch_writes(
    saver: &dyn agentmap_checkpoint::CheckpointSaver,
    parent_state: &ExecutionState,
    branch_state: &ExecutionState,
    branch_entry: &str,
) {
    let writes: Vec<(String, Value)> = branch_state
        .iter()
        .filter(|(key, value)| {
            !key.starts_with("__") && parent_state.get(*key) != Some(*value)
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if writes.is_empty() {
        return;
    }

    let thread_id = parent_state
        .get(reserved::THREAD_ID)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let result = saver
        .put_writes(
            &CheckpointConfig::for_thread(thread_id),
            writes,
            branch_entry.to_string(),
        )
        .await;
    if !result.success {
        tracing::warn!(
            branch = %branch_entry,
            error = result.error.as_deref().unwrap_or("unknown"),
            "branch writes record failed; continuing"
        );
    }
}

/// Best-effort per-step checkpoint; failures are logged, not fatal
async fn persist_step_checkpoint(
    saver: &dyn agentmap_checkpoint::CheckpointSaver,
    state: &ExecutionState,
    node: &str,
    step_index: usize,
) {
    let thread_id = state
        .get(reserved::THREAD_ID)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let snapshot = match serde_json::to_vec(state) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(node = %node, error = %e, "state not serializable; skipping checkpoint");
            return;
        }
    };

    let checkpoint =
        Checkpoint::new(snapshot).with_version_seen(node, step_index.to_string());
    let result = saver
        .put(
            &CheckpointConfig::for_thread(thread_id),
            checkpoint,
            CheckpointMetadata::new()
                .with_source(CheckpointSource::Step)
                .with_step(step_index as i64)
                .with_node(node),
        )
        .await;
    if !result.success {
        tracing::warn!(
            node = %node,
            error = result.error.as_deref().unwrap_or("unknown"),
            "step checkpoint write failed; continuing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentFactory;
    use crate::analyzer::StaticBundleAnalyzer;
    use crate::assembler::GraphAssembler;
    use crate::declarations::DeclarationRegistry;
    use crate::graph::{Graph, Node, EDGE_DEFAULT, EDGE_FAILURE, EDGE_SUCCESS};
    use crate::prebuilt::{
        register_builtin_agents, register_builtin_services, BuiltinDeclarationSource,
    };
    use crate::services::ServiceContainer;
    use agentmap_checkpoint::InMemorySaver;
    use serde_json::json;

    fn executable(graph: Graph) -> (Arc<ExecutableGraph>, Arc<InMemorySaver>) {
        let registry =
            DeclarationRegistry::build(&[Box::new(BuiltinDeclarationSource::new())]).unwrap();
        let bundle = StaticBundleAnalyzer::new(&registry)
            .analyze(&graph, b"csv")
            .unwrap();

        let mut factory = AgentFactory::new();
        register_builtin_agents(&mut factory);

        let saver = Arc::new(InMemorySaver::new());
        let mut container = ServiceContainer::new();
        let dir = tempfile::tempdir().unwrap();
        register_builtin_services(&mut container, dir.path(), saver.clone());
        container.instantiate_for_bundle(&bundle).unwrap();

        let executable = GraphAssembler::new(&factory)
            .assemble(&bundle, &container, Some(saver.clone()))
            .unwrap();
        (Arc::new(executable), saver)
    }

    fn edge(node: &mut Node, label: &str, target: EdgeTarget) {
        node.edges.insert(label.to_string(), target);
    }

    fn state_of(value: serde_json::Value) -> ExecutionState {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn linear_path_executes_in_order() {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "echo");
        a.output = Some(crate::spec::OutputField::Single("x".into()));
        edge(&mut a, EDGE_DEFAULT, EdgeTarget::Single("B".into()));
        let mut b = Node::new("B", "echo");
        b.output = Some(crate::spec::OutputField::Single("y".into()));
        edge(&mut b, EDGE_DEFAULT, EdgeTarget::Single("C".into()));
        let mut c = Node::new("C", "echo");
        c.output = Some(crate::spec::OutputField::Single("z".into()));
        graph.add_node(a);
        graph.add_node(b);
        graph.add_node(c);

        let (executable, _) = executable(graph);
        let runner = GraphRunner::new(SuccessPolicy::AllNodes);
        let outcome = runner
            .run(
                executable,
                ExecutionState::new(),
                CompiledFrom::Memory,
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let result = outcome.into_result();
        assert!(result.success);
        let order: Vec<&str> = result
            .execution_summary
            .node_executions
            .iter()
            .map(|e| e.node_name.as_str())
            .collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        for key in ["x", "y", "z"] {
            assert!(result.final_state.contains_key(key), "missing {key}");
        }
        assert_eq!(result.final_state[reserved::POLICY_SUCCESS], json!(true));
    }

    #[tokio::test]
    async fn failure_branch_is_taken() {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "branching");
        a.inputs = vec!["success".into()];
        edge(&mut a, EDGE_SUCCESS, EdgeTarget::Single("S".into()));
        edge(&mut a, EDGE_FAILURE, EdgeTarget::Single("F".into()));
        graph.add_node(a);
        graph.add_node(Node::new("S", "echo"));
        graph.add_node(Node::new("F", "echo"));

        let (executable, _) = executable(graph);
        let runner = GraphRunner::new(SuccessPolicy::FinalNode);
        let outcome = runner
            .run(
                executable,
                state_of(json!({"success": false})),
                CompiledFrom::Memory,
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let result = outcome.into_result();
        let order: Vec<&str> = result
            .execution_summary
            .node_executions
            .iter()
            .map(|e| e.node_name.as_str())
            .collect();
        assert_eq!(order, vec!["A", "F"]);
        // Final node succeeded even though A reported failure
        assert!(result.success);
    }

    #[tokio::test]
    async fn fan_out_merges_in_list_order() {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "echo");
        edge(
            &mut a,
            EDGE_DEFAULT,
            EdgeTarget::Parallel(vec!["B".into(), "C".into()]),
        );
        let mut b = Node::new("B", "echo");
        b.inputs = vec!["seed".into()];
        b.output = Some(crate::spec::OutputField::Single("b_out".into()));
        let mut c = Node::new("C", "echo");
        c.inputs = vec!["seed".into()];
        c.output = Some(crate::spec::OutputField::Single("c_out".into()));
        graph.add_node(a);
        graph.add_node(b);
        graph.add_node(c);

        let (executable, _) = executable(graph);
        let runner = GraphRunner::new(SuccessPolicy::AllNodes);
        let outcome = runner
            .run(
                executable,
                state_of(json!({"seed": 1})),
                CompiledFrom::Memory,
                &CancelToken::new(),
            )
            .await
            .unwrap();

        let result = outcome.into_result();
        assert!(result.success);
        assert!(result.final_state.contains_key("b_out"));
        assert!(result.final_state.contains_key("c_out"));
        assert_eq!(result.execution_summary.node_executions.len(), 3);
    }

    #[tokio::test]
    async fn fan_out_with_join_continues_once() {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "echo");
        edge(
            &mut a,
            EDGE_DEFAULT,
            EdgeTarget::Parallel(vec!["B".into(), "C".into()]),
        );
        let mut b = Node::new("B", "echo");
        b.output = Some(crate::spec::OutputField::Single("b_out".into()));
        edge(&mut b, EDGE_DEFAULT, EdgeTarget::Single("D".into()));
        let mut c = Node::new("C", "echo");
        c.output = Some(crate::spec::OutputField::Single("c_out".into()));
        edge(&mut c, EDGE_DEFAULT, EdgeTarget::Single("D".into()));
        let mut d = Node::new("D", "echo");
        d.output = Some(crate::spec::OutputField::Single("d_out".into()));
        graph.add_node(a);
        graph.add_node(b);
        graph.add_node(c);
        graph.add_node(d);

        let (executable, _) = executable(graph);
        let runner = GraphRunner::new(SuccessPolicy::AllNodes);
        let result = runner
            .run(
                executable,
                ExecutionState::new(),
                CompiledFrom::Memory,
                &CancelToken::new(),
            )
            .await
            .unwrap()
            .into_result();

        let d_runs = result
            .execution_summary
            .node_executions
            .iter()
            .filter(|e| e.node_name == "D")
            .count();
        assert_eq!(d_runs, 1, "join node must execute exactly once");
        assert!(result.final_state.contains_key("b_out"));
        assert!(result.final_state.contains_key("c_out"));
        assert!(result.final_state.contains_key("d_out"));
    }

    #[tokio::test]
    async fn suspension_produces_resumable_result() {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "echo");
        edge(&mut a, EDGE_DEFAULT, EdgeTarget::Single("H".into()));
        let mut h = Node::new("H", "human");
        h.prompt = Some("Approve?".into());
        graph.add_node(a);
        graph.add_node(h);

        let (executable, saver) = executable(graph);
        let runner = GraphRunner::new(SuccessPolicy::AllNodes);
        let outcome = runner
            .run(
                executable,
                ExecutionState::new(),
                CompiledFrom::Memory,
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.is_suspended());
        let RunOutcome::Suspended {
            result, request, ..
        } = outcome
        else {
            panic!("expected suspension");
        };
        assert!(!result.success);
        assert!(result.error.is_none());
        assert_eq!(result.final_state[reserved::INTERRUPTED], json!(true));
        assert_eq!(request.node_name, "H");
        // Only A is recorded; H never completed
        assert_eq!(result.execution_summary.node_executions.len(), 1);
        // Input + step checkpoints were written for the thread
        assert!(saver.checkpoint_count().await >= 2);
    }

    #[tokio::test]
    async fn failed_node_without_failure_edge_halts() {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "failure");
        edge(&mut a, EDGE_SUCCESS, EdgeTarget::Single("S".into()));
        graph.add_node(a);
        graph.add_node(Node::new("S", "echo"));

        let (executable, _) = executable(graph);
        let runner = GraphRunner::new(SuccessPolicy::AllNodes);
        let result = runner
            .run(
                executable,
                ExecutionState::new(),
                CompiledFrom::Memory,
                &CancelToken::new(),
            )
            .await
            .unwrap()
            .into_result();

        assert!(!result.success);
        assert_eq!(result.execution_summary.node_executions.len(), 1);
        assert_eq!(
            result.execution_summary.node_executions[0].success,
            Some(false)
        );
    }

    #[tokio::test]
    async fn cancellation_stops_the_walk() {
        let mut graph = Graph::new("G");
        let mut a = Node::new("A", "echo");
        edge(&mut a, EDGE_DEFAULT, EdgeTarget::Single("B".into()));
        graph.add_node(a);
        graph.add_node(Node::new("B", "echo"));

        let (executable, _) = executable(graph);
        let cancel = CancelToken::new();
        cancel.cancel();

        let runner = GraphRunner::new(SuccessPolicy::AllNodes);
        let err = runner
            .run(
                executable,
                ExecutionState::new(),
                CompiledFrom::Memory,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
