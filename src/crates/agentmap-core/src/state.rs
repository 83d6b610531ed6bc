//! Execution state and the adapter between agents and the state map
//!
//! State is a JSON object threaded through the graph. Agents never touch
//! the full map directly: the runner extracts their declared `input_fields`
//! into an inputs map, and merges their output back under the declared
//! `output_field` (scalar) or as a multi-key overlay (list).
//!
//! Keys with the `__` prefix are reserved for the engine.

use crate::spec::OutputField;
use serde_json::{Map, Value};

/// The workflow payload flowing along edges
pub type ExecutionState = Map<String, Value>;

/// Reserved state keys
pub mod reserved {
    /// Dynamic router hint written by orchestration-capable agents
    pub const NEXT_NODE: &str = "__next_node";
    /// Thread identity of the current run
    pub const THREAD_ID: &str = "__thread_id";
    /// Human response injected on resume
    pub const HUMAN_RESPONSE: &str = "__human_response";
    /// Set when a run ended in suspension
    pub const INTERRUPTED: &str = "__interrupted";
    /// Interaction request details of a suspension
    pub const INTERRUPT_INFO: &str = "__interrupt_info";
    /// Serialized execution summary written at termination
    pub const EXECUTION_SUMMARY: &str = "__execution_summary";
    /// Result of the configured success policy
    pub const POLICY_SUCCESS: &str = "__policy_success";
    /// Outcome of the most recent node action; drives success/failure edges.
    /// Not `__`-prefixed: workflows read and write it deliberately.
    pub const LAST_ACTION_SUCCESS: &str = "last_action_success";
}

/// Stateless helpers for reading and writing [`ExecutionState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StateAdapter;

impl StateAdapter {
    /// Project the declared input fields out of the state. Missing fields
    /// are simply absent from the inputs map.
    pub fn extract_inputs(state: &ExecutionState, input_fields: &[String]) -> ExecutionState {
        let mut inputs = Map::new();
        for field in input_fields {
            if let Some(value) = state.get(field) {
                inputs.insert(field.clone(), value.clone());
            }
        }
        inputs
    }

    /// Merge an agent's output value into the state.
    ///
    /// - `Single(field)`: the whole value lands under `field`
    /// - `Multi(fields)`: the value must be an object; each listed field is
    ///   copied out of it (absent keys are skipped)
    /// - no output field: the value is discarded
    pub fn apply_output(
        state: &mut ExecutionState,
        output_field: Option<&OutputField>,
        value: Value,
    ) {
        match output_field {
            Some(OutputField::Single(field)) => {
                state.insert(field.clone(), value);
            }
            Some(OutputField::Multi(fields)) => {
                if let Value::Object(map) = value {
                    for field in fields {
                        if let Some(v) = map.get(field) {
                            state.insert(field.clone(), v.clone());
                        }
                    }
                } else {
                    tracing::warn!(
                        "multi-field output declared but agent returned a non-object; discarding"
                    );
                }
            }
            None => {}
        }
    }

    /// Key-wise overlay: `other`'s entries overwrite `base`'s on collision
    pub fn overlay(base: &mut ExecutionState, other: ExecutionState) {
        for (key, value) in other {
            base.insert(key, value);
        }
    }

    /// Routing view of the last action outcome: anything but explicit
    /// `false` counts as success
    pub fn last_action_success(state: &ExecutionState) -> bool {
        !matches!(
            state.get(reserved::LAST_ACTION_SUCCESS),
            Some(Value::Bool(false))
        )
    }

    /// Take and clear the dynamic-router hint, if set to a string
    pub fn take_next_node(state: &mut ExecutionState) -> Option<String> {
        match state.remove(reserved::NEXT_NODE) {
            Some(Value::String(next)) => Some(next),
            Some(other) => {
                tracing::warn!(value = %other, "__next_node was not a string; ignoring");
                None
            }
            None => None,
        }
    }

    /// User-visible portion of the state (reserved keys stripped)
    pub fn without_reserved(state: &ExecutionState) -> ExecutionState {
        state
            .iter()
            .filter(|(k, _)| !k.starts_with("__"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
