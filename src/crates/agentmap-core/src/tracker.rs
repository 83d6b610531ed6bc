//! Per-run execution tracking
//!
//! The [`ExecutionTracker`] records one [`NodeExecution`] per node
//! invocation: start, end, duration, success and error. The runner owns
//! the tracker behind a mutex so concurrent branches serialize their
//! updates through a single writer.

use crate::bundle::CompiledFrom;
use crate::state::ExecutionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a tracked run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Suspended,
}

/// Record of a single node invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub success: Option<bool>,
    pub inputs: ExecutionState,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl NodeExecution {
    /// Terminal once the end time is set
    pub fn is_terminal(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Mutable per-run record of node executions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTracker {
    pub thread_id: String,
    pub graph_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub node_executions: Vec<NodeExecution>,
    pub status: ExecutionStatus,
}

impl ExecutionTracker {
    pub fn new(thread_id: impl Into<String>, graph_name: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            graph_name: graph_name.into(),
            start_time: Utc::now(),
            end_time: None,
            node_executions: Vec::new(),
            status: ExecutionStatus::Running,
        }
    }

    /// Record a node starting; returns the execution's index for the
    /// matching end call
    pub fn record_node_start(
        &mut self,
        node_name: impl Into<String>,
        inputs: ExecutionState,
    ) -> usize {
        self.node_executions.push(NodeExecution {
            node_name: node_name.into(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            success: None,
            inputs,
            output: None,
            error: None,
        });
        self.node_executions.len() - 1
    }

    /// Record a node finishing
    pub fn record_node_end(
        &mut self,
        index: usize,
        success: bool,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        if let Some(execution) = self.node_executions.get_mut(index) {
            let end = Utc::now();
            execution.duration_ms = Some((end - execution.start_time).num_milliseconds());
            execution.end_time = Some(end);
            execution.success = Some(success);
            execution.output = output;
            execution.error = error;
        }
    }

    /// Discard a started execution that never completed (a suspension);
    /// only valid for the most recent start
    pub fn discard_node_start(&mut self, index: usize) {
        if index == self.node_executions.len().saturating_sub(1)
            && self
                .node_executions
                .get(index)
                .is_some_and(|e| !e.is_terminal())
        {
            self.node_executions.remove(index);
        }
    }

    /// Close the run with a final status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }

    /// Total wall-clock duration so far
    pub fn total_duration_ms(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds()
    }

    /// Serializable summary of this run
    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            thread_id: self.thread_id.clone(),
            graph_name: self.graph_name.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            total_duration_ms: self.total_duration_ms(),
            node_executions: self
                .node_executions
                .iter()
                .map(|e| NodeExecutionSummary {
                    node_name: e.node_name.clone(),
                    success: e.success,
                    duration_ms: e.duration_ms,
                    error: e.error.clone(),
                })
                .collect(),
        }
    }
}

/// Compact, serializable view of one node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionSummary {
    pub node_name: String,
    pub success: Option<bool>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

/// Compact, serializable view of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub thread_id: String,
    pub graph_name: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_ms: i64,
    pub node_executions: Vec<NodeExecutionSummary>,
}

/// Final outcome of a run handed back to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub graph_name: String,
    pub final_state: ExecutionState,
    pub execution_summary: ExecutionSummary,
    pub success: bool,
    pub total_duration_ms: i64,
    pub error: Option<String>,
    pub compiled_from: CompiledFrom,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_end_round_trip() {
        let mut tracker = ExecutionTracker::new("t-1", "G");
        let idx = tracker.record_node_start("A", ExecutionState::new());
        assert!(!tracker.node_executions[idx].is_terminal());

        tracker.record_node_end(idx, true, Some(json!("out")), None);
        let execution = &tracker.node_executions[idx];
        assert!(execution.is_terminal());
        assert_eq!(execution.success, Some(true));
        assert!(execution.duration_ms.is_some());
    }

    #[test]
    fn discard_removes_only_pending_tail() {
        let mut tracker = ExecutionTracker::new("t-1", "G");
        let first = tracker.record_node_start("A", ExecutionState::new());
        tracker.record_node_end(first, true, None, None);

        let second = tracker.record_node_start("H", ExecutionState::new());
        tracker.discard_node_start(second);
        assert_eq!(tracker.node_executions.len(), 1);

        // A terminal record is not discarded
        tracker.discard_node_start(first);
        assert_eq!(tracker.node_executions.len(), 1);
    }

    #[test]
    fn summary_reflects_executions() {
        let mut tracker = ExecutionTracker::new("t-1", "G");
        let idx = tracker.record_node_start("A", ExecutionState::new());
        tracker.record_node_end(idx, false, None, Some("boom".into()));
        tracker.finish(ExecutionStatus::Failed);

        let summary = tracker.summary();
        assert_eq!(summary.status, ExecutionStatus::Failed);
        assert_eq!(summary.node_executions.len(), 1);
        assert_eq!(summary.node_executions[0].success, Some(false));
        assert_eq!(summary.node_executions[0].error.as_deref(), Some("boom"));
        assert!(summary.end_time.is_some());
    }
}
