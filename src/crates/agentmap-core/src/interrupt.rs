//! Human interaction models and thread lifecycle
//!
//! A suspension carries a [`HumanInteractionRequest`] out of the graph; the
//! eventual [`HumanInteractionResponse`] comes back through the resume
//! path. [`ThreadMetadata`] tracks where each thread stands in the
//! `running -> (suspended -> resuming -> running)* -> completed | failed`
//! lifecycle; transitions outside that machine are rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use uuid::Uuid;

/// Kinds of human interaction a node can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    #[default]
    Approval,
    Choice,
    TextInput,
    Edit,
    Conversation,
}

/// A request for human input raised by a node's agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInteractionRequest {
    pub id: String,
    pub thread_id: String,
    pub node_name: String,
    pub interaction_type: InteractionType,
    pub prompt: String,
    pub context: Map<String, Value>,
    pub options: Vec<String>,
    /// Advisory; expiration is surfaced as a new interaction, never forced
    pub timeout_seconds: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl HumanInteractionRequest {
    pub fn new(
        thread_id: impl Into<String>,
        node_name: impl Into<String>,
        interaction_type: InteractionType,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            node_name: node_name.into(),
            interaction_type,
            prompt: prompt.into(),
            context: Map::new(),
            options: Vec::new(),
            timeout_seconds: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// A human's answer to a pending interaction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInteractionResponse {
    pub request_id: String,
    pub action: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl HumanInteractionResponse {
    pub fn new(request_id: impl Into<String>, action: impl Into<String>, data: Value) -> Self {
        Self {
            request_id: request_id.into(),
            action: action.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle state of an execution thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Running,
    Paused,
    Suspended,
    Resuming,
    Completed,
    Failed,
}

impl ThreadStatus {
    /// Whether the lifecycle allows moving to `next`
    pub fn can_transition_to(self, next: ThreadStatus) -> bool {
        use ThreadStatus::*;
        matches!(
            (self, next),
            (Running, Paused)
                | (Running, Suspended)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
                | (Suspended, Resuming)
                | (Suspended, Failed)
                | (Resuming, Running)
                | (Resuming, Completed)
                | (Resuming, Suspended)
                | (Resuming, Failed)
        )
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Suspended => "suspended",
            Self::Resuming => "resuming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything needed to find the bundle again at resume time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleInfo {
    pub bundle_path: Option<PathBuf>,
    pub csv_hash: Option<String>,
    pub csv_path: Option<PathBuf>,
    pub graph_name: String,
}

/// Durable per-thread execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub thread_id: String,
    pub status: ThreadStatus,
    pub graph_name: String,
    /// Node where the thread suspended, when suspended
    pub node_name: Option<String>,
    pub pending_interaction_id: Option<String>,
    pub last_response_id: Option<String>,
    /// Advisory timeout copied from the pending interaction request;
    /// expiration is surfaced as a new interaction, never enforced here
    pub timeout_seconds: Option<u64>,
    pub bundle_info: BundleInfo,
    /// Agent-provided snapshot accompanying the suspension
    pub checkpoint_data: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadMetadata {
    pub fn new(
        thread_id: impl Into<String>,
        graph_name: impl Into<String>,
        bundle_info: BundleInfo,
    ) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            status: ThreadStatus::Running,
            graph_name: graph_name.into(),
            node_name: None,
            pending_interaction_id: None,
            last_response_id: None,
            timeout_seconds: None,
            bundle_info,
            checkpoint_data: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use ThreadStatus::*;
        assert!(Running.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Resuming));
        assert!(Resuming.can_transition_to(Running));
        assert!(Resuming.can_transition_to(Completed));
        assert!(Resuming.can_transition_to(Suspended));
        assert!(Running.can_transition_to(Completed));

        assert!(!Completed.can_transition_to(Running));
        assert!(!Suspended.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Resuming));
    }

    #[test]
    fn request_serializes_with_type_tag() {
        let request = HumanInteractionRequest::new("t-1", "Approve", InteractionType::Choice, "pick one")
            .with_options(vec!["a".into(), "b".into()])
            .with_timeout(300);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["interaction_type"], "choice");
        assert_eq!(json["timeout_seconds"], 300);

        let back: HumanInteractionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.options.len(), 2);
        assert_eq!(back.thread_id, "t-1");
    }
}
