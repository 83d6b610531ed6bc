//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is a durable snapshot of a single execution thread taken
//! at a node boundary. Checkpoints are identified by a `thread_id` plus a
//! monotonically increasing `checkpoint_id`, so the latest snapshot for a
//! thread is always the one with the greatest id (ties broken by write
//! order). The execution state itself is carried as an opaque serialized
//! payload; this crate never interprets it.
//!
//! Core types:
//!
//! - [`Checkpoint`] - versioned snapshot with parent linkage and the nodes
//!   seen so far
//! - [`CheckpointConfig`] - thread id plus free-form configurable extras,
//!   used to address checkpoints
//! - [`CheckpointMetadata`] - step number, source and custom metadata
//! - [`CheckpointTuple`] - checkpoint joined with its config and metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Identifier of a single checkpoint within a thread
pub type CheckpointId = String;

/// Width of the zero-padded sequence component of generated checkpoint ids.
/// Zero padding keeps lexicographic order equal to numeric order.
const SEQUENCE_WIDTH: usize = 8;

/// Format a per-thread sequence number as a monotonic checkpoint id
pub fn sequence_id(seq: u64) -> CheckpointId {
    format!("{:0width$}", seq, width = SEQUENCE_WIDTH)
}

/// Durable snapshot of one execution thread at a node boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version
    pub v: i32,

    /// Monotonic id within the owning thread, assigned by the saver at `put`
    pub id: CheckpointId,

    /// Creation timestamp (UTC)
    pub created_at: DateTime<Utc>,

    /// Id of the checkpoint this one descends from, if any
    pub parent_id: Option<CheckpointId>,

    /// Serialized execution state. Opaque to the storage layer.
    #[serde(with = "serde_bytes_compat")]
    pub state_snapshot: Vec<u8>,

    /// Per-node sets of checkpoint ids the node had observed when this
    /// snapshot was taken. Carried for replay compatibility; restored sets
    /// may legally come back as lists.
    pub versions_seen: HashMap<String, BTreeSet<String>>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a checkpoint around an already-serialized state snapshot.
    ///
    /// The `id` is a placeholder until the saver assigns the real monotonic
    /// id at `put` time.
    pub fn new(state_snapshot: Vec<u8>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: String::new(),
            created_at: Utc::now(),
            parent_id: None,
            state_snapshot,
            versions_seen: HashMap::new(),
        }
    }

    /// Set the parent checkpoint id
    pub fn with_parent(mut self, parent_id: CheckpointId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Record that `node` has observed checkpoint `seen_id`
    pub fn with_version_seen(mut self, node: impl Into<String>, seen_id: impl Into<String>) -> Self {
        self.versions_seen
            .entry(node.into())
            .or_default()
            .insert(seen_id.into());
        self
    }
}

// Plain Vec<u8> serde; module exists so the wire shape stays explicit and a
// future swap to a bytes-optimized codec touches one place.
mod serde_bytes_compat {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        bytes.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(d)
    }
}

/// Addressing and routing configuration for checkpoint operations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointConfig {
    /// Thread id grouping related checkpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Specific checkpoint to address; `None` means "latest"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// Additional configurable values passed through to the backend
    #[serde(flatten)]
    pub configurable: HashMap<String, serde_json::Value>,
}

impl CheckpointConfig {
    /// Configuration addressing the latest checkpoint of a thread
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Address a specific checkpoint instead of the latest
    pub fn with_checkpoint_id(mut self, checkpoint_id: CheckpointId) -> Self {
        self.checkpoint_id = Some(checkpoint_id);
        self
    }

    /// Attach an extra configurable value
    pub fn with_configurable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.configurable.insert(key.into(), value);
        self
    }
}

/// Origin of a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Snapshot of the initial input state
    Input,
    /// Snapshot taken after a node step
    Step,
    /// Snapshot taken when execution suspended for human input
    Suspend,
    /// Snapshot written during resume
    Resume,
}

/// Metadata stored alongside a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointMetadata {
    /// Where this checkpoint came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Step number within the run (-1 for the input snapshot)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,

    /// Node that produced the snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Free-form custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A checkpoint joined with its addressing config, metadata and parent
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    /// Config that addresses this checkpoint
    pub config: CheckpointConfig,

    /// The snapshot itself
    pub checkpoint: Checkpoint,

    /// Metadata recorded at `put` time
    pub metadata: CheckpointMetadata,

    /// Config addressing the parent checkpoint, if any
    pub parent_config: Option<CheckpointConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ids_sort_lexicographically() {
        let ids: Vec<_> = [1u64, 2, 10, 99, 100, 12345678].iter().map(|s| sequence_id(*s)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn checkpoint_round_trips_through_json() {
        let cp = Checkpoint::new(vec![1, 2, 3])
            .with_parent("00000001".to_string())
            .with_version_seen("node_a", "00000001");

        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();

        assert_eq!(back.v, Checkpoint::CURRENT_VERSION);
        assert_eq!(back.state_snapshot, vec![1, 2, 3]);
        assert_eq!(back.parent_id.as_deref(), Some("00000001"));
        assert!(back.versions_seen["node_a"].contains("00000001"));
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn id_order_matches_sequence_order(a in 0u64..10_000_000, b in 0u64..10_000_000) {
                prop_assert_eq!(a.cmp(&b), sequence_id(a).cmp(&sequence_id(b)));
            }
        }
    }

    #[test]
    fn config_builder() {
        let config = CheckpointConfig::for_thread("t-1")
            .with_checkpoint_id("00000002".to_string())
            .with_configurable("ns", serde_json::json!("checkpoints"));

        assert_eq!(config.thread_id.as_deref(), Some("t-1"));
        assert_eq!(config.checkpoint_id.as_deref(), Some("00000002"));
        assert_eq!(config.configurable["ns"], serde_json::json!("checkpoints"));
    }
}
