//! Storage trait for checkpoint persistence backends
//!
//! [`CheckpointSaver`] is the seam between the execution engine and storage.
//! Two implementations ship with this crate: [`crate::memory::InMemorySaver`]
//! for tests and short-lived runs, and [`crate::fs::FileSaver`] for durable
//! per-thread snapshots on disk. Backends assign monotonic checkpoint ids at
//! `put` time, so callers hand in checkpoints with placeholder ids.
//!
//! Write operations report failure through [`WriteResult`] instead of `Err`;
//! the engine treats a failed non-critical write as recoverable and decides
//! per call site whether to abort.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::{Result, WriteResult};
use async_trait::async_trait;
use serde_json::Value;

/// Pluggable checkpoint persistence backend
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Append a checkpoint for the thread named in `config`.
    ///
    /// The backend assigns the monotonic checkpoint id and links the new
    /// checkpoint to the thread's previous latest as its parent. The
    /// assigned id is returned in [`WriteResult::id`].
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> WriteResult;

    /// Fetch the checkpoint addressed by `config`.
    ///
    /// With no `checkpoint_id` this returns the thread's latest checkpoint,
    /// ties broken by write order (last write wins). Returns `Ok(None)` when
    /// the thread has no checkpoints.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Record intermediate writes for a task in the sibling `writes`
    /// namespace, keyed by thread id and task id.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> WriteResult;

    /// List checkpoints for a thread, most recent first.
    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointTuple>>;
}

/// Extract the thread id from a config or describe why it is missing
pub(crate) fn require_thread_id(config: &CheckpointConfig) -> std::result::Result<&str, String> {
    config
        .thread_id
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "checkpoint config requires a thread_id".to_string())
}
