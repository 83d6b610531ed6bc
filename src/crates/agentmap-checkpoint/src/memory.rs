//! In-memory checkpoint storage for development and testing
//!
//! [`InMemorySaver`] keeps every thread's checkpoint history in a
//! `HashMap` behind a `tokio::sync::RwLock`. All data is lost on restart;
//! use [`crate::fs::FileSaver`] when checkpoints must survive the process.

use crate::checkpoint::{
    sequence_id, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
};
use crate::error::{CheckpointError, Result, WriteResult};
use crate::traits::{require_thread_id, CheckpointSaver};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    parent_config: Option<CheckpointConfig>,
}

/// Thread-safe in-memory checkpoint saver
///
/// Cloning shares the underlying storage, so a clone handed to the runner
/// observes the same history as the original.
#[derive(Debug, Clone, Default)]
pub struct InMemorySaver {
    checkpoints: Arc<RwLock<HashMap<String, Vec<CheckpointEntry>>>>,
    writes: Arc<RwLock<HashMap<(String, String), Vec<(String, Value)>>>>,
}

impl InMemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with at least one checkpoint
    pub async fn thread_count(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    /// Total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.checkpoints
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Recorded intermediate writes for a thread and task
    pub async fn writes_for(&self, thread_id: &str, task_id: &str) -> Vec<(String, Value)> {
        self.writes
            .read()
            .await
            .get(&(thread_id.to_string(), task_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Drop all stored data (test isolation)
    pub async fn clear(&self) {
        self.checkpoints.write().await.clear();
        self.writes.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemorySaver {
    async fn put(
        &self,
        config: &CheckpointConfig,
        mut checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> WriteResult {
        let thread_id = match require_thread_id(config) {
            Ok(t) => t.to_string(),
            Err(e) => return WriteResult::failed(e),
        };

        let mut storage = self.checkpoints.write().await;
        let entries = storage.entry(thread_id.clone()).or_default();

        let id = sequence_id(entries.len() as u64 + 1);
        checkpoint.id = id.clone();

        let parent_config = entries.last().map(|prev| {
            checkpoint.parent_id = Some(prev.checkpoint.id.clone());
            CheckpointConfig::for_thread(&thread_id).with_checkpoint_id(prev.checkpoint.id.clone())
        });

        entries.push(CheckpointEntry {
            checkpoint,
            metadata,
            parent_config,
        });

        WriteResult::ok(id)
    }

    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id =
            require_thread_id(config).map_err(CheckpointError::Invalid)?;

        let storage = self.checkpoints.read().await;
        let entries = match storage.get(thread_id) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return Ok(None),
        };

        // Write order is append order, so "latest" is the last entry even
        // when two checkpoints share a timestamp.
        let entry = match &config.checkpoint_id {
            Some(id) => entries.iter().rev().find(|e| &e.checkpoint.id == id),
            None => entries.last(),
        };

        Ok(entry.map(|entry| CheckpointTuple {
            config: CheckpointConfig::for_thread(thread_id)
                .with_checkpoint_id(entry.checkpoint.id.clone()),
            checkpoint: entry.checkpoint.clone(),
            metadata: entry.metadata.clone(),
            parent_config: entry.parent_config.clone(),
        }))
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> WriteResult {
        let thread_id = match require_thread_id(config) {
            Ok(t) => t.to_string(),
            Err(e) => return WriteResult::failed(e),
        };

        self.writes
            .write()
            .await
            .entry((thread_id, task_id.clone()))
            .or_default()
            .extend(writes);

        WriteResult::ok(task_id)
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointTuple>> {
        let thread_id =
            require_thread_id(config).map_err(CheckpointError::Invalid)?;

        let storage = self.checkpoints.read().await;
        let entries = storage.get(thread_id).cloned().unwrap_or_default();

        let mut tuples: Vec<CheckpointTuple> = entries
            .into_iter()
            .rev()
            .map(|entry| CheckpointTuple {
                config: CheckpointConfig::for_thread(thread_id)
                    .with_checkpoint_id(entry.checkpoint.id.clone()),
                checkpoint: entry.checkpoint,
                metadata: entry.metadata,
                parent_config: entry.parent_config,
            })
            .collect();

        if let Some(limit) = limit {
            tuples.truncate(limit);
        }

        Ok(tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;

    fn snapshot(byte: u8) -> Checkpoint {
        Checkpoint::new(vec![byte])
    }

    #[tokio::test]
    async fn put_assigns_monotonic_ids_and_parents() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::for_thread("t-1");

        let first = saver
            .put(&config, snapshot(1), CheckpointMetadata::new())
            .await;
        let second = saver
            .put(&config, snapshot(2), CheckpointMetadata::new())
            .await;

        assert!(first.success && second.success);
        assert!(first.id.unwrap() < second.id.clone().unwrap());

        let tuple = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.state_snapshot, vec![2]);
        assert_eq!(tuple.checkpoint.parent_id.as_deref(), Some("00000001"));
        assert!(tuple.parent_config.is_some());
    }

    #[tokio::test]
    async fn get_tuple_by_explicit_id() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::for_thread("t-1");
        saver
            .put(&config, snapshot(1), CheckpointMetadata::new())
            .await;
        saver
            .put(&config, snapshot(2), CheckpointMetadata::new())
            .await;

        let first = saver
            .get_tuple(&config.clone().with_checkpoint_id("00000001".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.checkpoint.state_snapshot, vec![1]);
    }

    #[tokio::test]
    async fn missing_thread_id_is_reported_not_thrown() {
        let saver = InMemorySaver::new();
        let result = saver
            .put(
                &CheckpointConfig::default(),
                snapshot(0),
                CheckpointMetadata::new(),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("thread_id"));
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::for_thread("t-1");
        for i in 0..3 {
            saver
                .put(
                    &config,
                    snapshot(i),
                    CheckpointMetadata::new().with_source(CheckpointSource::Step),
                )
                .await;
        }

        let listed = saver.list(&config, Some(2)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].checkpoint.state_snapshot, vec![2]);
        assert_eq!(listed[1].checkpoint.state_snapshot, vec![1]);
    }

    #[tokio::test]
    async fn writes_are_recorded_per_task() {
        let saver = InMemorySaver::new();
        let config = CheckpointConfig::for_thread("t-1");

        let result = saver
            .put_writes(
                &config,
                vec![("partial".to_string(), serde_json::json!(1))],
                "task-a".to_string(),
            )
            .await;

        assert!(result.success);
        let writes = saver.writes_for("t-1", "task-a").await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "partial");
    }
}
