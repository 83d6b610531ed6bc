//! Filesystem checkpoint storage
//!
//! [`FileSaver`] persists checkpoints under a root directory with two
//! namespaces:
//!
//! ```text
//! <root>/checkpoints/<thread_id>/<checkpoint_id>.ckpt
//! <root>/writes/<thread_id>/<task_id>.ckpt
//! ```
//!
//! Records are tagged binary payloads (see [`crate::serializer`]). Every
//! write lands in a temp file first and is renamed into place, so readers
//! never observe a partial record. Writes for different threads may run
//! concurrently; writes within a thread serialize on a per-saver lock.

use crate::checkpoint::{
    sequence_id, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
};
use crate::error::{CheckpointError, Result, WriteResult};
use crate::serializer::{BincodeSerializer, SerializerProtocol};
use crate::traits::{require_thread_id, CheckpointSaver};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const CHECKPOINT_EXT: &str = "ckpt";

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct WritesRecord {
    task_id: String,
    writes: Vec<(String, Value)>,
}

/// Checkpoint saver backed by the local filesystem
#[derive(Debug)]
pub struct FileSaver {
    root: PathBuf,
    serializer: BincodeSerializer,
    // Serializes id assignment and appends per saver. Cross-thread writes
    // could interleave safely, but id assignment reads the directory first.
    write_lock: Mutex<()>,
}

impl FileSaver {
    /// Create a saver rooted at `root`, creating the namespace directories
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("checkpoints"))?;
        std::fs::create_dir_all(root.join("writes"))?;
        Ok(Self {
            root,
            serializer: BincodeSerializer::new(),
            write_lock: Mutex::new(()),
        })
    }

    fn thread_dir(&self, namespace: &str, thread_id: &str) -> PathBuf {
        self.root.join(namespace).join(sanitize(thread_id))
    }

    /// Highest assigned sequence number in a thread directory
    fn last_sequence(dir: &Path) -> u64 {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };
        entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.strip_suffix(&format!(".{CHECKPOINT_EXT}"))
                    .and_then(|stem| stem.parse::<u64>().ok())
            })
            .max()
            .unwrap_or(0)
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await
    }

    fn read_record(&self, path: &Path) -> Result<CheckpointRecord> {
        let bytes = std::fs::read(path)?;
        self.serializer.loads(&bytes)
    }

    fn tuple_from_record(&self, thread_id: &str, record: CheckpointRecord) -> CheckpointTuple {
        let parent_config = record.checkpoint.parent_id.clone().map(|parent| {
            CheckpointConfig::for_thread(thread_id).with_checkpoint_id(parent)
        });
        CheckpointTuple {
            config: CheckpointConfig::for_thread(thread_id)
                .with_checkpoint_id(record.checkpoint.id.clone()),
            checkpoint: record.checkpoint,
            metadata: record.metadata,
            parent_config,
        }
    }
}

#[async_trait]
impl CheckpointSaver for FileSaver {
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

        let _guard = self.write_lock.lock().await;
        let dir = self.thread_dir("checkpoints", &thread_id);
        let last = Self::last_sequence(&dir);

        checkpoint.parent_id = (last > 0).then(|| sequence_id(last));
        let id = sequence_id(last + 1);
        checkpoint.id = id.clone();

        let record = CheckpointRecord {
            checkpoint,
            metadata,
        };
        let bytes = match self.serializer.dumps(&record) {
            Ok(bytes) => bytes,
            Err(e) => return WriteResult::failed(e.to_string()),
        };

        let path = dir.join(format!("{id}.{CHECKPOINT_EXT}"));
        match self.write_atomic(&path, &bytes).await {
            Ok(()) => WriteResult::ok(id),
            Err(e) => WriteResult::failed(format!("checkpoint write failed: {e}")),
        }
    }

    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = require_thread_id(config).map_err(CheckpointError::Invalid)?;
        let dir = self.thread_dir("checkpoints", thread_id);

        let id = match &config.checkpoint_id {
            Some(id) => id.clone(),
            None => {
                let last = Self::last_sequence(&dir);
                if last == 0 {
                    return Ok(None);
                }
                sequence_id(last)
            }
        };

        let path = dir.join(format!("{id}.{CHECKPOINT_EXT}"));
        if !path.exists() {
            return Ok(None);
        }
        let record = self.read_record(&path)?;
        Ok(Some(self.tuple_from_record(thread_id, record)))
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

        let record = WritesRecord {
            task_id: task_id.clone(),
            writes,
        };
        let bytes = match self.serializer.dumps(&record) {
            Ok(bytes) => bytes,
            Err(e) => return WriteResult::failed(e.to_string()),
        };

        let path = self
            .thread_dir("writes", &thread_id)
            .join(format!("{}.{CHECKPOINT_EXT}", sanitize(&task_id)));
        match self.write_atomic(&path, &bytes).await {
            Ok(()) => WriteResult::ok(task_id),
            Err(e) => WriteResult::failed(format!("writes record failed: {e}")),
        }
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointTuple>> {
        let thread_id = require_thread_id(config).map_err(CheckpointError::Invalid)?;
        let dir = self.thread_dir("checkpoints", thread_id);
        let last = Self::last_sequence(&dir);

        let mut tuples = Vec::new();
        for seq in (1..=last).rev() {
            if limit.is_some_and(|l| tuples.len() >= l) {
                break;
            }
            let path = dir.join(format!("{}.{CHECKPOINT_EXT}", sequence_id(seq)));
            if !path.exists() {
                continue;
            }
            let record = self.read_record(&path)?;
            tuples.push(self.tuple_from_record(thread_id, record));
        }
        Ok(tuples)
    }
}

/// Restrict ids to filename-safe characters
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_saver_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path()).unwrap();
        let config = CheckpointConfig::for_thread("t-1");

        let first = saver
            .put(&config, Checkpoint::new(vec![1]), CheckpointMetadata::new())
            .await;
        let second = saver
            .put(&config, Checkpoint::new(vec![2]), CheckpointMetadata::new())
            .await;
        assert!(first.success && second.success);

        let latest = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(latest.checkpoint.state_snapshot, vec![2]);
        assert_eq!(latest.checkpoint.parent_id.as_deref(), Some("00000001"));

        let listed = saver.list(&config, None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].checkpoint.id, "00000002");
    }

    #[tokio::test]
    async fn monotonic_ids_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig::for_thread("t-1");

        {
            let saver = FileSaver::new(dir.path()).unwrap();
            saver
                .put(&config, Checkpoint::new(vec![1]), CheckpointMetadata::new())
                .await;
        }

        let reopened = FileSaver::new(dir.path()).unwrap();
        let result = reopened
            .put(&config, Checkpoint::new(vec![2]), CheckpointMetadata::new())
            .await;
        assert_eq!(result.id.as_deref(), Some("00000002"));
    }

    #[tokio::test]
    async fn writes_namespace_is_separate() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path()).unwrap();
        let config = CheckpointConfig::for_thread("t-1");

        let result = saver
            .put_writes(
                &config,
                vec![("k".to_string(), serde_json::json!("v"))],
                "task/1".to_string(),
            )
            .await;
        assert!(result.success);
        assert!(dir.path().join("writes").join("t-1").join("task_1.ckpt").exists());
    }

    #[tokio::test]
    async fn missing_thread_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path()).unwrap();
        let tuple = saver
            .get_tuple(&CheckpointConfig::for_thread("nope"))
            .await
            .unwrap();
        assert!(tuple.is_none());
    }
}
