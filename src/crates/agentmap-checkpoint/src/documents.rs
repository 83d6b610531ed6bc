//! Document-collection storage
//!
//! The suspend/resume protocol persists small JSON documents (interaction
//! requests, interaction responses, thread metadata) in named collections.
//! [`DocumentStore`] is the abstract interface; [`MemoryDocumentStore`]
//! backs tests and [`FileDocumentStore`] keeps one JSON file per document
//! under `<root>/<collection>/<id>.json`.
//!
//! Writes report failure through [`WriteResult`]; reads return
//! `Ok(None)` for missing documents.

use crate::error::{Result, WriteResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Abstract keyed document storage grouped into named collections
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or overwrite a document
    async fn write(&self, collection: &str, id: &str, document: Value) -> WriteResult;

    /// Fetch a document, `None` when absent
    async fn read(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Remove a document; removing an absent document succeeds
    async fn delete(&self, collection: &str, id: &str) -> WriteResult;

    /// Ids of every document in a collection
    async fn list_ids(&self, collection: &str) -> Result<Vec<String>>;
}

/// In-memory document store for tests and ephemeral runs
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, HashMap<String, Value>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clear(&self) {
        self.collections.write().await.clear();
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn write(&self, collection: &str, id: &str, document: Value) -> WriteResult {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        WriteResult::ok(id)
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> WriteResult {
        if let Some(docs) = self.collections.write().await.get_mut(collection) {
            docs.remove(id);
        }
        WriteResult::ok(id)
    }

    async fn list_ids(&self, collection: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}

/// Document store keeping one JSON file per document
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn doc_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root
            .join(sanitize(collection))
            .join(format!("{}.json", sanitize(id)))
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn write(&self, collection: &str, id: &str, document: Value) -> WriteResult {
        let path = self.doc_path(collection, id);
        let bytes = match serde_json::to_vec_pretty(&document) {
            Ok(bytes) => bytes,
            Err(e) => return WriteResult::failed(e.to_string()),
        };

        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &path).await
        };

        match write.await {
            Ok(()) => WriteResult::ok(id),
            Err(e) => WriteResult::failed(format!("document write failed: {e}")),
        }
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let path = self.doc_path(collection, id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> WriteResult {
        let path = self.doc_path(collection, id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => WriteResult::ok(id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WriteResult::ok(id),
            Err(e) => WriteResult::failed(format!("document delete failed: {e}")),
        }
    }

    async fn list_ids(&self, collection: &str) -> Result<Vec<String>> {
        let dir = self.root.join(sanitize(collection));
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(stem) = name.to_string_lossy().strip_suffix(".json") {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

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
