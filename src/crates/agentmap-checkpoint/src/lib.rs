//! # agentmap-checkpoint
//!
//! Durable state persistence for AgentMap workflow executions.
//!
//! An AgentMap run is identified by a thread id and may span several
//! invocations when a workflow suspends for human input. This crate stores
//! everything a later invocation needs to continue:
//!
//! - **Checkpoints**: binary snapshots of execution state, appended per
//!   thread with monotonic ids ([`CheckpointSaver`], [`InMemorySaver`],
//!   [`FileSaver`])
//! - **Intermediate writes**: per-task partial results in a sibling
//!   namespace
//! - **Documents**: interaction requests/responses and thread metadata in
//!   named JSON collections ([`DocumentStore`])
//!
//! Storage write failures are reported as data ([`WriteResult`]) rather
//! than errors; the engine decides which writes are fatal.

pub mod checkpoint;
pub mod documents;
pub mod error;
pub mod fs;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use checkpoint::{
    sequence_id, Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata,
    CheckpointSource, CheckpointTuple,
};
pub use documents::{DocumentStore, FileDocumentStore, MemoryDocumentStore};
pub use error::{CheckpointError, Result, WriteResult};
pub use fs::FileSaver;
pub use memory::InMemorySaver;
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::CheckpointSaver;
