//! Serialization protocol for checkpoint payloads
//!
//! Checkpoint state snapshots cross process boundaries, so the binary format
//! carries an explicit magic tag and version byte ahead of the payload.
//! Payloads written by a newer incompatible format version are rejected at
//! load rather than misread.

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};

/// Protocol for serializing and deserializing checkpoint data
///
/// Implementations can provide custom strategies (JSON for debugging,
/// tagged bincode for durable storage).
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;
}

/// JSON-based serializer, useful for debugging stored payloads
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Magic prefix identifying AgentMap checkpoint payloads
const MAGIC: &[u8; 4] = b"AMCP";

/// Current binary payload format version
const FORMAT_VERSION: u8 = 1;

/// Tagged binary serializer (default for durable storage)
///
/// Layout: 4 magic bytes, 1 format version byte, bincode payload.
#[derive(Debug, Clone, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for BincodeSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let payload = bincode::serialize(value)?;
        let mut out = Vec::with_capacity(payload.len() + 5);
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        if data.len() < 5 || &data[..4] != MAGIC {
            tracing::warn!(len = data.len(), "rejecting untagged checkpoint payload");
            return Err(CheckpointError::Invalid(
                "payload is not a tagged checkpoint record".to_string(),
            ));
        }
        let version = data[4];
        if version != FORMAT_VERSION {
            tracing::warn!(
                version,
                expected = FORMAT_VERSION,
                "rejecting checkpoint payload with unsupported format version"
            );
            return Err(CheckpointError::Invalid(format!(
                "unsupported payload format version {version} (expected {FORMAT_VERSION})"
            )));
        }
        Ok(bincode::deserialize(&data[5..])?)
    }
}
