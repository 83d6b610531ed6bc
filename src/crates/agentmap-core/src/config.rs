//! Engine configuration
//!
//! One small struct covers the filesystem roots and the success policy.
//! Loadable from YAML; every field has a working default under
//! `.agentmap/` so zero-config runs work.

use crate::error::Result;
use crate::policy::SuccessPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filesystem and policy configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bundle cache directory
    pub cache_dir: PathBuf,
    /// Root for prompt files and `registry.yaml`
    pub prompts_dir: PathBuf,
    /// Root for checkpoints and interaction documents
    pub storage_dir: PathBuf,
    /// Success policy name: `all_nodes`, `final_node` or `critical:a,b`
    pub success_policy: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".agentmap/cache"),
            prompts_dir: PathBuf::from(".agentmap/prompts"),
            storage_dir: PathBuf::from(".agentmap/storage"),
            success_policy: "all_nodes".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Parsed success policy; unknown names fall back to the default
    pub fn policy(&self) -> SuccessPolicy {
        match SuccessPolicy::parse(&self.success_policy) {
            Some(policy) => policy,
            None => {
                tracing::warn!(
                    policy = %self.success_policy,
                    "unknown success policy, using all_nodes"
                );
                SuccessPolicy::AllNodes
            }
        }
    }
}
