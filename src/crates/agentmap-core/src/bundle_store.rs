//! Content-addressed bundle cache
//!
//! Bundles are cached on disk keyed by `(csv_hash, graph_name)`. Saving is
//! atomic (temp file then rename) so a concurrent reader never sees a
//! half-written bundle. [`GraphBundleStore::get_or_create`] is the normal
//! entry point: it consults the cache and falls back to
//! parse + convert + analyze + save.

use crate::analyzer::{csv_hash, StaticBundleAnalyzer};
use crate::bundle::{bundle_file_name, CompiledFrom, GraphBundle};
use crate::convert::NodeSpecConverter;
use crate::csv_parser::CsvGraphParser;
use crate::declarations::DeclarationRegistry;
use crate::error::{AgentMapError, Result};
use std::path::{Path, PathBuf};

/// On-disk bundle cache
#[derive(Debug, Clone)]
pub struct GraphBundleStore {
    cache_dir: PathBuf,
}

impl GraphBundleStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path a bundle with this address would live at
    pub fn bundle_path(&self, csv_hash: &str, graph_name: &str) -> PathBuf {
        self.cache_dir.join(bundle_file_name(csv_hash, graph_name))
    }

    /// Cache lookup; `None` on miss. A corrupt cached file is treated as a
    /// miss after a warning, so a damaged cache heals on the next save.
    pub fn lookup(&self, csv_hash: &str, graph_name: &str) -> Option<GraphBundle> {
        let path = self.bundle_path(csv_hash, graph_name);
        if !path.exists() {
            return None;
        }
        match self.load(&path) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cached bundle");
                None
            }
        }
    }

    /// Persist a bundle; returns the path written
    pub fn save(&self, bundle: &GraphBundle) -> Result<PathBuf> {
        let path = self.bundle_path(&bundle.csv_hash, &bundle.graph_name);
        let bytes = bundle.to_bytes()?;

        let tmp = path.with_extension("bundle.tmp");
        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(path = %path.display(), "saved bundle");
        Ok(path)
    }

    /// Load a bundle file
    pub fn load(&self, path: &Path) -> Result<GraphBundle> {
        let bytes = std::fs::read(path).map_err(|e| {
            AgentMapError::CorruptBundle(format!("cannot read {}: {e}", path.display()))
        })?;
        GraphBundle::from_bytes(&bytes)
    }

    /// Return the cached bundle for a CSV, or compile and cache one.
    ///
    /// `graph_name` of `None` selects the first graph in the file.
    pub fn get_or_create(
        &self,
        csv_path: &Path,
        graph_name: Option<&str>,
        registry: &DeclarationRegistry,
    ) -> Result<(GraphBundle, CompiledFrom)> {
        let parser = CsvGraphParser::new();
        let bytes = parser.read_csv_bytes(csv_path)?;
        let hash = csv_hash(&bytes);

        // A graph name is needed for the cache key; peek at the CSV when
        // the caller did not supply one.
        let resolved_name = match graph_name {
            Some(name) => name.to_string(),
            None => {
                let spec = parser.parse_bytes(&bytes, &csv_path.display().to_string())?;
                spec.graph_names()
                    .first()
                    .map(|n| n.to_string())
                    .ok_or_else(|| {
                        AgentMapError::invalid_csv("CSV defines no graphs")
                    })?
            }
        };

        if let Some(bundle) = self.lookup(&hash, &resolved_name) {
            tracing::debug!(graph = %resolved_name, "bundle cache hit");
            return Ok((bundle, CompiledFrom::Precompiled));
        }

        let spec = parser.parse_bytes(&bytes, &csv_path.display().to_string())?;
        if !spec.graph_names().iter().any(|n| *n == resolved_name) {
            return Err(AgentMapError::invalid_csv(format!(
                "graph '{resolved_name}' not found in {}",
                csv_path.display()
            )));
        }
        let graph = NodeSpecConverter::new().convert_graph(&spec, &resolved_name)?;
        let bundle = StaticBundleAnalyzer::new(registry).analyze(&graph, &bytes)?;
        self.save(&bundle)?;

        Ok((bundle, CompiledFrom::Memory))
    }
}
