//! Prompt reference resolution
//!
//! Prompts in a CSV may be literal text or references:
//!
//! - `prompt:<key>` looks up the registry loaded from `registry.yaml`
//! - `file:<relative/path>` reads a file under the prompts directory
//! - `yaml:<relative.yaml>#<dotted.key>` traverses a YAML document
//!
//! Resolution never fails the workflow: problems come back as descriptive
//! strings so a run continues with diagnostic text in place of the prompt.
//! Path traversal outside the prompts root is rejected the same way.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

/// Resolver for prompt references with `{name}`-style substitution
#[derive(Debug, Default)]
pub struct PromptResolver {
    prompts_dir: PathBuf,
    registry: HashMap<String, String>,
    cache: RwLock<HashMap<String, String>>,
}

impl PromptResolver {
    /// Create a resolver rooted at `prompts_dir`, loading `registry.yaml`
    /// from it when present
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        let prompts_dir = prompts_dir.into();
        let registry = load_registry(&prompts_dir.join("registry.yaml"));
        Self {
            prompts_dir,
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolver with an in-memory registry, for tests and embedded use
    pub fn with_registry(prompts_dir: impl Into<PathBuf>, registry: HashMap<String, String>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a prompt reference to text. Unrecognized references pass
    /// through unchanged; failures return a descriptive string.
    pub fn resolve(&self, reference: &str) -> String {
        if reference.is_empty() {
            return String::new();
        }

        if let Some(cached) = self.cache.read().expect("prompt cache").get(reference) {
            return cached.clone();
        }

        let resolved = if let Some(key) = reference.strip_prefix("prompt:") {
            self.resolve_registry(key)
        } else if let Some(rel) = reference.strip_prefix("file:") {
            self.resolve_file(rel)
        } else if let Some(rest) = reference.strip_prefix("yaml:") {
            self.resolve_yaml(rest)
        } else {
            reference.to_string()
        };

        self.cache
            .write()
            .expect("prompt cache")
            .insert(reference.to_string(), resolved.clone());
        resolved
    }

    /// Resolve then substitute `{name}` placeholders from `vars`
    pub fn format_prompt(&self, reference: &str, vars: &HashMap<String, String>) -> String {
        let mut text = self.resolve(reference);
        for (name, value) in vars {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }

    /// Drop every cached resolution
    pub fn clear_cache(&self) {
        self.cache.write().expect("prompt cache").clear();
    }

    fn resolve_registry(&self, key: &str) -> String {
        match self.registry.get(key) {
            Some(text) => text.clone(),
            None => format!("[Prompt not found: {key}]"),
        }
    }

    fn resolve_file(&self, relative: &str) -> String {
        let Some(path) = self.safe_join(relative) else {
            return format!("[Invalid prompt path: {relative}]");
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => text.trim_end().to_string(),
            Err(e) => format!("[Error reading prompt file {relative}: {e}]"),
        }
    }

    fn resolve_yaml(&self, rest: &str) -> String {
        let Some((file, dotted_key)) = rest.split_once('#') else {
            return format!("[Invalid yaml prompt reference (missing #key): {rest}]");
        };
        let Some(path) = self.safe_join(file) else {
            return format!("[Invalid prompt path: {file}]");
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => return format!("[Error reading prompt file {file}: {e}]"),
        };
        let doc: serde_yaml::Value = match serde_yaml::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => return format!("[Invalid YAML in {file}: {e}]"),
        };

        let mut current = &doc;
        for part in dotted_key.split('.') {
            match current.get(part) {
                Some(next) => current = next,
                None => return format!("[Key '{dotted_key}' not found in {file}]"),
            }
        }
        match current {
            serde_yaml::Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_else(|e| format!("[Unrenderable prompt value: {e}]")),
        }
    }

    /// Join a relative reference under the prompts root, rejecting
    /// absolute paths and parent-directory escapes
    fn safe_join(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        if rel.is_absolute() {
            return None;
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return None,
            }
        }
        Some(self.prompts_dir.join(rel))
    }
}

fn load_registry(path: &Path) -> HashMap<String, String> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    match serde_yaml::from_str::<HashMap<String, String>>(&text) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid prompt registry");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(files: &[(&str, &str)]) -> (tempfile::TempDir, PromptResolver) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        let resolver = PromptResolver::new(dir.path());
        (dir, resolver)
    }

    #[test]
    fn literal_text_passes_through() {
        let (_dir, resolver) = resolver_with(&[]);
        assert_eq!(resolver.resolve("Just a prompt"), "Just a prompt");
        assert_eq!(resolver.resolve(""), "");
    }

    #[test]
    fn registry_lookup() {
        let (_dir, resolver) =
            resolver_with(&[("registry.yaml", "greet: Hello {name}\n")]);
        assert_eq!(resolver.resolve("prompt:greet"), "Hello {name}");
        assert!(resolver.resolve("prompt:missing").contains("not found"));
    }

    #[test]
    fn file_reference() {
        let (_dir, resolver) =
            resolver_with(&[("prompts/intro.txt", "You are helpful.\n")]);
        assert_eq!(resolver.resolve("file:prompts/intro.txt"), "You are helpful.");
        assert!(resolver
            .resolve("file:prompts/absent.txt")
            .starts_with("[Error reading prompt file"));
    }

    #[test]
    fn traversal_is_rejected() {
        let (_dir, resolver) = resolver_with(&[]);
        assert!(resolver
            .resolve("file:../outside.txt")
            .starts_with("[Invalid prompt path"));
        assert!(resolver
            .resolve("file:/etc/passwd")
            .starts_with("[Invalid prompt path"));
    }

    #[test]
    fn yaml_dotted_key() {
        let (_dir, resolver) = resolver_with(&[(
            "prompts.yaml",
            "agents:\n  router:\n    system: Route the request\n",
        )]);
        assert_eq!(
            resolver.resolve("yaml:prompts.yaml#agents.router.system"),
            "Route the request"
        );
        assert!(resolver
            .resolve("yaml:prompts.yaml#agents.missing")
            .contains("not found"));
        assert!(resolver
            .resolve("yaml:prompts.yaml")
            .contains("missing #key"));
    }

    #[test]
    fn format_substitutes_variables() {
        let (_dir, resolver) =
            resolver_with(&[("registry.yaml", "greet: Hello {name}, {name}!\n")]);
        let vars = HashMap::from([("name".to_string(), "Ada".to_string())]);
        assert_eq!(
            resolver.format_prompt("prompt:greet", &vars),
            "Hello Ada, Ada!"
        );
    }

    #[test]
    fn cache_round_trip() {
        let (dir, resolver) = resolver_with(&[("p.txt", "first")]);
        assert_eq!(resolver.resolve("file:p.txt"), "first");

        std::fs::write(dir.path().join("p.txt"), "second").unwrap();
        assert_eq!(resolver.resolve("file:p.txt"), "first");

        resolver.clear_cache();
        assert_eq!(resolver.resolve("file:p.txt"), "second");
    }
}
