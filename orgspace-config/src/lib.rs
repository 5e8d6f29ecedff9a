// Configuration management for Orgspace
//
// Layers, lowest precedence first: programmatic defaults, a TOML/JSON file,
// a `.env` file, then prefixed environment variables.

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "ORGSPACE";

/// Main configuration manager
///
/// Holds one JSON tree; every load merges into it, later loads winning.
/// Keys passed to `get`/`set`/`section` are dotted paths (`cache.idle_ttl_secs`).
#[derive(Clone)]
pub struct ConfigManager {
    root: Arc<RwLock<Value>>,
    env_prefix: String,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Create with a custom environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
            env_prefix: prefix.into(),
        }
    }

    /// Seed the tree from a serializable defaults value
    pub fn load_defaults<T: Serialize>(&self, defaults: &T) -> Result<()> {
        let value = serde_json::to_value(defaults)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        self.merge_value(value);
        Ok(())
    }

    /// Load a file, detecting the format from its extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        debug!(path = %path.display(), "Loaded configuration file");
        self.merge_value(data);
        Ok(())
    }

    /// Merge configuration from an in-memory document
    pub fn load_str(&self, content: &str, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).parse(content)?;
        self.merge_value(data);
        Ok(())
    }

    /// Apply prefixed variables from a `.env` file
    ///
    /// With no path, `.env` is searched for from the current directory
    /// upwards and a missing file is not an error. The process environment is
    /// left untouched.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        let iter = match path {
            Some(path) => dotenvy::from_path_iter(path)
                .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?,
            None => match dotenvy::dotenv_iter() {
                Ok(iter) => iter,
                Err(e) if e.not_found() => return Ok(()),
                Err(e) => return Err(ConfigError::LoadError(e.to_string())),
            },
        };

        let mut vars = Vec::new();
        for item in iter {
            vars.push(item.map_err(|e| ConfigError::ParseError(e.to_string()))?);
        }
        self.load_env_from(vars);
        Ok(())
    }

    /// Apply prefixed variables from the process environment
    pub fn load_env(&self) {
        self.load_env_from(std::env::vars());
    }

    /// Apply prefixed variables from an explicit source
    pub fn load_env_from<I, K, V>(&self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mapped = EnvLoader::new(self.env_prefix.clone()).collect(vars);
        let mut root = self.root.write();
        for (path, value) in mapped {
            set_path(&mut root, &path, value);
        }
    }

    /// Set a value at a dotted path
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        let path: Vec<String> = key.split('.').map(str::to_string).collect();
        set_path(&mut self.root.write(), &path, json_value);
        Ok(())
    }

    /// Get a value at a dotted path
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .lookup(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Deserialize a subtree; a missing subtree deserializes from `{}`
    /// so that `#[serde(default)]` types pick up their defaults.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .lookup(key)
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    /// Deserialize the whole tree
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.root.read().clone();
        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Deserialize the whole tree and run its validation
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let config: T = self.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Merge another manager's tree over this one
    pub fn merge(&self, other: &ConfigManager) {
        let other_root = other.root.read().clone();
        self.merge_value(other_root);
    }

    fn merge_value(&self, overlay: Value) {
        merge_values(&mut self.root.write(), overlay);
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let root = self.root.read();
        let mut current = &*root;
        for segment in key.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything else replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}
