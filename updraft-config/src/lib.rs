// Configuration management for Updraft
//
// Settings are layered: built-in defaults, then configuration files, then a
// `.env` file, then `UPDRAFT_*` environment variables. The merged tree is
// deserialized into `UpdraftConfig` and validated before use.

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{
    ApiSettings, CallbackSettings, LongPollSettings, OnTransportError, UpdraftConfig,
};
pub use validation::{ConfigValidator, Validate};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Layered configuration tree
#[derive(Clone)]
pub struct ConfigManager {
    tree: Arc<RwLock<Value>>,
    env: Arc<EnvLoader>,
}

impl ConfigManager {
    /// Create an empty manager reading `UPDRAFT_*` variables
    pub fn new() -> Self {
        Self::with_env(EnvLoader::updraft())
    }

    /// Create with a custom environment loader
    pub fn with_env(env: EnvLoader) -> Self {
        Self {
            tree: Arc::new(RwLock::new(Value::Object(serde_json::Map::new()))),
            env: Arc::new(env),
        }
    }

    /// Merge a configuration file; the format comes from its extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        debug!(path = %path.display(), "loaded configuration file");
        self.merge(data)
    }

    /// Load a `.env` file into the process environment, then merge the environment.
    ///
    /// A missing default `.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        if let Some(path) = path {
            dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
        } else {
            dotenvy::dotenv().ok();
        }
        self.load_env()
    }

    /// Merge prefixed variables from the process environment
    pub fn load_env(&self) -> Result<()> {
        self.merge(self.env.load())
    }

    /// Merge an already-parsed tree on top of the current one
    pub fn merge(&self, overlay: Value) -> Result<()> {
        let mut tree = self
            .tree
            .write()
            .map_err(|_| ConfigError::LoadError("configuration lock poisoned".to_string()))?;
        loader::merge(&mut *tree, overlay);
        Ok(())
    }

    /// Set a single value at a dotted path (`long_poll.wait`)
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        let mut overlay = Value::Object(serde_json::Map::new());
        let path: Vec<String> = key.split('.').map(str::to_string).collect();
        loader::insert_path(&mut overlay, &path, value);
        self.merge(overlay)
    }

    /// Get a value at a dotted path
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let tree = self
            .tree
            .read()
            .map_err(|_| ConfigError::LoadError("configuration lock poisoned".to_string()))?;

        let value = key
            .split('.')
            .try_fold(&*tree, |node, segment| node.get(segment))
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Check if a dotted path exists
    pub fn has(&self, key: &str) -> bool {
        self.get::<Value>(key).is_ok()
    }

    /// Deserialize the whole tree and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let tree = self
            .tree
            .read()
            .map_err(|_| ConfigError::LoadError("configuration lock poisoned".to_string()))?
            .clone();

        let validated: T = serde_json::from_value(tree)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        validated.validate()?;

        Ok(validated)
    }

    /// Defaults, then the optional file, then `.env`, then the environment
    pub fn updraft(path: Option<&Path>) -> Result<UpdraftConfig> {
        let manager = Self::new();
        if let Some(path) = path {
            manager.load_file(path)?;
        }
        manager.load_dotenv(None)?;
        manager.load_validated()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
