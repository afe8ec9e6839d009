// Environment variable loading

use crate::loader::{insert_path, key_path};
use crate::{ConfigError, Result};
use serde_json::Value;
use std::env;

/// Default prefix for Updraft environment variables
pub const DEFAULT_PREFIX: &str = "UPDRAFT";

/// Environment variable loader
///
/// `UPDRAFT_CALLBACK__SECRET=abc` is read as the `callback.secret` setting:
/// the prefix and its separator are stripped and a double underscore nests.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Loader for the `UPDRAFT_` prefix
    pub fn updraft() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }

    /// Load matching variables from the process environment as a nested tree
    pub fn load(&self) -> Value {
        self.load_from(env::vars())
    }

    /// Load matching variables from an explicit iterator as a nested tree
    pub fn load_from<I>(&self, vars: I) -> Value
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tree = Value::Object(serde_json::Map::new());

        for (key, value) in vars {
            let Some(stripped) = self.strip(&key) else {
                continue;
            };
            let path = key_path(stripped);
            if path.is_empty() {
                continue;
            }
            insert_path(&mut tree, &path, Value::String(value));
        }

        tree
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.full_key(key)).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    fn full_key(&self, key: &str) -> String {
        match self.prefix {
            Some(ref prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        match self.prefix {
            Some(ref prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('_'),
            None => Some(key),
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::updraft()
    }
}
