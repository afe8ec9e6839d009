// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Detect the format of a path from its extension
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ConfigError::LoadError(format!("No file extension found: {}", path.display()))
            })?;

        Self::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))
    }
}

/// Reads a configuration document into a JSON tree.
///
/// TOML and `.env` documents are converted so that every source can be
/// merged the same way. In `.env` documents a double underscore nests keys,
/// so `LONG_POLL__WAIT=30` becomes `{"long_poll": {"wait": "30"}}`; numeric
/// settings accept numeric strings when they are deserialized.
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Pick the loader from the file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FileFormat::detect(path.as_ref())?))
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
    }

    /// Parse configuration from string
    pub fn parse(&self, content: &str) -> Result<Value> {
        match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e))),
            FileFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

                serde_json::to_value(toml_value).map_err(|e| {
                    ConfigError::ParseError(format!("TOML to JSON conversion error: {}", e))
                })
            }
            FileFormat::Env => Ok(parse_env(content)),
        }
    }
}

fn parse_env(content: &str) -> Value {
    let mut root = Value::Object(serde_json::Map::new());

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            insert_path(
                &mut root,
                &key_path(key.trim()),
                Value::String(value.to_string()),
            );
        }
    }

    root
}

/// Split an environment-style key into a lowercase path.
pub(crate) fn key_path(key: &str) -> Vec<String> {
    key.split("__")
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_lowercase())
        .collect()
}

/// Insert `value` at `path`, creating intermediate objects.
pub(crate) fn insert_path(root: &mut Value, path: &[String], value: Value) {
    if !path.is_empty() {
        insert_at(root, path, value);
    }
}

fn insert_at(node: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        insert_at(child, rest, value);
    }
}

/// Deep-merge `overlay` into `base`. Objects merge key by key, anything else
/// is replaced.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let result = loader.parse(r#"{"long_poll": {"wait": 30}}"#).unwrap();
        assert_eq!(result["long_poll"]["wait"], 30);
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let toml = r#"
            [callback]
            address = "127.0.0.1:8080"

            [callback.group_secrets]
            "42" = "s3cret"
        "#;

        let result = loader.parse(toml).unwrap();
        assert_eq!(result["callback"]["address"], "127.0.0.1:8080");
        assert_eq!(result["callback"]["group_secrets"]["42"], "s3cret");
    }

    #[test]
    fn test_parse_env_nests_keys() {
        let loader = ConfigLoader::new(FileFormat::Env);
        let env = r#"
            LONG_POLL__WAIT=30
            # Comment
            CALLBACK__SECRET="quoted value"
            API__ACCESS_TOKEN=abc
        "#;

        let result = loader.parse(env).unwrap();
        assert_eq!(result["long_poll"]["wait"], "30");
        assert_eq!(result["callback"]["secret"], "quoted value");
        assert_eq!(result["api"]["access_token"], "abc");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("env"), Some(FileFormat::Env));
        assert_eq!(FileFormat::from_extension("yaml"), None);
        assert!(FileFormat::detect(Path::new("updraft")).is_err());
    }

    #[test]
    fn test_merge_is_deep() {
        let mut base = json!({"long_poll": {"wait": 25, "version": 3}});
        merge(&mut base, json!({"long_poll": {"wait": 60}}));
        assert_eq!(base, json!({"long_poll": {"wait": 60, "version": 3}}));
    }
}
