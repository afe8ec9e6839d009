// Typed settings for the API client, the long poll and the callback server

use crate::{ConfigValidator, Result, Validate};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::str::FromStr;

/// Complete Updraft configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdraftConfig {
    pub api: ApiSettings,
    pub long_poll: LongPollSettings,
    pub callback: CallbackSettings,
}

/// Remote API access
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    /// Method endpoint root, e.g. `https://api.vk.com`
    pub base_url: String,
    pub access_token: String,
    /// API version sent as `v` with every method call
    pub version: String,
    /// HTTP timeout; must exceed the long poll wait
    #[serde(deserialize_with = "lenient")]
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.vk.com".to_string(),
            access_token: String::new(),
            version: "5.199".to_string(),
            timeout_secs: 100,
        }
    }
}

/// What the long poll loop does after a transport error
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnTransportError {
    /// Return the error from `run`
    #[default]
    FailFast,
    /// Log it, wait `retry_backoff_secs`, poll again
    LogAndContinue,
}

/// Long poll session parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LongPollSettings {
    #[serde(deserialize_with = "lenient")]
    pub wait: u32,
    #[serde(deserialize_with = "lenient")]
    pub version: u32,
    /// Delivery mode bitmask
    #[serde(deserialize_with = "lenient")]
    pub mode: u32,
    pub on_transport_error: OnTransportError,
    #[serde(deserialize_with = "lenient")]
    pub retry_backoff_secs: u64,
}

impl Default for LongPollSettings {
    fn default() -> Self {
        Self {
            wait: 25,
            version: 3,
            mode: 2,
            on_transport_error: OnTransportError::FailFast,
            retry_backoff_secs: 3,
        }
    }
}

/// Callback (webhook) server parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CallbackSettings {
    pub address: String,
    pub path: String,
    /// Secret expected from groups without an override. Empty disables the check.
    pub secret: String,
    pub group_secrets: HashMap<i64, String>,
    /// Confirmation string served to groups without an override
    pub confirmation: String,
    pub group_confirmations: HashMap<i64, String>,
    /// How long `stop` waits for in-flight requests
    #[serde(deserialize_with = "lenient")]
    pub drain_timeout_secs: u64,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            path: "/callback".to_string(),
            secret: String::new(),
            group_secrets: HashMap::new(),
            confirmation: String::new(),
            group_confirmations: HashMap::new(),
            drain_timeout_secs: 30,
        }
    }
}

impl Validate for ApiSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::is_url(&self.base_url, "api.base_url")?;
        ConfigValidator::not_empty(&self.version, "api.version")?;
        ConfigValidator::in_range(self.timeout_secs, 1, 600, "api.timeout_secs")
    }
}

impl Validate for LongPollSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::in_range(self.wait, 1, 90, "long_poll.wait")?;
        ConfigValidator::in_range(self.version, 1, 3, "long_poll.version")?;
        ConfigValidator::in_range(
            self.retry_backoff_secs,
            1,
            3600,
            "long_poll.retry_backoff_secs",
        )
    }
}

impl Validate for CallbackSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::is_socket_addr(&self.address, "callback.address")?;
        ConfigValidator::is_path(&self.path, "callback.path")
    }
}

impl Validate for UpdraftConfig {
    fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.long_poll.validate()?;
        self.callback.validate()?;

        if self.api.timeout_secs <= u64::from(self.long_poll.wait) {
            return Err(crate::ConfigError::ValidationError(format!(
                "api.timeout_secs ({}) must exceed long_poll.wait ({})",
                self.api.timeout_secs, self.long_poll.wait
            )));
        }
        Ok(())
    }
}

/// Accept a number or a numeric string, so environment overrides work.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: std::fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Value(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}
