//! Configuration for the callback server

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use updraft_config::CallbackSettings;

use crate::error::{WebhookError, WebhookResult};

/// Callback server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    /// Address `run` binds to
    pub address: SocketAddr,

    /// The only path notifications are accepted on
    pub path: String,

    /// Secret expected from groups without an override; empty disables the check
    pub secret: String,
    pub group_secrets: HashMap<i64, String>,

    /// Confirmation string for groups without an override
    pub confirmation: String,
    pub group_confirmations: HashMap<i64, String>,

    /// How long `stop` waits for in-flight requests
    pub drain_timeout: Duration,

    /// Largest accepted request body in bytes
    pub max_body_size: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            path: "/callback".to_string(),
            secret: String::new(),
            group_secrets: HashMap::new(),
            confirmation: String::new(),
            group_confirmations: HashMap::new(),
            drain_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl WebhookConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> WebhookConfigBuilder {
        WebhookConfigBuilder::new()
    }

    pub fn validate(&self) -> WebhookResult<()> {
        validate_path(&self.path)
    }
}

pub(crate) fn validate_path(path: &str) -> WebhookResult<()> {
    if !path.starts_with('/') {
        return Err(WebhookError::validation(
            "path",
            format!("{path:?} must begin with '/'"),
        ));
    }
    Ok(())
}

impl TryFrom<&CallbackSettings> for WebhookConfig {
    type Error = WebhookError;

    fn try_from(settings: &CallbackSettings) -> WebhookResult<Self> {
        let address = settings.address.parse().map_err(|_| {
            WebhookError::validation("address", format!("{:?} is not host:port", settings.address))
        })?;

        let config = Self {
            address,
            path: settings.path.clone(),
            secret: settings.secret.clone(),
            group_secrets: settings.group_secrets.clone(),
            confirmation: settings.confirmation.clone(),
            group_confirmations: settings.group_confirmations.clone(),
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`WebhookConfig`]
#[derive(Debug, Clone, Default)]
pub struct WebhookConfigBuilder {
    config: WebhookConfig,
}

impl WebhookConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: SocketAddr) -> Self {
        self.config.address = address;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.secret = secret.into();
        self
    }

    pub fn group_secret(mut self, group_id: i64, secret: impl Into<String>) -> Self {
        self.config.group_secrets.insert(group_id, secret.into());
        self
    }

    pub fn confirmation(mut self, confirmation: impl Into<String>) -> Self {
        self.config.confirmation = confirmation.into();
        self
    }

    pub fn group_confirmation(mut self, group_id: i64, confirmation: impl Into<String>) -> Self {
        self.config
            .group_confirmations
            .insert(group_id, confirmation.into());
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    pub fn build(self) -> WebhookConfig {
        self.config
    }
}
