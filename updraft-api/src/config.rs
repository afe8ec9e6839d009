//! API client configuration.

use std::time::Duration;
use updraft_config::ApiSettings;

/// API client configuration.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Method endpoint root; calls go to `{base_url}/method/{name}`.
    pub base_url: String,
    /// Token sent as `access_token` with every method call.
    pub access_token: String,
    /// API version sent as `v` with every method call.
    pub version: String,
    /// Request timeout. Long poll requests add their wait time on top.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vk.com".to_string(),
            access_token: String::new(),
            version: "5.199".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("updraft/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ApiClientConfigBuilder {
        ApiClientConfigBuilder::default()
    }
}

impl From<&ApiSettings> for ApiClientConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            access_token: settings.access_token.clone(),
            version: settings.version.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            ..Self::default()
        }
    }
}

/// Builder for API client configuration.
#[derive(Debug, Default)]
pub struct ApiClientConfigBuilder {
    config: ApiClientConfig,
}

impl ApiClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> ApiClientConfig {
        self.config
    }
}
