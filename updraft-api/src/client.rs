//! HTTP implementation of the API executor.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::models::{AddedServer, ConfirmationCode, ItemList};
use crate::{
    ApiClientConfig, ApiError, CallbackApi, CallbackServer, LongPollApi, LongPollServer,
    PollRequest, PollResponse, RemoteError, Result,
};

/// Longest error body kept in [`ApiError::Http`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct MethodResponse<T> {
    response: Option<T>,
    error: Option<RemoteError>,
}

/// API client over `reqwest`.
#[derive(Clone)]
pub struct ApiClient {
    inner: reqwest::Client,
    config: Arc<ApiClientConfig>,
}

impl ApiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            inner,
            config: Arc::new(config),
        })
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Call an API method and decode its `response` field.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!(
            "{}/method/{}",
            self.config.base_url.trim_end_matches('/'),
            method
        );

        let mut form = params.to_vec();
        form.push(("access_token", self.config.access_token.clone()));
        form.push(("v", self.config.version.clone()));

        debug!(method, "Calling API method");

        let response = self
            .inner
            .post(&url)
            .timeout(self.config.timeout)
            .form(&form)
            .send()
            .await?;
        let body = read_body(response).await?;

        let envelope: MethodResponse<T> = serde_json::from_slice(&body)?;
        match envelope {
            MethodResponse {
                error: Some(error), ..
            } => {
                debug!(method, code = error.error_code, "API method failed");
                Err(ApiError::Application(error))
            }
            MethodResponse {
                response: Some(response),
                ..
            } => Ok(response),
            _ => Err(ApiError::InvalidResponse(format!(
                "{method}: neither response nor error"
            ))),
        }
    }

    fn poll_url(request: &PollRequest) -> Result<Url> {
        let base = if request.server.starts_with("http://") || request.server.starts_with("https://")
        {
            request.server.clone()
        } else {
            format!("https://{}", request.server)
        };

        let mut url = Url::parse(&base)?;
        url.query_pairs_mut()
            .append_pair("act", "a_check")
            .append_pair("key", &request.key)
            .append_pair("ts", &request.ts.to_string())
            .append_pair("wait", &request.wait.to_string())
            .append_pair("mode", &request.mode.to_string())
            .append_pair("version", &request.version.to_string());
        Ok(url)
    }
}

async fn read_body(response: reqwest::Response) -> Result<Bytes> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let end = body.len().min(MAX_ERROR_BODY);
        return Err(ApiError::Http {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body[..end]).into_owned(),
        });
    }

    Ok(body)
}

#[async_trait]
impl LongPollApi for ApiClient {
    async fn get_long_poll_server(&self, lp_version: u32) -> Result<LongPollServer> {
        self.call(
            "messages.getLongPollServer",
            &[("lp_version", lp_version.to_string())],
        )
        .await
    }

    async fn long_poll(&self, request: &PollRequest) -> Result<PollResponse> {
        let url = Self::poll_url(request)?;
        // The server holds the request open for up to `wait` seconds.
        let timeout = self.config.timeout + Duration::from_secs(u64::from(request.wait));

        debug!(ts = request.ts, wait = request.wait, "Polling");

        let response = self.inner.get(url).timeout(timeout).send().await?;
        let body = read_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl CallbackApi for ApiClient {
    async fn get_callback_servers(&self, group_id: i64) -> Result<Vec<CallbackServer>> {
        let list: ItemList<CallbackServer> = self
            .call(
                "groups.getCallbackServers",
                &[("group_id", group_id.to_string())],
            )
            .await?;
        Ok(list.items)
    }

    async fn add_callback_server(
        &self,
        group_id: i64,
        title: &str,
        url: &str,
        secret: &str,
    ) -> Result<i64> {
        let added: AddedServer = self
            .call(
                "groups.addCallbackServer",
                &[
                    ("group_id", group_id.to_string()),
                    ("url", url.to_string()),
                    ("title", title.to_string()),
                    ("secret_key", secret.to_string()),
                ],
            )
            .await?;
        Ok(added.server_id)
    }

    async fn delete_callback_server(&self, group_id: i64, server_id: i64) -> Result<bool> {
        let result: i64 = self
            .call(
                "groups.deleteCallbackServer",
                &[
                    ("group_id", group_id.to_string()),
                    ("server_id", server_id.to_string()),
                ],
            )
            .await?;
        Ok(result == 1)
    }

    async fn get_callback_confirmation_code(&self, group_id: i64) -> Result<String> {
        let code: ConfirmationCode = self
            .call(
                "groups.getCallbackConfirmationCode",
                &[("group_id", group_id.to_string())],
            )
            .await?;
        Ok(code.code)
    }

    async fn set_callback_settings(
        &self,
        group_id: i64,
        server_id: i64,
        events: &[String],
    ) -> Result<bool> {
        let mut params = vec![
            ("group_id", group_id.to_string()),
            ("server_id", server_id.to_string()),
            ("api_version", self.config.version.clone()),
        ];
        params.extend(events.iter().map(|event| (event.as_str(), "1".to_string())));

        let result: i64 = self.call("groups.setCallbackSettings", &params).await?;
        Ok(result == 1)
    }
}
