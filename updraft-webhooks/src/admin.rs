//! Callback server registrations, forwarded to the API executor.

use tracing::{debug, info};
use updraft_api::CallbackServer;
use updraft_events::CallbackKind;

use crate::error::WebhookResult;
use crate::server::WebhookServer;

impl WebhookServer {
    /// Servers registered for `group_id`.
    pub async fn get_servers(&self, group_id: i64) -> WebhookResult<Vec<CallbackServer>> {
        Ok(self.api.get_callback_servers(group_id).await?)
    }

    /// Register `url` for `group_id`; returns the new server id.
    pub async fn add_server(
        &self,
        group_id: i64,
        title: &str,
        url: &str,
        secret: &str,
    ) -> WebhookResult<i64> {
        let server_id = self
            .api
            .add_callback_server(group_id, title, url, secret)
            .await?;
        info!(group_id, server_id, url, "Registered callback server");
        Ok(server_id)
    }

    pub async fn delete_server(&self, group_id: i64, server_id: i64) -> WebhookResult<bool> {
        let deleted = self.api.delete_callback_server(group_id, server_id).await?;
        info!(group_id, server_id, deleted, "Deleted callback server");
        Ok(deleted)
    }

    /// The string the platform expects back from a confirmation request.
    pub async fn get_confirmation_code(&self, group_id: i64) -> WebhookResult<String> {
        Ok(self.api.get_callback_confirmation_code(group_id).await?)
    }

    /// Fetch the confirmation code for `group_id` and register it, so
    /// confirmation requests are answered without a listener.
    pub async fn load_confirmation_code(&self, group_id: i64) -> WebhookResult<String> {
        let code = self.get_confirmation_code(group_id).await?;
        self.dispatcher().confirmations().set(group_id, code.clone());
        debug!(group_id, "Registered confirmation code");
        Ok(code)
    }

    /// Subscribe `server_id` to exactly the kinds that have listeners.
    pub async fn set_settings(&self, group_id: i64, server_id: i64) -> WebhookResult<bool> {
        let mut kinds = self.emitter().keys();
        kinds.sort();
        self.set_settings_events(group_id, server_id, &kinds).await
    }

    /// Subscribe `server_id` to `kinds`. Kinds the platform never sends are
    /// left out.
    pub async fn set_settings_events(
        &self,
        group_id: i64,
        server_id: i64,
        kinds: &[CallbackKind],
    ) -> WebhookResult<bool> {
        let events: Vec<String> = kinds
            .iter()
            .filter(|kind| kind.is_remote())
            .map(|kind| kind.as_str().to_string())
            .collect();

        debug!(group_id, server_id, events = ?events, "Pushing callback settings");
        Ok(self
            .api
            .set_callback_settings(group_id, server_id, &events)
            .await?)
    }
}
