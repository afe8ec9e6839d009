//! The calls the long poll session and the callback server depend on.
//!
//! [`ApiClient`](crate::ApiClient) implements both traits over HTTP; tests
//! and embedders can supply their own implementations.

use crate::models::{CallbackServer, LongPollServer, PollRequest, PollResponse};
use crate::Result;
use async_trait::async_trait;

/// Calls used by the long poll session.
#[async_trait]
pub trait LongPollApi: Send + Sync {
    /// Fetch fresh long poll coordinates.
    async fn get_long_poll_server(&self, lp_version: u32) -> Result<LongPollServer>;

    /// Wait for updates after `request.ts`.
    async fn long_poll(&self, request: &PollRequest) -> Result<PollResponse>;
}

/// Calls used to manage callback server registrations.
#[async_trait]
pub trait CallbackApi: Send + Sync {
    async fn get_callback_servers(&self, group_id: i64) -> Result<Vec<CallbackServer>>;

    /// Register a server; returns its id.
    async fn add_callback_server(
        &self,
        group_id: i64,
        title: &str,
        url: &str,
        secret: &str,
    ) -> Result<i64>;

    async fn delete_callback_server(&self, group_id: i64, server_id: i64) -> Result<bool>;

    async fn get_callback_confirmation_code(&self, group_id: i64) -> Result<String>;

    /// Subscribe the server to exactly `events`; the client's API version is
    /// sent along so notifications arrive in the same format.
    async fn set_callback_settings(
        &self,
        group_id: i64,
        server_id: i64,
        events: &[String],
    ) -> Result<bool>;
}
