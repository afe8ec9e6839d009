//! Callback (webhook) server for Updraft
//!
//! The platform pushes each update as a JSON `POST` to one path of your
//! server. [`WebhookServer`] accepts them, checks the group secret, answers
//! confirmation requests and emits a typed [`CallbackEvent`] per request.
//! Listener outcomes decide the response:
//!
//! | Outcome                 | Response                                     |
//! |-------------------------|----------------------------------------------|
//! | listener error          | `400 Bad Request`                            |
//! | `Directive::Remove`     | `200 remove`, then `GroupServerRemoved`      |
//! | `Directive::Status`     | that status, with `Retry-After` if given     |
//! | otherwise               | `200 ok`                                     |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use updraft_api::{ApiClient, ApiClientConfig};
//! use updraft_events::{CallbackKind, Directive};
//! use updraft_webhooks::{WebhookConfig, WebhookServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new(ApiClientConfig::builder().access_token("token").build())?;
//! let config = WebhookConfig::builder()
//!     .path("/callback")
//!     .secret("s3cret")
//!     .group_confirmation(1, "abc123")
//!     .build();
//! let server = Arc::new(WebhookServer::new(Arc::new(api), config)?);
//!
//! server.emitter().on(CallbackKind::MessageNew, |event| {
//!     println!("new message in group {}", event.group_id);
//!     Ok(Directive::Continue)
//! });
//!
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Admin calls (`get_servers`, `add_server`, `set_settings`, ...) forward to
//! the [`CallbackApi`](updraft_api::CallbackApi) the server was built with.

mod admin;
mod config;
mod dispatcher;
mod error;
mod secrets;
mod server;
mod shutdown;

pub use config::{WebhookConfig, WebhookConfigBuilder};
pub use dispatcher::{Dispatcher, REMOVE_BODY, RETRY_COUNTER_HEADER, Reply};
pub use error::{WebhookError, WebhookResult};
pub use secrets::{GroupStrings, secrets_match};
pub use server::WebhookServer;

pub use updraft_events::{CallbackEvent, CallbackKind, Directive};
