//! # Updraft API
//!
//! The API executor used by the long poll session and the callback server.
//!
//! Two narrow traits describe what those components need:
//!
//! - [`LongPollApi`] - fetch long poll coordinates and poll for updates
//! - [`CallbackApi`] - list, add and delete callback servers, fetch the
//!   confirmation code, push event subscriptions
//!
//! [`ApiClient`] implements both over HTTP. Method calls go to
//! `{base_url}/method/{name}` with `access_token` and `v` attached; a remote
//! error object comes back as [`ApiError::Application`], distinct from
//! transport failures.
//!
//! ```rust,no_run
//! use updraft_api::{ApiClient, ApiClientConfig, CallbackApi};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new(
//!         ApiClientConfig::builder().access_token("token").build(),
//!     )?;
//!
//!     for server in client.get_callback_servers(1).await? {
//!         println!("{} -> {} ({:?})", server.id, server.url, server.status);
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod executor;
pub mod models;

pub use client::ApiClient;
pub use config::{ApiClientConfig, ApiClientConfigBuilder};
pub use error::{ApiError, RemoteError, Result};
pub use executor::{CallbackApi, LongPollApi};
pub use models::{CallbackServer, LongPollServer, PollRequest, PollResponse, ServerStatus};
