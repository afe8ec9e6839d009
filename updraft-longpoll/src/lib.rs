//! User long poll session for Updraft.
//!
//! [`LongPoll`] keeps the server coordinates (server, key, cursor), polls the
//! long poll server in a loop and puts decoded [`UserEvent`]s on a small
//! bounded queue:
//!
//! - failure code 0 or 1 advances the cursor
//! - code 2 fetches a new key and keeps the cursor
//! - code 3 fetches a new key and a new cursor
//! - code 4 and unknown codes end `run` with an error
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use updraft_api::{ApiClient, ApiClientConfig};
//! use updraft_events::DeliveryMode;
//! use updraft_longpoll::LongPoll;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new(ApiClientConfig::builder().access_token("token").build())?;
//! let long_poll = Arc::new(LongPoll::new(Arc::new(api), DeliveryMode::ATTACHMENTS));
//! long_poll.connect().await?;
//!
//! let mut updates = long_poll.take_updates().expect("first call");
//! let poller = Arc::clone(&long_poll);
//! tokio::spawn(async move { poller.run(CancellationToken::new()).await });
//!
//! while let Some(event) = updates.recv().await {
//!     println!("{:?}", event.kind());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Transport failures follow the session's [`ErrorPolicy`]: returned from
//! `run` by default, or logged and retried after a backoff.

pub mod config;
pub mod error;
pub mod session;

pub use config::{ErrorPolicy, LongPollConfig, MAX_VERSION, MAX_WAIT, QUEUE_CAPACITY};
pub use error::{LongPollError, LongPollResult};
pub use session::{LongPoll, Session};

pub use updraft_events::{UserEvent, UserEventKind};
