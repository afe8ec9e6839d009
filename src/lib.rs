// Updraft - update delivery for the VK API
//
// This library bundles the Updraft crates: a user long poll session and a
// callback (webhook) server, both emitting typed events through one
// listener registry.

// Re-export the shared event model and the API executor
pub use updraft_api as api;
pub use updraft_config as config;
pub use updraft_events as events;

pub use updraft_api::{ApiClient, ApiClientConfig, ApiError, CallbackApi, LongPollApi};
pub use updraft_config::{ConfigManager, UpdraftConfig};
pub use updraft_events::{
    CallbackEvent, CallbackKind, Directive, EmitOutcome, EventEmitter, ListenerError, UserEvent,
    UserEventKind,
};

// Re-export optional crates
#[cfg(feature = "longpoll")]
pub use updraft_longpoll as longpoll;

#[cfg(feature = "webhooks")]
pub use updraft_webhooks as webhooks;

#[cfg(feature = "log")]
pub use updraft_log as log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ApiClient, ApiClientConfig, CallbackEvent, CallbackKind, Directive, EventEmitter,
        ListenerError, UpdraftConfig, UserEvent, UserEventKind,
    };
    pub use updraft_events::DeliveryMode;

    #[cfg(feature = "longpoll")]
    pub use updraft_longpoll::{ErrorPolicy, LongPoll, LongPollConfig};

    #[cfg(feature = "webhooks")]
    pub use updraft_webhooks::{WebhookConfig, WebhookServer};
}
