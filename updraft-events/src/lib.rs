//! Typed update events for Updraft
//!
//! This crate holds what the long poll session and the callback server have
//! in common:
//!
//! - [`EventEmitter`] - listeners keyed by event kind, run in registration order
//! - [`UserEvent`] - decoded user long poll updates
//! - [`CallbackEvent`] - decoded callback notifications
//! - [`DeliveryMode`] - optional fields requested from the long poll server
//!
//! ## Listening
//!
//! ```rust
//! use updraft_events::{CallbackEvent, CallbackKind, Directive, EventEmitter};
//!
//! let emitter: EventEmitter<CallbackKind, CallbackEvent> = EventEmitter::new();
//!
//! emitter.on(CallbackKind::GroupServerRemoved, |event| {
//!     println!("group {} dropped this server", event.group_id);
//!     Ok(Directive::Continue)
//! });
//!
//! let event = CallbackEvent::synthetic(CallbackKind::GroupServerRemoved, 1);
//! let outcome = emitter.emit(&event.kind(), &event);
//! assert_eq!(outcome.invoked, 1);
//! ```
//!
//! Listeners answer with a [`Directive`]; the signals of all listeners are
//! collected into the [`EmitOutcome`] returned by `emit`.

pub mod callback;
pub mod emitter;
pub mod error;
pub mod mode;
pub mod user;

pub use callback::{CallbackEvent, CallbackKind, CallbackPayload, Envelope};
pub use emitter::{
    Directive, EmitOutcome, EventEmitter, EventKind, ListenerError, ListenerId, StatusDirective,
};
pub use error::{DecodeError, Result};
pub use mode::DeliveryMode;
pub use user::{UserEvent, UserEventKind};
