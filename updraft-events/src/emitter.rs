//! Typed listener registry shared by the long poll and the callback server

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Key type an [`EventEmitter`] can be indexed by.
pub trait EventKind: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Blank kinds are never registered.
    fn is_blank(&self) -> bool {
        false
    }
}

impl EventKind for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl EventKind for &'static str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

/// Handle returned by [`EventEmitter::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Error reported by a listener.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ListenerError {
    #[error("{0}")]
    Failed(String),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A status code a listener wants sent back, e.g. 503 with a retry time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDirective {
    pub code: u16,
    pub retry_after: Option<DateTime<Utc>>,
}

/// What a listener asks of the caller after handling an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Directive {
    /// Nothing to report
    #[default]
    Continue,
    /// The remote side should drop this server registration
    Remove,
    /// Answer with this status instead of `200 ok`
    Status(StatusDirective),
    /// Body to answer a confirmation request with
    Confirm(String),
}

impl Directive {
    /// Ask the sender to retry at `retry_after`.
    pub fn retry_at(code: u16, retry_after: DateTime<Utc>) -> Self {
        Self::Status(StatusDirective {
            code,
            retry_after: Some(retry_after),
        })
    }
}

/// Everything the listeners of one emission signalled.
///
/// Listeners all run even after one of them fails. The first error, the
/// first status and the first confirmation body win; `remove` is set if any
/// listener asked for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitOutcome {
    pub error: Option<ListenerError>,
    pub remove: bool,
    pub status: Option<StatusDirective>,
    pub confirmation: Option<String>,
    /// Number of listeners invoked
    pub invoked: usize,
}

impl EmitOutcome {
    fn record(&mut self, result: Result<Directive, ListenerError>) {
        self.invoked += 1;
        match result {
            Ok(Directive::Continue) => {}
            Ok(Directive::Remove) => self.remove = true,
            Ok(Directive::Status(status)) => {
                self.status.get_or_insert(status);
            }
            Ok(Directive::Confirm(body)) => {
                self.confirmation.get_or_insert(body);
            }
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
    }
}

type Listener<V> = Arc<dyn Fn(&V) -> Result<Directive, ListenerError> + Send + Sync>;

/// Registry of listeners keyed by event kind.
///
/// Listeners for one kind run synchronously in registration order. The
/// registry is guarded by a read-write lock, so listeners can be added and
/// removed while other threads emit. `emit` works on a snapshot taken under
/// the read lock; a listener may therefore register or remove listeners
/// without deadlocking, and the change applies to the next emission.
pub struct EventEmitter<K: EventKind, V> {
    listeners: RwLock<HashMap<K, Vec<(ListenerId, Listener<V>)>>>,
    next_id: AtomicU64,
}

impl<K: EventKind, V> EventEmitter<K, V> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for `kind`.
    ///
    /// Returns `None` and logs a warning when `kind` is blank.
    pub fn on<F>(&self, kind: K, listener: F) -> Option<ListenerId>
    where
        F: Fn(&V) -> Result<Directive, ListenerError> + Send + Sync + 'static,
    {
        if kind.is_blank() {
            warn!("Ignoring listener registered for a blank event kind");
            return None;
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(kind = ?kind, listener = id.0, "Registering listener");
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));

        Some(id)
    }

    /// Remove one listener. Unknown ids are ignored.
    pub fn off(&self, kind: &K, id: ListenerId) {
        let mut listeners = self.listeners.write();
        if let Some(entries) = listeners.get_mut(kind) {
            entries.retain(|(existing, _)| *existing != id);
            if entries.is_empty() {
                listeners.remove(kind);
            }
        }
    }

    /// Remove every listener for `kind`.
    pub fn clear(&self, kind: &K) {
        self.listeners.write().remove(kind);
    }

    /// Kinds that currently have at least one listener.
    pub fn keys(&self) -> Vec<K> {
        self.listeners.read().keys().cloned().collect()
    }

    pub fn listener_count(&self, kind: &K) -> usize {
        self.listeners.read().get(kind).map_or(0, Vec::len)
    }

    /// Run every listener for `kind` against `value` and collect their signals.
    ///
    /// A panicking listener is reported as [`ListenerError::Panicked`].
    pub fn emit(&self, kind: &K, value: &V) -> EmitOutcome {
        let snapshot: Vec<Listener<V>> = match self.listeners.read().get(kind) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return EmitOutcome::default(),
        };

        let mut outcome = EmitOutcome::default();
        for listener in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| listener(value)))
                .unwrap_or_else(|panic| Err(ListenerError::Panicked(panic_message(panic))));
            if let Err(err) = &result {
                warn!(kind = ?kind, error = %err, "Listener failed");
            }
            outcome.record(result);
        }

        debug!(kind = ?kind, invoked = outcome.invoked, "Emitted event");
        outcome
    }
}

impl<K: EventKind, V> Default for EventEmitter<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
