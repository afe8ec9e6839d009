//! One notification in, one reply out.
//!
//! [`Dispatcher::handle`] knows nothing about sockets; the server feeds it the
//! request body and the retry header and writes back the [`Reply`]. The checks
//! run in a fixed order:
//!
//! 1. the body must parse as an envelope (else `400`)
//! 2. a non-empty expected secret must match (else `403`), even for
//!    confirmation requests
//! 3. confirmation requests are answered with the registered string, or with
//!    whatever a `Confirmation` listener supplies
//! 4. the payload must decode (else `400`)
//! 5. listeners run; an error beats `remove`, which beats a custom status

use http::StatusCode;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};
use updraft_events::{CallbackEvent, CallbackKind, Envelope, EventEmitter, StatusDirective};

use crate::secrets::{GroupStrings, secrets_match};

/// Header carrying how many times the sender already retried a notification.
pub const RETRY_COUNTER_HEADER: &str = "X-Retry-Counter";

/// Body that tells the sender to drop this server registration.
pub const REMOVE_BODY: &str = "remove";

/// Response for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    /// Value for the `Retry-After` header, already in HTTP date format
    pub retry_after: Option<String>,
}

impl Reply {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK, "ok")
    }

    /// Status code with its reason phrase as the body.
    pub fn status_text(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or_default())
    }

    fn from_directive(directive: StatusDirective) -> Self {
        let status = StatusCode::from_u16(directive.code).unwrap_or_else(|_| {
            warn!(code = directive.code, "Listener returned an invalid status code");
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut reply = Self::status_text(status);
        reply.retry_after = directive
            .retry_after
            .map(|at| httpdate::fmt_http_date(SystemTime::from(at)));
        reply
    }
}

/// Turns callback notifications into emitter calls.
pub struct Dispatcher {
    emitter: Arc<EventEmitter<CallbackKind, CallbackEvent>>,
    secrets: GroupStrings,
    confirmations: GroupStrings,
}

impl Dispatcher {
    pub fn new(emitter: Arc<EventEmitter<CallbackKind, CallbackEvent>>) -> Self {
        Self::with_registries(emitter, GroupStrings::default(), GroupStrings::default())
    }

    pub fn with_registries(
        emitter: Arc<EventEmitter<CallbackKind, CallbackEvent>>,
        secrets: GroupStrings,
        confirmations: GroupStrings,
    ) -> Self {
        Self {
            emitter,
            secrets,
            confirmations,
        }
    }

    pub fn emitter(&self) -> &Arc<EventEmitter<CallbackKind, CallbackEvent>> {
        &self.emitter
    }

    /// Expected secrets. An empty secret disables the check.
    pub fn secrets(&self) -> &GroupStrings {
        &self.secrets
    }

    /// Pre-registered confirmation strings.
    pub fn confirmations(&self) -> &GroupStrings {
        &self.confirmations
    }

    /// Handle one notification body.
    ///
    /// `retry_counter` is the raw `X-Retry-Counter` header value; a missing or
    /// malformed value counts as zero.
    pub fn handle(&self, body: &[u8], retry_counter: Option<&str>) -> Reply {
        let envelope = match Envelope::parse(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "Rejecting malformed notification");
                return Reply::status_text(StatusCode::BAD_REQUEST);
            }
        };
        let group_id = envelope.group_id;

        let expected = self.secrets.resolve(group_id);
        let given = envelope.secret.as_deref().unwrap_or_default();
        if !expected.is_empty() && !secrets_match(&expected, given) {
            warn!(group_id, kind = %envelope.kind, "Secret mismatch");
            return Reply::status_text(StatusCode::FORBIDDEN);
        }

        if envelope.is_confirmation() {
            return self.confirm(group_id);
        }

        let event = match CallbackEvent::decode(&envelope) {
            Ok(event) => event.with_retry_counter(parse_retry_counter(retry_counter)),
            Err(err) => {
                warn!(group_id, kind = %envelope.kind, error = %err, "Failed to decode notification");
                return Reply::status_text(StatusCode::BAD_REQUEST);
            }
        };

        let kind = event.kind();
        let outcome = self.emitter.emit(&kind, &event);
        debug!(
            group_id,
            kind = %kind,
            retry_counter = event.retry_counter,
            listeners = outcome.invoked,
            "Dispatched notification"
        );

        if let Some(err) = outcome.error {
            warn!(group_id, kind = %kind, error = %err, "Listener failed");
            return Reply::status_text(StatusCode::BAD_REQUEST);
        }

        if outcome.remove {
            let removed = CallbackEvent::synthetic(CallbackKind::GroupServerRemoved, group_id);
            self.emitter
                .emit(&CallbackKind::GroupServerRemoved, &removed);
            return Reply::new(StatusCode::OK, REMOVE_BODY);
        }

        match outcome.status {
            Some(directive) => Reply::from_directive(directive),
            None => Reply::ok(),
        }
    }

    fn confirm(&self, group_id: i64) -> Reply {
        let registered = self.confirmations.resolve(group_id);
        if !registered.is_empty() {
            debug!(group_id, "Answering confirmation with registered string");
            return Reply::new(StatusCode::OK, registered);
        }

        let event = CallbackEvent::synthetic(CallbackKind::Confirmation, group_id);
        let outcome = self.emitter.emit(&CallbackKind::Confirmation, &event);

        if let Some(err) = outcome.error {
            warn!(group_id, error = %err, "Confirmation listener failed");
            return Reply::status_text(StatusCode::BAD_REQUEST);
        }

        if outcome.confirmation.is_none() {
            warn!(
                group_id,
                listeners = outcome.invoked,
                "No confirmation string registered or supplied"
            );
        }
        Reply::new(StatusCode::OK, outcome.confirmation.unwrap_or_default())
    }
}

fn parse_retry_counter(value: Option<&str>) -> u32 {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use serde_json::json;
    use updraft_events::{CallbackPayload, Directive, ListenerError};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(EventEmitter::new()))
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn group_join(secret: &str) -> Vec<u8> {
        body(json!({
            "type": "group_join",
            "group_id": 1,
            "secret": secret,
            "object": {"user_id": 5, "join_type": "join"}
        }))
    }

    #[test]
    fn test_parse_retry_counter() {
        assert_eq!(parse_retry_counter(None), 0);
        assert_eq!(parse_retry_counter(Some("3")), 3);
        assert_eq!(parse_retry_counter(Some(" 4 ")), 4);
        assert_eq!(parse_retry_counter(Some("many")), 0);
        assert_eq!(parse_retry_counter(Some("-1")), 0);
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let reply = dispatcher().handle(b"not json", None);
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body, "Bad Request");
    }

    #[test]
    fn test_secret_mismatch_is_forbidden() {
        let dispatcher = dispatcher();
        dispatcher.secrets().set_default("s");
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        dispatcher.emitter().on(CallbackKind::GroupJoin, move |_| {
            *counter.lock() += 1;
            Ok(Directive::Continue)
        });

        let reply = dispatcher.handle(&group_join("wrong"), None);

        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_group_secret_overrides_default() {
        let dispatcher = dispatcher();
        dispatcher.secrets().set_default("default");
        dispatcher.secrets().set(1, "group");

        assert_eq!(
            dispatcher.handle(&group_join("default"), None).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(dispatcher.handle(&group_join("group"), None), Reply::ok());
    }

    #[test]
    fn test_empty_secret_disables_check() {
        let reply = dispatcher().handle(&group_join("anything"), None);
        assert_eq!(reply, Reply::ok());
    }

    #[test]
    fn test_secret_checked_before_confirmation() {
        let dispatcher = dispatcher();
        dispatcher.secrets().set_default("s");
        dispatcher.confirmations().set_default("abc123");

        let reply = dispatcher.handle(
            &body(json!({"type": "confirmation", "group_id": 1, "secret": "x"})),
            None,
        );

        assert_eq!(reply.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_registered_confirmation_is_written_without_event() {
        let dispatcher = dispatcher();
        dispatcher.confirmations().set(1, "abc123");
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        dispatcher.emitter().on(CallbackKind::Confirmation, move |_| {
            *counter.lock() += 1;
            Ok(Directive::Confirm("from-listener".to_string()))
        });

        let reply = dispatcher.handle(
            &body(json!({"type": "confirmation", "group_id": 1})),
            None,
        );

        assert_eq!(reply, Reply::new(StatusCode::OK, "abc123"));
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_confirmation_emitted_once_when_unregistered() {
        let dispatcher = dispatcher();
        dispatcher.secrets().set_default("s");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        dispatcher.emitter().on(CallbackKind::Confirmation, move |event| {
            record.lock().push(event.group_id);
            Ok(Directive::Confirm("xyz".to_string()))
        });

        let reply = dispatcher.handle(
            &body(json!({"type": "confirmation", "group_id": 1, "secret": "s"})),
            None,
        );

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(reply, Reply::new(StatusCode::OK, "xyz"));
    }

    #[test]
    fn test_confirmation_without_any_source_is_empty() {
        let reply = dispatcher().handle(
            &body(json!({"type": "confirmation", "group_id": 3})),
            None,
        );
        assert_eq!(reply, Reply::new(StatusCode::OK, ""));
    }

    #[test]
    fn test_undecodable_payload_is_bad_request() {
        let dispatcher = dispatcher();

        let unknown = dispatcher.handle(
            &body(json!({"type": "market_order_new", "group_id": 1, "object": {}})),
            None,
        );
        let missing_field = dispatcher.handle(
            &body(json!({"type": "group_join", "group_id": 1, "object": {}})),
            None,
        );

        assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing_field.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_remote_cannot_send_server_removed() {
        let dispatcher = dispatcher();
        let calls = Arc::new(Mutex::new(0));
        let record = calls.clone();
        dispatcher
            .emitter()
            .on(CallbackKind::GroupServerRemoved, move |_| {
                *record.lock() += 1;
                Ok(Directive::Continue)
            });

        let reply = dispatcher.handle(br#"{"type":"group_server_removed","group_id":1}"#, None);

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_event_routed_by_kind_with_retry_counter() {
        let dispatcher = dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        dispatcher.emitter().on(CallbackKind::GroupJoin, move |event| {
            if let CallbackPayload::GroupJoin(join) = &event.payload {
                record.lock().push((join.user_id, event.retry_counter));
            }
            Ok(Directive::Continue)
        });
        dispatcher
            .emitter()
            .on(CallbackKind::GroupLeave, |_| Err(ListenerError::new("wrong kind")));

        let reply = dispatcher.handle(&group_join(""), Some("2"));

        assert_eq!(reply, Reply::ok());
        assert_eq!(*seen.lock(), vec![(5, 2)]);
    }

    #[test]
    fn test_listener_error_beats_remove() {
        let dispatcher = dispatcher();
        dispatcher
            .emitter()
            .on(CallbackKind::GroupJoin, |_| Ok(Directive::Remove));
        dispatcher
            .emitter()
            .on(CallbackKind::GroupJoin, |_| Err(ListenerError::new("boom")));

        let reply = dispatcher.handle(&group_join(""), None);

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_remove_emits_server_removed() {
        let dispatcher = dispatcher();
        let removed = Arc::new(Mutex::new(Vec::new()));
        let record = removed.clone();
        dispatcher
            .emitter()
            .on(CallbackKind::GroupJoin, |_| Ok(Directive::retry_at(503, Utc::now())));
        dispatcher
            .emitter()
            .on(CallbackKind::GroupJoin, |_| Ok(Directive::Remove));
        dispatcher
            .emitter()
            .on(CallbackKind::GroupServerRemoved, move |event| {
                record.lock().push(event.group_id);
                Ok(Directive::Continue)
            });

        let reply = dispatcher.handle(&group_join(""), None);

        assert_eq!(reply, Reply::new(StatusCode::OK, REMOVE_BODY));
        assert_eq!(*removed.lock(), vec![1]);
    }

    #[test]
    fn test_listener_status_with_retry_after() {
        let dispatcher = dispatcher();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        dispatcher
            .emitter()
            .on(CallbackKind::GroupJoin, move |_| Ok(Directive::retry_at(503, at)));

        let reply = dispatcher.handle(&group_join(""), None);

        assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(reply.body, "Service Unavailable");
        assert_eq!(
            reply.retry_after.as_deref(),
            Some("Tue, 02 Jan 2024 03:04:05 GMT")
        );
    }

    #[test]
    fn test_invalid_listener_status_is_server_error() {
        let dispatcher = dispatcher();
        dispatcher.emitter().on(CallbackKind::GroupJoin, |_| {
            Ok(Directive::Status(StatusDirective {
                code: 42,
                retry_after: None,
            }))
        });

        let reply = dispatcher.handle(&group_join(""), None);

        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(reply.retry_after.is_none());
    }
}
