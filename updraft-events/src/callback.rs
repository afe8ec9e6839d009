//! Callback API notifications
//!
//! Every notification is a JSON envelope:
//!
//! ```json
//! {"type": "message_new", "group_id": 1, "event_id": "a1b2", "v": "5.199",
//!  "object": {"message": {...}}, "secret": "s3cret"}
//! ```
//!
//! [`Envelope`] is parsed first so the secret and the confirmation request
//! can be handled before the payload is looked at. [`CallbackEvent::decode`]
//! then turns the `object` into a typed payload.

use crate::emitter::EventKind;
use crate::error::{DecodeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Notification type, used as the emitter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Confirmation,
    MessageNew,
    MessageReply,
    MessageEdit,
    MessageAllow,
    MessageDeny,
    MessageTypingState,
    MessageEvent,
    PhotoNew,
    WallPostNew,
    WallReplyNew,
    LikeAdd,
    LikeRemove,
    GroupJoin,
    GroupLeave,
    /// Emitted locally after a listener asked for the server to be removed
    GroupServerRemoved,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 16] = [
        Self::Confirmation,
        Self::MessageNew,
        Self::MessageReply,
        Self::MessageEdit,
        Self::MessageAllow,
        Self::MessageDeny,
        Self::MessageTypingState,
        Self::MessageEvent,
        Self::PhotoNew,
        Self::WallPostNew,
        Self::WallReplyNew,
        Self::LikeAdd,
        Self::LikeRemove,
        Self::GroupJoin,
        Self::GroupLeave,
        Self::GroupServerRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::MessageNew => "message_new",
            Self::MessageReply => "message_reply",
            Self::MessageEdit => "message_edit",
            Self::MessageAllow => "message_allow",
            Self::MessageDeny => "message_deny",
            Self::MessageTypingState => "message_typing_state",
            Self::MessageEvent => "message_event",
            Self::PhotoNew => "photo_new",
            Self::WallPostNew => "wall_post_new",
            Self::WallReplyNew => "wall_reply_new",
            Self::LikeAdd => "like_add",
            Self::LikeRemove => "like_remove",
            Self::GroupJoin => "group_join",
            Self::GroupLeave => "group_leave",
            Self::GroupServerRemoved => "group_server_removed",
        }
    }

    /// Whether the remote service sends this kind; settings can only
    /// subscribe to these.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Confirmation | Self::GroupServerRemoved)
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DecodeError::UnknownKind(s.to_string()))
    }
}

impl EventKind for CallbackKind {}

/// Outer notification structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub group_id: i64,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default, rename = "v")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub object: Option<Value>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl Envelope {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn is_confirmation(&self) -> bool {
        self.kind == CallbackKind::Confirmation.as_str()
    }
}

/// A private message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: i64,
    pub date: i64,
    pub peer_id: i64,
    pub from_id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub conversation_message_id: Option<i64>,
    #[serde(default)]
    pub random_id: Option<i64>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageNew {
    pub message: Message,
    #[serde(default)]
    pub client_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageAllow {
    pub user_id: i64,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageDeny {
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageTypingState {
    pub state: String,
    pub from_id: i64,
    pub to_id: i64,
}

/// Callback button press.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageEvent {
    pub user_id: i64,
    pub peer_id: i64,
    pub event_id: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub conversation_message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub album_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub date: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WallPost {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub from_id: Option<i64>,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WallComment {
    pub id: i64,
    pub from_id: i64,
    pub post_id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Like {
    pub liker_id: i64,
    pub object_type: String,
    pub object_owner_id: i64,
    pub object_id: i64,
    #[serde(default)]
    pub thread_reply_id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupJoin {
    pub user_id: i64,
    #[serde(default)]
    pub join_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupLeave {
    pub user_id: i64,
    /// The user left on their own rather than being removed
    #[serde(default, rename = "self", deserialize_with = "int_bool")]
    pub by_self: bool,
}

/// Typed `object` of a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackPayload {
    /// Confirmation request; answered with the confirmation string
    Confirmation,
    MessageNew(MessageNew),
    MessageReply(Message),
    MessageEdit(Message),
    MessageAllow(MessageAllow),
    MessageDeny(MessageDeny),
    MessageTypingState(MessageTypingState),
    MessageEvent(MessageEvent),
    PhotoNew(Photo),
    WallPostNew(WallPost),
    WallReplyNew(WallComment),
    LikeAdd(Like),
    LikeRemove(Like),
    GroupJoin(GroupJoin),
    GroupLeave(GroupLeave),
    /// The server registration for this group is being dropped
    GroupServerRemoved,
}

/// A decoded notification plus its delivery metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub group_id: i64,
    pub event_id: Option<String>,
    pub api_version: Option<String>,
    /// Times the remote side already retried this notification
    pub retry_counter: u32,
    pub payload: CallbackPayload,
}

impl CallbackEvent {
    /// Decode the payload of `envelope`.
    ///
    /// Only kinds the remote side sends are accepted; confirmation requests
    /// and `group_server_removed` are produced locally and fail with
    /// [`DecodeError::UnknownKind`].
    pub fn decode(envelope: &Envelope) -> Result<Self> {
        let kind: CallbackKind = envelope.kind.parse()?;
        let object = envelope.object.clone().unwrap_or(Value::Null);

        let payload = match kind {
            CallbackKind::Confirmation | CallbackKind::GroupServerRemoved => {
                return Err(DecodeError::UnknownKind(envelope.kind.clone()));
            }
            CallbackKind::MessageNew => CallbackPayload::MessageNew(payload(kind, object)?),
            CallbackKind::MessageReply => CallbackPayload::MessageReply(payload(kind, object)?),
            CallbackKind::MessageEdit => CallbackPayload::MessageEdit(payload(kind, object)?),
            CallbackKind::MessageAllow => CallbackPayload::MessageAllow(payload(kind, object)?),
            CallbackKind::MessageDeny => CallbackPayload::MessageDeny(payload(kind, object)?),
            CallbackKind::MessageTypingState => {
                CallbackPayload::MessageTypingState(payload(kind, object)?)
            }
            CallbackKind::MessageEvent => CallbackPayload::MessageEvent(payload(kind, object)?),
            CallbackKind::PhotoNew => CallbackPayload::PhotoNew(payload(kind, object)?),
            CallbackKind::WallPostNew => CallbackPayload::WallPostNew(payload(kind, object)?),
            CallbackKind::WallReplyNew => CallbackPayload::WallReplyNew(payload(kind, object)?),
            CallbackKind::LikeAdd => CallbackPayload::LikeAdd(payload(kind, object)?),
            CallbackKind::LikeRemove => CallbackPayload::LikeRemove(payload(kind, object)?),
            CallbackKind::GroupJoin => CallbackPayload::GroupJoin(payload(kind, object)?),
            CallbackKind::GroupLeave => CallbackPayload::GroupLeave(payload(kind, object)?),
        };

        Ok(Self {
            group_id: envelope.group_id,
            event_id: envelope.event_id.clone(),
            api_version: envelope.api_version.clone(),
            retry_counter: 0,
            payload,
        })
    }

    /// Synthetic event without a payload, e.g. a confirmation request.
    pub fn synthetic(kind: CallbackKind, group_id: i64) -> Self {
        let payload = match kind {
            CallbackKind::GroupServerRemoved => CallbackPayload::GroupServerRemoved,
            _ => CallbackPayload::Confirmation,
        };
        Self {
            group_id,
            event_id: None,
            api_version: None,
            retry_counter: 0,
            payload,
        }
    }

    pub fn with_retry_counter(mut self, retry_counter: u32) -> Self {
        self.retry_counter = retry_counter;
        self
    }

    pub fn kind(&self) -> CallbackKind {
        match &self.payload {
            CallbackPayload::Confirmation => CallbackKind::Confirmation,
            CallbackPayload::MessageNew(_) => CallbackKind::MessageNew,
            CallbackPayload::MessageReply(_) => CallbackKind::MessageReply,
            CallbackPayload::MessageEdit(_) => CallbackKind::MessageEdit,
            CallbackPayload::MessageAllow(_) => CallbackKind::MessageAllow,
            CallbackPayload::MessageDeny(_) => CallbackKind::MessageDeny,
            CallbackPayload::MessageTypingState(_) => CallbackKind::MessageTypingState,
            CallbackPayload::MessageEvent(_) => CallbackKind::MessageEvent,
            CallbackPayload::PhotoNew(_) => CallbackKind::PhotoNew,
            CallbackPayload::WallPostNew(_) => CallbackKind::WallPostNew,
            CallbackPayload::WallReplyNew(_) => CallbackKind::WallReplyNew,
            CallbackPayload::LikeAdd(_) => CallbackKind::LikeAdd,
            CallbackPayload::LikeRemove(_) => CallbackKind::LikeRemove,
            CallbackPayload::GroupJoin(_) => CallbackKind::GroupJoin,
            CallbackPayload::GroupLeave(_) => CallbackKind::GroupLeave,
            CallbackPayload::GroupServerRemoved => CallbackKind::GroupServerRemoved,
        }
    }
}

fn payload<T: DeserializeOwned>(kind: CallbackKind, object: Value) -> Result<T> {
    serde_json::from_value(object).map_err(|source| DecodeError::Payload {
        kind: kind.as_str(),
        source,
    })
}

fn int_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Int(i) => i != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_names() {
        for kind in CallbackKind::ALL {
            assert_eq!(kind.as_str().parse::<CallbackKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                Value::String(kind.to_string())
            );
        }
        assert!(matches!(
            "wall_repost".parse::<CallbackKind>(),
            Err(DecodeError::UnknownKind(_))
        ));
        assert!(!CallbackKind::Confirmation.is_remote());
        assert!(CallbackKind::LikeAdd.is_remote());
    }

    #[test]
    fn test_parse_envelope() {
        let env = Envelope::parse(
            br#"{"type":"confirmation","group_id":1,"secret":"s"}"#,
        )
        .unwrap();
        assert!(env.is_confirmation());
        assert_eq!(env.group_id, 1);
        assert_eq!(env.secret.as_deref(), Some("s"));
        assert_eq!(env.object, None);

        assert!(Envelope::parse(b"{\"type\":\"message_new\"}").is_err());
        assert!(Envelope::parse(b"not json").is_err());
    }

    #[test]
    fn test_decode_message_new() {
        let env = envelope(json!({
            "type": "message_new",
            "group_id": 42,
            "event_id": "e1",
            "v": "5.199",
            "object": {
                "message": {"id": 9, "date": 1700000000, "peer_id": 5, "from_id": 5, "text": "hello"},
                "client_info": {"keyboard": true}
            }
        }));

        let event = CallbackEvent::decode(&env).unwrap().with_retry_counter(2);

        assert_eq!(event.kind(), CallbackKind::MessageNew);
        assert_eq!(event.group_id, 42);
        assert_eq!(event.event_id.as_deref(), Some("e1"));
        assert_eq!(event.retry_counter, 2);
        let CallbackPayload::MessageNew(new) = &event.payload else {
            panic!("expected message_new");
        };
        assert_eq!(new.message.text, "hello");
        assert!(new.message.attachments.is_empty());
    }

    #[test]
    fn test_decode_group_leave_flag() {
        let env = envelope(json!({
            "type": "group_leave",
            "group_id": 1,
            "object": {"user_id": 3, "self": 1}
        }));
        let event = CallbackEvent::decode(&env).unwrap();
        assert_eq!(
            event.payload,
            CallbackPayload::GroupLeave(GroupLeave {
                user_id: 3,
                by_self: true
            })
        );
    }

    #[test]
    fn test_decode_like() {
        let env = envelope(json!({
            "type": "like_remove",
            "group_id": 1,
            "object": {"liker_id": 3, "object_type": "post", "object_owner_id": -1, "object_id": 77}
        }));
        let event = CallbackEvent::decode(&env).unwrap();
        assert_eq!(event.kind(), CallbackKind::LikeRemove);
    }

    #[test]
    fn test_decode_failures() {
        let unknown = envelope(json!({"type": "market_order_new", "group_id": 1, "object": {}}));
        assert!(matches!(
            CallbackEvent::decode(&unknown),
            Err(DecodeError::UnknownKind(_))
        ));

        let malformed = envelope(json!({"type": "group_join", "group_id": 1, "object": {"user": 1}}));
        assert!(matches!(
            CallbackEvent::decode(&malformed),
            Err(DecodeError::Payload { kind: "group_join", .. })
        ));

        let missing = envelope(json!({"type": "photo_new", "group_id": 1}));
        assert!(CallbackEvent::decode(&missing).is_err());
    }

    #[test]
    fn test_decode_rejects_local_kinds() {
        for kind in ["confirmation", "group_server_removed"] {
            let env = envelope(json!({"type": kind, "group_id": 1}));
            assert!(matches!(
                CallbackEvent::decode(&env),
                Err(DecodeError::UnknownKind(name)) if name == kind
            ));
        }
    }

    #[test]
    fn test_synthetic_events() {
        let removed = CallbackEvent::synthetic(CallbackKind::GroupServerRemoved, 5);
        assert_eq!(removed.kind(), CallbackKind::GroupServerRemoved);
        assert_eq!(removed.group_id, 5);

        let confirmation = CallbackEvent::synthetic(CallbackKind::Confirmation, 5);
        assert_eq!(confirmation.kind(), CallbackKind::Confirmation);
    }
}
