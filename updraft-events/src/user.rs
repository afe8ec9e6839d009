//! User long poll updates
//!
//! The long poll server sends every update as a JSON array whose first
//! element is the event code; the remaining positions depend on the code and
//! on the [`DeliveryMode`] the session was opened with:
//!
//! ```text
//! [4, 1619, 35, 2000000001, 1700000000, "hi", {"from": "42"}, {}, 918273]
//!  |   |     |   |           |           |     |               |   random_id (RANDOM_ID)
//!  |   |     |   |           |           |     |               attachments (ATTACHMENTS)
//!  |   |     |   peer_id     timestamp   text  extra fields
//!  |   |     flags
//!  |   message_id
//!  code
//! ```
//!
//! Codes this module does not know decode to [`UserEvent::Unknown`] so a new
//! server-side event never stops a running poll.

use crate::emitter::EventKind;
use crate::error::{DecodeError, Result};
use crate::mode::DeliveryMode;
use serde_json::{Map, Value};

/// Kind of a user long poll update, used as the emitter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserEventKind {
    MessageFlagsReplaced,
    MessageFlagsSet,
    MessageFlagsReset,
    MessageNew,
    MessageEdit,
    InboxRead,
    OutboxRead,
    FriendOnline,
    FriendOffline,
    PeerFlagsReset,
    PeerFlagsReplaced,
    PeerFlagsSet,
    MessagesDeleted,
    MessagesRestored,
    MessageChanged,
    MessageCacheReset,
    ChatParamsChanged,
    ChatInfoChanged,
    UserTyping,
    ChatTyping,
    UsersTyping,
    UsersRecordingAudio,
    CounterChanged,
    NotificationSettingsChanged,
    Unknown,
}

impl UserEventKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::MessageFlagsReplaced,
            2 => Self::MessageFlagsSet,
            3 => Self::MessageFlagsReset,
            4 => Self::MessageNew,
            5 => Self::MessageEdit,
            6 => Self::InboxRead,
            7 => Self::OutboxRead,
            8 => Self::FriendOnline,
            9 => Self::FriendOffline,
            10 => Self::PeerFlagsReset,
            11 => Self::PeerFlagsReplaced,
            12 => Self::PeerFlagsSet,
            13 => Self::MessagesDeleted,
            14 => Self::MessagesRestored,
            18 => Self::MessageChanged,
            19 => Self::MessageCacheReset,
            51 => Self::ChatParamsChanged,
            52 => Self::ChatInfoChanged,
            61 => Self::UserTyping,
            62 => Self::ChatTyping,
            63 => Self::UsersTyping,
            64 => Self::UsersRecordingAudio,
            80 => Self::CounterChanged,
            114 => Self::NotificationSettingsChanged,
            _ => Self::Unknown,
        }
    }

    /// Wire code; `None` for [`UserEventKind::Unknown`].
    pub fn code(self) -> Option<i64> {
        let code = match self {
            Self::MessageFlagsReplaced => 1,
            Self::MessageFlagsSet => 2,
            Self::MessageFlagsReset => 3,
            Self::MessageNew => 4,
            Self::MessageEdit => 5,
            Self::InboxRead => 6,
            Self::OutboxRead => 7,
            Self::FriendOnline => 8,
            Self::FriendOffline => 9,
            Self::PeerFlagsReset => 10,
            Self::PeerFlagsReplaced => 11,
            Self::PeerFlagsSet => 12,
            Self::MessagesDeleted => 13,
            Self::MessagesRestored => 14,
            Self::MessageChanged => 18,
            Self::MessageCacheReset => 19,
            Self::ChatParamsChanged => 51,
            Self::ChatInfoChanged => 52,
            Self::UserTyping => 61,
            Self::ChatTyping => 62,
            Self::UsersTyping => 63,
            Self::UsersRecordingAudio => 64,
            Self::CounterChanged => 80,
            Self::NotificationSettingsChanged => 114,
            Self::Unknown => return None,
        };
        Some(code)
    }
}

impl EventKind for UserEventKind {}

/// How a flags update combines with the current flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    Replace,
    Set,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageFlags {
    pub op: FlagOp,
    pub message_id: i64,
    pub flags: i64,
    pub peer_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerFlags {
    pub op: FlagOp,
    pub peer_id: i64,
    pub flags: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: i64,
    pub flags: i64,
    pub peer_id: i64,
    pub timestamp: i64,
    pub text: String,
    /// Title, sender and similar extra fields
    pub extra: Map<String, Value>,
    /// Present when the mode includes [`DeliveryMode::ATTACHMENTS`]
    pub attachments: Option<Map<String, Value>>,
    /// Present when the mode includes [`DeliveryMode::RANDOM_ID`]
    pub random_id: Option<i64>,
}

/// A position in one conversation, used by read and delete updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerPosition {
    pub peer_id: i64,
    pub local_id: i64,
}

/// Typing or recording users in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub peer_id: i64,
    pub user_ids: Vec<i64>,
    pub total_count: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub peer_id: i64,
    pub sound: bool,
    pub disabled_until: i64,
}

/// A decoded user long poll update.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    MessageFlags(MessageFlags),
    MessageNew(Message),
    MessageEdit(Message),
    MessageChanged(Message),
    InboxRead(PeerPosition),
    OutboxRead(PeerPosition),
    FriendOnline {
        user_id: i64,
        /// Present when the mode includes [`DeliveryMode::EXTRA_ONLINE`]
        platform: Option<i64>,
        timestamp: i64,
    },
    FriendOffline {
        user_id: i64,
        /// `false` when the friend logged out, `true` on timeout
        timed_out: bool,
        timestamp: i64,
    },
    PeerFlags(PeerFlags),
    MessagesDeleted(PeerPosition),
    MessagesRestored(PeerPosition),
    MessageCacheReset {
        message_id: i64,
    },
    ChatParamsChanged {
        chat_id: i64,
        by_self: bool,
    },
    ChatInfoChanged {
        type_id: i64,
        peer_id: i64,
        info: i64,
    },
    UserTyping {
        user_id: i64,
        flags: i64,
    },
    ChatTyping {
        user_id: i64,
        chat_id: i64,
    },
    UsersTyping(Activity),
    UsersRecordingAudio(Activity),
    CounterChanged {
        count: i64,
        count_with_notifications: Option<i64>,
    },
    NotificationSettingsChanged(NotificationSettings),
    Unknown {
        code: i64,
        fields: Vec<Value>,
    },
}

impl UserEvent {
    /// Decode one raw update.
    pub fn decode(raw: &Value, mode: DeliveryMode) -> Result<Self> {
        let items = raw.as_array().ok_or(DecodeError::NotAnArray)?;
        let code = items
            .first()
            .and_then(Value::as_i64)
            .ok_or(DecodeError::MissingCode)?;
        let f = Fields { code, items };

        let kind = UserEventKind::from_code(code);
        let event = match kind {
            UserEventKind::MessageFlagsReplaced => Self::MessageFlags(f.message_flags(FlagOp::Replace)?),
            UserEventKind::MessageFlagsSet => Self::MessageFlags(f.message_flags(FlagOp::Set)?),
            UserEventKind::MessageFlagsReset => Self::MessageFlags(f.message_flags(FlagOp::Reset)?),
            UserEventKind::MessageNew => Self::MessageNew(f.message(mode)?),
            UserEventKind::MessageEdit => Self::MessageEdit(f.message(mode)?),
            UserEventKind::MessageChanged => Self::MessageChanged(f.message(mode)?),
            UserEventKind::InboxRead => Self::InboxRead(f.position()?),
            UserEventKind::OutboxRead => Self::OutboxRead(f.position()?),
            UserEventKind::FriendOnline => {
                let extra = f.opt_int(2)?;
                Self::FriendOnline {
                    user_id: f.user_id(1)?,
                    platform: if mode.contains(DeliveryMode::EXTRA_ONLINE) {
                        extra.map(|extra| extra & 0xFF)
                    } else {
                        None
                    },
                    timestamp: f.int(3)?,
                }
            }
            UserEventKind::FriendOffline => Self::FriendOffline {
                user_id: f.user_id(1)?,
                timed_out: f.int(2)? != 0,
                timestamp: f.int(3)?,
            },
            UserEventKind::PeerFlagsReset => Self::PeerFlags(f.peer_flags(FlagOp::Reset)?),
            UserEventKind::PeerFlagsReplaced => Self::PeerFlags(f.peer_flags(FlagOp::Replace)?),
            UserEventKind::PeerFlagsSet => Self::PeerFlags(f.peer_flags(FlagOp::Set)?),
            UserEventKind::MessagesDeleted => Self::MessagesDeleted(f.position()?),
            UserEventKind::MessagesRestored => Self::MessagesRestored(f.position()?),
            UserEventKind::MessageCacheReset => Self::MessageCacheReset {
                message_id: f.int(1)?,
            },
            UserEventKind::ChatParamsChanged => Self::ChatParamsChanged {
                chat_id: f.int(1)?,
                by_self: f.opt_int(2)?.unwrap_or(0) != 0,
            },
            UserEventKind::ChatInfoChanged => Self::ChatInfoChanged {
                type_id: f.int(1)?,
                peer_id: f.int(2)?,
                info: f.opt_int(3)?.unwrap_or(0),
            },
            UserEventKind::UserTyping => Self::UserTyping {
                user_id: f.int(1)?,
                flags: f.opt_int(2)?.unwrap_or(0),
            },
            UserEventKind::ChatTyping => Self::ChatTyping {
                user_id: f.int(1)?,
                chat_id: f.int(2)?,
            },
            UserEventKind::UsersTyping => Self::UsersTyping(f.activity()?),
            UserEventKind::UsersRecordingAudio => Self::UsersRecordingAudio(f.activity()?),
            UserEventKind::CounterChanged => Self::CounterChanged {
                count: f.int(1)?,
                count_with_notifications: f.opt_int(2)?,
            },
            UserEventKind::NotificationSettingsChanged => {
                Self::NotificationSettingsChanged(f.notification_settings()?)
            }
            UserEventKind::Unknown => Self::Unknown {
                code,
                fields: items[1..].to_vec(),
            },
        };

        Ok(event)
    }

    /// Decode one raw update from its JSON text.
    pub fn decode_slice(bytes: &[u8], mode: DeliveryMode) -> Result<Self> {
        let raw: Value = serde_json::from_slice(bytes)?;
        Self::decode(&raw, mode)
    }

    pub fn kind(&self) -> UserEventKind {
        match self {
            Self::MessageFlags(m) => match m.op {
                FlagOp::Replace => UserEventKind::MessageFlagsReplaced,
                FlagOp::Set => UserEventKind::MessageFlagsSet,
                FlagOp::Reset => UserEventKind::MessageFlagsReset,
            },
            Self::MessageNew(_) => UserEventKind::MessageNew,
            Self::MessageEdit(_) => UserEventKind::MessageEdit,
            Self::MessageChanged(_) => UserEventKind::MessageChanged,
            Self::InboxRead(_) => UserEventKind::InboxRead,
            Self::OutboxRead(_) => UserEventKind::OutboxRead,
            Self::FriendOnline { .. } => UserEventKind::FriendOnline,
            Self::FriendOffline { .. } => UserEventKind::FriendOffline,
            Self::PeerFlags(p) => match p.op {
                FlagOp::Replace => UserEventKind::PeerFlagsReplaced,
                FlagOp::Set => UserEventKind::PeerFlagsSet,
                FlagOp::Reset => UserEventKind::PeerFlagsReset,
            },
            Self::MessagesDeleted(_) => UserEventKind::MessagesDeleted,
            Self::MessagesRestored(_) => UserEventKind::MessagesRestored,
            Self::MessageCacheReset { .. } => UserEventKind::MessageCacheReset,
            Self::ChatParamsChanged { .. } => UserEventKind::ChatParamsChanged,
            Self::ChatInfoChanged { .. } => UserEventKind::ChatInfoChanged,
            Self::UserTyping { .. } => UserEventKind::UserTyping,
            Self::ChatTyping { .. } => UserEventKind::ChatTyping,
            Self::UsersTyping(_) => UserEventKind::UsersTyping,
            Self::UsersRecordingAudio(_) => UserEventKind::UsersRecordingAudio,
            Self::CounterChanged { .. } => UserEventKind::CounterChanged,
            Self::NotificationSettingsChanged(_) => UserEventKind::NotificationSettingsChanged,
            Self::Unknown { .. } => UserEventKind::Unknown,
        }
    }
}

/// Positional reader over one update array.
struct Fields<'a> {
    code: i64,
    items: &'a [Value],
}

impl<'a> Fields<'a> {
    fn get(&self, index: usize) -> Result<&'a Value> {
        self.items.get(index).ok_or(DecodeError::MissingField {
            code: self.code,
            index,
        })
    }

    fn invalid(&self, index: usize, expected: &'static str) -> DecodeError {
        DecodeError::InvalidField {
            code: self.code,
            index,
            expected,
        }
    }

    fn int(&self, index: usize) -> Result<i64> {
        let value = self.get(index)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| self.invalid(index, "an integer"))
    }

    /// Friend ids arrive negated.
    fn user_id(&self, index: usize) -> Result<i64> {
        self.int(index)?
            .checked_abs()
            .ok_or_else(|| self.invalid(index, "a user id"))
    }

    fn opt_int(&self, index: usize) -> Result<Option<i64>> {
        match self.items.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.int(index).map(Some),
        }
    }

    fn opt_text(&self, index: usize) -> Result<Option<String>> {
        match self.items.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(index, "a string")),
        }
    }

    /// Objects may arrive as `[]` when empty.
    fn opt_object(&self, index: usize) -> Result<Option<Map<String, Value>>> {
        match self.items.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(Value::Array(a)) if a.is_empty() => Ok(Some(Map::new())),
            Some(_) => Err(self.invalid(index, "an object")),
        }
    }

    fn ints(&self, index: usize) -> Result<Vec<i64>> {
        self.get(index)?
            .as_array()
            .ok_or_else(|| self.invalid(index, "an array"))?
            .iter()
            .map(|v| v.as_i64().ok_or_else(|| self.invalid(index, "an integer array")))
            .collect()
    }

    fn message_flags(&self, op: FlagOp) -> Result<MessageFlags> {
        Ok(MessageFlags {
            op,
            message_id: self.int(1)?,
            flags: self.int(2)?,
            peer_id: self.opt_int(3)?,
        })
    }

    fn peer_flags(&self, op: FlagOp) -> Result<PeerFlags> {
        Ok(PeerFlags {
            op,
            peer_id: self.int(1)?,
            flags: self.int(2)?,
        })
    }

    fn position(&self) -> Result<PeerPosition> {
        Ok(PeerPosition {
            peer_id: self.int(1)?,
            local_id: self.int(2)?,
        })
    }

    fn activity(&self) -> Result<Activity> {
        Ok(Activity {
            peer_id: self.int(1)?,
            user_ids: self.ints(2)?,
            total_count: self.int(3)?,
            timestamp: self.int(4)?,
        })
    }

    fn message(&self, mode: DeliveryMode) -> Result<Message> {
        // Optional trailing fields only occupy a position when enabled.
        let with_attachments = mode.contains(DeliveryMode::ATTACHMENTS);
        let attachments = if with_attachments {
            self.opt_object(7)?
        } else {
            None
        };
        let random_id = if mode.contains(DeliveryMode::RANDOM_ID) {
            self.opt_int(if with_attachments { 8 } else { 7 })?
        } else {
            None
        };

        Ok(Message {
            message_id: self.int(1)?,
            flags: self.int(2)?,
            peer_id: self.int(3)?,
            timestamp: self.int(4)?,
            text: self.opt_text(5)?.unwrap_or_default(),
            extra: self.opt_object(6)?.unwrap_or_default(),
            attachments,
            random_id,
        })
    }

    fn notification_settings(&self) -> Result<NotificationSettings> {
        let object = self
            .opt_object(1)?
            .ok_or_else(|| self.invalid(1, "an object"))?;
        let field = |name: &str| object.get(name).and_then(Value::as_i64);

        Ok(NotificationSettings {
            peer_id: field("peer_id").ok_or_else(|| self.invalid(1, "an object with peer_id"))?,
            sound: field("sound").unwrap_or(1) != 0,
            disabled_until: field("disabled_until").unwrap_or(0),
        })
    }
}
