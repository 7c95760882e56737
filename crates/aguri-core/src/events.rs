//! Real-time events as the core sees them.
//!
//! The adapter decodes the vendor's open-ended event union into this closed
//! enum; everything it does not know lands in `Unexpected`.

use serde::{Deserialize, Deserializer};

use crate::domain::Attachment;

#[derive(Clone, Debug, PartialEq)]
pub enum RtmEvent {
    Connected,
    Message(MessageEvent),
    FileShared(FileSharedEvent),
    RtmError(String),
    /// Transport-level failure; the text is the only detail the transport gives us.
    ConnectionError(String),
    /// Recognized event types the relay does not handle (reactions, joins, ...).
    NotImplemented { kind: String, raw: String },
    /// Recognized bookkeeping events (hello, typing, read marks, ...).
    Ignored { kind: String },
    Unexpected { kind: String, raw: String },
}

impl RtmEvent {
    /// Timestamp used by the pipelines' duplicate-delivery guard.
    pub fn dedup_timestamp(&self) -> Option<&str> {
        match self {
            RtmEvent::Message(ev) => Some(ev.ts.as_str()),
            RtmEvent::FileShared(ev) => Some(ev.event_ts.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub channel: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub bot_id: String,
    /// Display name override set by whoever posted (bots, the forward pipeline).
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub thread_ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subtype: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
    /// New state of the message for `message_changed`.
    pub message: Option<SubMessage>,
    /// Timestamp of the removed message for `message_deleted`.
    #[serde(deserialize_with = "null_as_default")]
    pub deleted_ts: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub thread_ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
}

impl MessageEvent {
    pub fn is_in_thread(&self) -> bool {
        !self.thread_ts.is_empty()
    }

    /// The edit payload; empty when the event carried none.
    pub fn edited(&self) -> SubMessage {
        self.message.clone().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileSharedEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub file_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub channel_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event_ts: String,
}

/// The platform sometimes sends `null` where a field is normally a string or
/// list; treat it like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Subtype of a text edit or link-unfurl expansion.
pub const SUBTYPE_MESSAGE_CHANGED: &str = "message_changed";
pub const SUBTYPE_MESSAGE_DELETED: &str = "message_deleted";

/// Marker the transport puts in rate-limit connection errors.
pub const RATE_LIMIT_MARKER: &str = "rate limit exceeded";

/// Rate-limit connection errors are detected by substring: the transport
/// offers no structured code for them.
pub fn is_rate_limit_error(text: &str) -> bool {
    text.to_lowercase().contains(RATE_LIMIT_MARKER)
}
