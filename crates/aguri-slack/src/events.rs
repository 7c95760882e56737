//! Decode RTM frames into the core's closed `RtmEvent` enum.

use serde_json::Value;

use aguri_core::events::{FileSharedEvent, MessageEvent, RtmEvent};

/// Event types the relay knows about but does not act on.
const NOT_IMPLEMENTED: &[&str] = &[
    "bot_added",
    "bot_changed",
    "channel_archive",
    "channel_created",
    "channel_deleted",
    "channel_joined",
    "channel_left",
    "channel_rename",
    "channel_unarchive",
    "dnd_updated",
    "emoji_changed",
    "file_change",
    "file_comment_added",
    "file_created",
    "file_deleted",
    "file_public",
    "group_archive",
    "group_close",
    "group_joined",
    "group_left",
    "group_open",
    "group_rename",
    "group_unarchive",
    "im_close",
    "im_created",
    "im_open",
    "member_joined_channel",
    "member_left_channel",
    "pin_added",
    "pin_removed",
    "reaction_added",
    "reaction_removed",
    "star_added",
    "star_removed",
    "subteam_created",
    "subteam_updated",
    "team_join",
    "user_change",
];

/// Bookkeeping traffic with no relay meaning.
const IGNORED: &[&str] = &[
    "channel_marked",
    "desktop_notification",
    "dnd_updated_user",
    "goodbye",
    "group_marked",
    "im_marked",
    "pong",
    "presence_change",
    "reconnect_url",
    "user_typing",
];

/// Server notice that the socket is about to close.
pub const GOODBYE: &str = "goodbye";

pub fn decode_event(frame: &str) -> RtmEvent {
    let value: Value = match serde_json::from_str(frame) {
        Ok(v) => v,
        Err(e) => {
            return RtmEvent::Unexpected {
                kind: "invalid_json".to_string(),
                raw: format!("{e}: {frame}"),
            }
        }
    };

    // Acks for frames we sent carry `reply_to` and no type.
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        if value.get("reply_to").is_some() {
            return RtmEvent::Ignored {
                kind: "reply".to_string(),
            };
        }
        return RtmEvent::Unexpected {
            kind: String::new(),
            raw: frame.to_string(),
        };
    };

    match kind {
        "hello" => RtmEvent::Connected,
        "message" => match serde_json::from_value::<MessageEvent>(value.clone()) {
            Ok(ev) => RtmEvent::Message(ev),
            Err(e) => RtmEvent::Unexpected {
                kind: kind.to_string(),
                raw: format!("{e}: {frame}"),
            },
        },
        "file_shared" => match serde_json::from_value::<FileSharedEvent>(value.clone()) {
            Ok(ev) => RtmEvent::FileShared(ev),
            Err(e) => RtmEvent::Unexpected {
                kind: kind.to_string(),
                raw: format!("{e}: {frame}"),
            },
        },
        "error" => {
            let msg = value
                .pointer("/error/msg")
                .and_then(Value::as_str)
                .unwrap_or(frame);
            RtmEvent::RtmError(msg.to_string())
        }
        k if NOT_IMPLEMENTED.contains(&k) => RtmEvent::NotImplemented {
            kind: k.to_string(),
            raw: frame.to_string(),
        },
        k if IGNORED.contains(&k) => RtmEvent::Ignored {
            kind: k.to_string(),
        },
        k => RtmEvent::Unexpected {
            kind: k.to_string(),
            raw: frame.to_string(),
        },
    }
}
