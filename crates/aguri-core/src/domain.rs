use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Chat API attachments are vendor-shaped JSON that we only pass through.
pub type Attachment = serde_json::Value;

/// Sender id the platform uses for its own system bot.
pub const SLACKBOT_USER_ID: &str = "USLACKBOT";

/// Bot id the platform uses for slackbot on bot-authored messages.
pub const SLACKBOT_BOT_ID: &str = "B01";

/// Conversation classification, derived from the first character of its id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Channel,
    Group,
    Dm,
    Unknown,
}

impl ChannelType {
    /// `C…` public channel, `G…` private group, `D…` direct message.
    pub fn detect(id: &str) -> Self {
        match id.chars().next() {
            Some('C') => ChannelType::Channel,
            Some('G') => ChannelType::Group,
            Some('D') => ChannelType::Dm,
            _ => ChannelType::Unknown,
        }
    }

    /// Single-letter marker used in forwarded usernames (`user@c:general`).
    pub fn initial(self) -> char {
        match self {
            ChannelType::Channel => 'c',
            ChannelType::Group => 'g',
            ChannelType::Dm => 'd',
            ChannelType::Unknown => 'u',
        }
    }

    /// Value of the `types` parameter of the conversation listing API.
    pub fn list_param(self) -> Option<&'static str> {
        match self {
            ChannelType::Channel => Some("public_channel"),
            ChannelType::Group => Some("private_channel"),
            ChannelType::Dm => Some("im"),
            ChannelType::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Channel => "channel",
            ChannelType::Group => "group",
            ChannelType::Dm => "dm",
            ChannelType::Unknown => "unknown",
        }
    }
}

/// Every conversation type we relay.
pub const ALL_CONVERSATION_TYPES: [ChannelType; 3] =
    [ChannelType::Channel, ChannelType::Group, ChannelType::Dm];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub is_member: bool,
    /// Counterpart user id for direct messages.
    pub user: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ConversationPage {
    pub channels: Vec<Conversation>,
    /// Empty when this was the last page.
    pub next_cursor: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderKind {
    User,
    Bot,
    /// Status-like events (`message_changed`, ...) carry no real sender.
    Status,
}

/// Display identity of a message author.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub kind: SenderKind,
    pub icon_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub icon_url: Option<String>,
}

/// Where a post actually landed; this is what the correlation store keeps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel_id: String,
    pub timestamp: String,
}

/// Outbound post.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutgoingMessage {
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Display name override.
    pub username: Option<String>,
    pub icon_url: Option<String>,
    pub icon_emoji: Option<String>,
    /// Post as the token's user instead of as a bot.
    pub as_user: bool,
    pub unfurl_media: bool,
    /// Let the platform expand `<@U…>` style links.
    pub link_names: bool,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn as_user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            as_user: true,
            ..Default::default()
        }
    }
}

/// One entry of a file's share map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FileShare {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub title: String,
    pub filetype: String,
    pub user: String,
    pub initial_comment: String,
    pub url_private_download: String,
    pub permalink: String,
    /// Channel id -> shares, public and private merged.
    pub shares: HashMap<String, Vec<FileShare>>,
}

impl FileInfo {
    /// Newest share of this file in `channel_id`.
    pub fn newest_share(&self, channel_id: &str) -> Option<&FileShare> {
        self.shares
            .get(channel_id)?
            .iter()
            .max_by(|a, b| a.ts.cmp(&b.ts))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub filetype: String,
    pub title: String,
    pub initial_comment: String,
}

impl FileUpload {
    pub fn from_original(bytes: Vec<u8>, original: &FileInfo) -> Self {
        Self {
            bytes,
            filename: original.name.clone(),
            filetype: original.filetype.clone(),
            title: original.title.clone(),
            initial_comment: original.initial_comment.clone(),
        }
    }
}

/// A message as returned by the history API.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryMessage {
    pub user: String,
    pub bot_id: String,
    pub text: String,
    pub ts: String,
    pub attachments: Vec<Attachment>,
}
