//! Text helpers for forwarded messages.

use std::{collections::HashMap, sync::OnceLock};

use regex::{Captures, Regex};

use crate::domain::ChannelType;

static MENTION_RE: OnceLock<Regex> = OnceLock::new();
static AGGREGATED_USERNAME_RE: OnceLock<Regex> = OnceLock::new();

/// `<@U123>` or `<@U123|label>`.
fn mention_re() -> &'static Regex {
    MENTION_RE.get_or_init(|| Regex::new(r"<@(U[A-Z0-9]+)(?:\|[^>]*)?>").expect("valid regex"))
}

fn aggregated_username_re() -> &'static Regex {
    AGGREGATED_USERNAME_RE.get_or_init(|| Regex::new(r"(\S+)@(\S+):(\S+)").expect("valid regex"))
}

/// Distinct user ids mentioned in `text`, in first-seen order.
pub fn mentioned_user_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in mention_re().captures_iter(text) {
        let id = caps[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Replace mention tokens with `@name`; unknown ids are left untouched.
pub fn replace_mentions(text: &str, names: &HashMap<String, String>) -> String {
    mention_re()
        .replace_all(text, |caps: &Captures| match names.get(&caps[1]) {
            Some(name) => format!("@{name}"),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Display name of a forwarded post: `alice@c:general`, plus ` (in Thread)`.
pub fn aggregated_username(
    display_name: &str,
    channel_type: ChannelType,
    channel_name: &str,
    in_thread: bool,
) -> String {
    let mut name = format!("{display_name}@{}:{channel_name}", channel_type.initial());
    if in_thread {
        name.push_str(" (in Thread)");
    }
    name
}

/// Parsed `user@typeChar:channelName`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedUsername {
    pub user: String,
    pub type_marker: String,
    pub channel_name: String,
}

pub fn parse_aggregated_username(username: &str) -> Option<AggregatedUsername> {
    let caps = aggregated_username_re().captures(username)?;
    Some(AggregatedUsername {
        user: caps[1].to_string(),
        type_marker: caps[2].to_string(),
        channel_name: caps[3].to_string(),
    })
}

pub fn edited_text(before: &str, after: &str) -> String {
    format!("Edited From:\n{before}\n\nEdited To:\n{after}")
}

pub fn deleted_text(body: &str) -> String {
    format!("Original Text:\n{body}")
}
