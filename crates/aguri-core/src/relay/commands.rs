//! `\aguri` commands typed by operators into an aggregation channel.
//!
//! Each command acts on the source workspace the channel aggregates.

use std::sync::Arc;

use crate::{
    config::aggregation_channel_name,
    directory::Directory,
    domain::{
        ChannelType, Conversation, OutgoingMessage, ALL_CONVERSATION_TYPES, SLACKBOT_BOT_ID,
    },
    errors::{Error, ResultExt},
    formatting::aggregated_username,
    ports::ChatApi,
    relay::SourceWorkspaces,
    Result,
};

pub const COMMAND_PREFIX: &str = "\\aguri ";

const USAGE_JOIN: &str = "Usage: \\aguri join <channel name>";
const USAGE_LIST: &str = "Usage: \\aguri list <channel>";
const USAGE_POST: &str = "Usage: \\aguri post <channel name> <message>";
const USAGE_CREATE: &str = "Usage: \\aguri create channel <channel name>";
const USAGE_HISTORY: &str = "Usage: \\aguri history <channel name> <limit>";

const SYSTEM_USERNAME: &str = "aguri@s:system";
const SYSTEM_ICON: &str = ":ghost:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Join { channel: String },
    List { target: String },
    Post { channel: String, body: String },
    Create { name: String },
    History { channel: String, limit: usize },
}

pub fn is_command(text: &str) -> bool {
    text.starts_with(COMMAND_PREFIX)
}

fn usage(text: &str) -> Error {
    Error::Usage(text.to_string())
}

/// Parse `\aguri <verb> [args...]`. The prefix is optional here.
pub fn parse_command(text: &str) -> Result<Command> {
    let rest = text.strip_prefix(COMMAND_PREFIX).unwrap_or(text);
    let args: Vec<&str> = rest.split_whitespace().collect();
    let Some((&verb, args)) = args.split_first() else {
        return Err(Error::Usage("command not found: ".to_string()));
    };

    match verb {
        "join" => match args {
            [channel] => Ok(Command::Join {
                channel: channel.to_string(),
            }),
            _ => Err(usage(USAGE_JOIN)),
        },
        "list" => match args {
            [target] => Ok(Command::List {
                target: target.to_string(),
            }),
            _ => Err(usage(USAGE_LIST)),
        },
        "post" => match args {
            [channel, _, ..] => Ok(Command::Post {
                channel: channel.to_string(),
                body: remainder_after(rest, 2).to_string(),
            }),
            _ => Err(usage(USAGE_POST)),
        },
        "create" => match args {
            ["channel", name] => Ok(Command::Create {
                name: name.to_string(),
            }),
            [name] if *name != "channel" => Ok(Command::Create {
                name: name.to_string(),
            }),
            _ => Err(usage(USAGE_CREATE)),
        },
        "history" => match args {
            [channel, limit] => {
                let limit = limit.parse::<usize>().map_err(|_| usage(USAGE_HISTORY))?;
                Ok(Command::History {
                    channel: channel.to_string(),
                    limit,
                })
            }
            _ => Err(usage(USAGE_HISTORY)),
        },
        other => Err(Error::Usage(format!("command not found: {other}"))),
    }
}

/// Text after the first `n` whitespace-separated tokens, inner spacing kept.
fn remainder_after(text: &str, n: usize) -> &str {
    let mut rest = text.trim_start();
    for _ in 0..n {
        rest = match rest.find(char::is_whitespace) {
            Some(i) => rest[i..].trim_start(),
            None => "",
        };
    }
    rest
}

pub struct CommandInterpreter {
    destination: Directory,
    sources: SourceWorkspaces,
}

impl CommandInterpreter {
    pub fn new(destination: Arc<dyn ChatApi>, sources: SourceWorkspaces) -> Self {
        Self {
            destination: Directory::new(destination),
            sources,
        }
    }

    /// Parse and run one command for `workspace`.
    pub async fn execute(&self, workspace: &str, text: &str) -> Result<()> {
        let command = parse_command(text)?;
        let source = Directory::new(self.sources.get(workspace)?);
        tracing::info!(workspace, ?command, "running command");

        match command {
            Command::Join { channel } => self
                .join(&source, &channel)
                .await
                .context("failed to join channel"),
            Command::List { target } => self
                .list(&source, workspace, &target)
                .await
                .context("failed to list channels"),
            Command::Post { channel, body } => source
                .api()
                .post_message(&channel, &OutgoingMessage::as_user(body))
                .await
                .map(|_| ())
                .context("failed to post message"),
            Command::Create { name } => source
                .api()
                .create_conversation(&name, false)
                .await
                .map(|_| ())
                .context("failed to create conversation"),
            Command::History { channel, limit } => self
                .history(&source, workspace, &channel, limit)
                .await
                .context("failed to get history"),
        }
    }

    async fn join(&self, source: &Directory, channel: &str) -> Result<()> {
        let conversation = source.find_channel(channel).await?;
        source.api().join_conversation(&conversation.id).await
    }

    async fn list(&self, source: &Directory, workspace: &str, target: &str) -> Result<()> {
        if target != "channel" {
            return Err(Error::Usage(format!("Unsupported target type: {target}")));
        }

        let channels = source.list_conversations(&ALL_CONVERSATION_TYPES).await?;
        let (joined, unjoined): (Vec<_>, Vec<_>) = channels.iter().partition(|c| c.is_member);
        let names = |list: Vec<&Conversation>| {
            list.iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };
        let text = [
            "# Joined channels\n".to_string(),
            names(joined),
            "\n## Unjoined channels\n".to_string(),
            names(unjoined),
        ]
        .join("\n");

        self.destination
            .api()
            .post_message(
                &aggregation_channel_name(workspace),
                &OutgoingMessage::as_user(text),
            )
            .await
            .map(|_| ())
    }

    async fn history(
        &self,
        source: &Directory,
        workspace: &str,
        channel: &str,
        limit: usize,
    ) -> Result<()> {
        let conversation = source.find_channel(channel).await?;
        let messages = source
            .api()
            .conversation_history(&conversation.id, limit)
            .await?;
        let target = aggregation_channel_name(workspace);

        let header = OutgoingMessage {
            text: format!("{channel} history...\n"),
            username: Some(SYSTEM_USERNAME.to_string()),
            icon_emoji: Some(SYSTEM_ICON.to_string()),
            ..Default::default()
        };
        self.destination.api().post_message(&target, &header).await?;

        let channel_type = ChannelType::detect(&conversation.id);
        // The API returns newest first; replay oldest first.
        for message in messages.iter().rev() {
            let author = if !message.user.is_empty() {
                source.resolve_user(&message.user).await?.display_name
            } else if message.bot_id == SLACKBOT_BOT_ID {
                "SLACKBOT".to_string()
            } else if !message.bot_id.is_empty() {
                source.api().bot_info(&message.bot_id).await?.name
            } else {
                "unknown".to_string()
            };

            let replay = OutgoingMessage {
                text: message.text.clone(),
                attachments: message.attachments.clone(),
                username: Some(aggregated_username(
                    &author,
                    channel_type,
                    &conversation.name,
                    false,
                )),
                icon_emoji: Some(SYSTEM_ICON.to_string()),
                ..Default::default()
            };
            self.destination.api().post_message(&target, &replay).await?;
        }
        Ok(())
    }
}
