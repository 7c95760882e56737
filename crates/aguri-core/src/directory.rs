//! Directory resolver: ids -> display names and channel types.
//!
//! Nothing is cached; every resolution queries the API again.

use std::sync::Arc;

use crate::{
    domain::{
        ChannelType, Conversation, Identity, Profile, SenderKind, ALL_CONVERSATION_TYPES,
        SLACKBOT_BOT_ID,
    },
    errors::{Error, ResultExt},
    ports::ChatApi,
    Result,
};

/// Returned by `conversations.info` for private channels converted from public ones.
pub const METHOD_NOT_SUPPORTED_FOR_CHANNEL_TYPE: &str = "method_not_supported_for_channel_type";

#[derive(Clone)]
pub struct Directory {
    api: Arc<dyn ChatApi>,
}

impl Directory {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<dyn ChatApi> {
        &self.api
    }

    /// Every conversation of `types`, all pages concatenated in arrival order.
    ///
    /// Any failing page fails the whole listing.
    pub async fn list_conversations(&self, types: &[ChannelType]) -> Result<Vec<Conversation>> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .api
                .list_conversations_page(types, cursor.as_deref())
                .await
                .context("failed to list conversations")?;
            channels.extend(page.channels);
            if page.next_cursor.is_empty() {
                return Ok(channels);
            }
            cursor = Some(page.next_cursor);
        }
    }

    /// Find a public or private channel by name.
    pub async fn find_channel(&self, name: &str) -> Result<Conversation> {
        self.list_conversations(&[ChannelType::Channel, ChannelType::Group])
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::ChannelNotFound(name.to_string()))
    }

    /// Whether this workspace's token is a member of `channel_id`.
    pub async fn is_joined(&self, channel_id: &str) -> Result<bool> {
        let channels = self.list_conversations(&ALL_CONVERSATION_TYPES).await?;
        Ok(channels.iter().any(|c| c.id == channel_id && c.is_member))
    }

    /// Classify `channel_id` and resolve its display name.
    ///
    /// Direct messages are named after the sender, so `user_id`/`subtype`
    /// describe the message that was seen there.
    pub async fn resolve_channel(
        &self,
        channel_id: &str,
        user_id: &str,
        subtype: &str,
    ) -> Result<(ChannelType, String)> {
        let kind = ChannelType::detect(channel_id);
        match kind {
            ChannelType::Channel => match self.api.conversation_info(channel_id).await {
                Ok(info) => Ok((kind, info.name)),
                Err(e) if e.is_api_error(METHOD_NOT_SUPPORTED_FOR_CHANNEL_TYPE) => {
                    // Converted from public: only the private listing knows it.
                    let name = self.private_channel_name(channel_id).await?;
                    Ok((kind, name))
                }
                Err(e) => Err(e.context(format!("failed to get channel info ({channel_id})"))),
            },
            ChannelType::Group => {
                let info = self
                    .api
                    .conversation_info(channel_id)
                    .await
                    .with_context(|| format!("failed to get group info ({channel_id})"))?;
                Ok((kind, info.name))
            }
            ChannelType::Dm if subtype.is_empty() && !user_id.is_empty() => {
                let info = self
                    .api
                    .user_info(user_id)
                    .await
                    .with_context(|| format!("failed to get user info (user: {user_id})"))?;
                Ok((kind, info.name))
            }
            _ => Err(Error::ChannelNotFound(channel_id.to_string())),
        }
    }

    async fn private_channel_name(&self, channel_id: &str) -> Result<String> {
        self.list_conversations(&[ChannelType::Group])
            .await?
            .into_iter()
            .find(|c| c.id == channel_id)
            .map(|c| c.name)
            .ok_or_else(|| Error::ChannelNotFound(channel_id.to_string()))
    }

    /// Resolve the author of a message.
    ///
    /// Precedence: slackbot, other bots, status subtypes, then plain users.
    pub async fn resolve_sender(
        &self,
        bot_id: &str,
        user_id: &str,
        subtype: &str,
    ) -> Result<Identity> {
        if bot_id == SLACKBOT_BOT_ID {
            return Ok(Identity {
                display_name: "Slack bot".to_string(),
                kind: SenderKind::Bot,
                icon_url: None,
            });
        }
        if !bot_id.is_empty() {
            let Profile { name, icon_url } = self
                .api
                .bot_info(bot_id)
                .await
                .with_context(|| format!("failed to get bot info (bot: {bot_id})"))?;
            return Ok(Identity {
                display_name: name,
                kind: SenderKind::Bot,
                icon_url,
            });
        }
        if !subtype.is_empty() {
            return Ok(Identity {
                display_name: subtype.to_string(),
                kind: SenderKind::Status,
                icon_url: None,
            });
        }
        self.resolve_user(user_id).await
    }

    pub async fn resolve_user(&self, user_id: &str) -> Result<Identity> {
        let Profile { name, icon_url } = self
            .api
            .user_info(user_id)
            .await
            .with_context(|| format!("failed to get user info (user: {user_id})"))?;
        Ok(Identity {
            display_name: name,
            kind: SenderKind::User,
            icon_url,
        })
    }
}
