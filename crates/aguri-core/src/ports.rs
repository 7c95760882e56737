use async_trait::async_trait;

use crate::{
    domain::{
        Attachment, ChannelType, Conversation, ConversationPage, FileInfo, FileUpload,
        HistoryMessage, OutgoingMessage, PostedMessage, Profile,
    },
    Result,
};

/// Hexagonal port over one workspace's chat Web API.
///
/// One instance per credential; the adapter crate implements it over HTTP and
/// tests implement it in memory.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// One page of the conversation listing. Archived conversations are excluded.
    async fn list_conversations_page(
        &self,
        types: &[ChannelType],
        cursor: Option<&str>,
    ) -> Result<ConversationPage>;

    async fn conversation_info(&self, channel_id: &str) -> Result<Conversation>;
    async fn user_info(&self, user_id: &str) -> Result<Profile>;
    async fn bot_info(&self, bot_id: &str) -> Result<Profile>;
    async fn file_info(&self, file_id: &str) -> Result<FileInfo>;

    /// `channel` may be an id or a name.
    async fn post_message(&self, channel: &str, msg: &OutgoingMessage) -> Result<PostedMessage>;

    async fn update_message(
        &self,
        channel_id: &str,
        timestamp: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<()>;

    /// Upload without sharing; the caller posts the permalink itself.
    async fn upload_file(&self, upload: &FileUpload) -> Result<FileInfo>;

    /// GET a private file URL with this workspace's bearer credential.
    async fn download_file(&self, url: &str) -> Result<Vec<u8>>;

    async fn join_conversation(&self, channel_id: &str) -> Result<()>;
    async fn create_conversation(&self, name: &str, is_private: bool) -> Result<Conversation>;

    /// Newest first, as the API returns it.
    async fn conversation_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>>;
}
