//! In-memory `ChatApi` used by the unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    domain::{
        Attachment, ChannelType, Conversation, ConversationPage, FileInfo, FileUpload,
        HistoryMessage, OutgoingMessage, PostedMessage, Profile,
    },
    errors::Error,
    ports::ChatApi,
    Result,
};

#[derive(Default)]
pub struct FakeChatApi {
    pub conversations: Mutex<Vec<Conversation>>,
    pub page_size: usize,
    /// Listing fails when asked for this page index.
    pub fail_page: Option<usize>,
    /// Private channels converted from public ones: `C` ids that only the
    /// private listing returns and `conversation_info` refuses.
    pub converted: Vec<Conversation>,
    pub unsupported_info: HashSet<String>,
    pub users: HashMap<String, Profile>,
    pub bots: HashMap<String, Profile>,
    pub files: HashMap<String, FileInfo>,
    pub downloads: HashMap<String, Vec<u8>>,
    pub history: HashMap<String, Vec<HistoryMessage>>,
    pub fail_posts: bool,

    pub upload_results: Mutex<VecDeque<Result<FileInfo>>>,
    pub upload_calls: Mutex<usize>,
    pub list_calls: Mutex<usize>,
    pub posts: Mutex<Vec<(String, OutgoingMessage)>>,
    pub updates: Mutex<Vec<(String, String, String, Vec<Attachment>)>>,
    pub joined: Mutex<Vec<String>>,
    pub created: Mutex<Vec<String>>,
    next_ts: Mutex<u32>,
}

impl FakeChatApi {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            ..Default::default()
        }
    }

    pub fn with_channel(self, id: &str, name: &str, is_member: bool) -> Self {
        self.conversations.lock().unwrap().push(Conversation {
            id: id.to_string(),
            name: name.to_string(),
            is_member,
            user: None,
        });
        self
    }

    pub fn with_converted_channel(mut self, id: &str, name: &str) -> Self {
        self.unsupported_info.insert(id.to_string());
        self.converted.push(Conversation {
            id: id.to_string(),
            name: name.to_string(),
            is_member: true,
            user: None,
        });
        self
    }

    pub fn with_user(mut self, id: &str, name: &str) -> Self {
        self.users.insert(
            id.to_string(),
            Profile {
                name: name.to_string(),
                icon_url: Some(format!("https://icons.example/{id}.png")),
            },
        );
        self
    }

    pub fn with_bot(mut self, id: &str, name: &str) -> Self {
        self.bots.insert(
            id.to_string(),
            Profile {
                name: name.to_string(),
                icon_url: None,
            },
        );
        self
    }

    pub fn posts(&self) -> Vec<(String, OutgoingMessage)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    fn channel_id_for(&self, channel: &str) -> String {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == channel || c.id == channel)
            .map(|c| c.id.clone())
            .unwrap_or_else(|| channel.to_string())
    }
}

fn not_found(method: &str) -> Error {
    Error::Api {
        method: method.to_string(),
        code: "not_found".to_string(),
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn list_conversations_page(
        &self,
        types: &[ChannelType],
        cursor: Option<&str>,
    ) -> Result<ConversationPage> {
        *self.list_calls.lock().unwrap() += 1;
        let page: usize = cursor.map(|c| c.parse().unwrap_or(0)).unwrap_or(0);
        if self.fail_page == Some(page) {
            return Err(Error::Http {
                status: 500,
                message: "conversations.list".to_string(),
            });
        }

        let mut all: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| types.contains(&ChannelType::detect(&c.id)))
            .cloned()
            .collect();
        if types.contains(&ChannelType::Group) {
            all.extend(self.converted.iter().cloned());
        }

        let size = self.page_size.max(1);
        let start = page * size;
        let channels: Vec<Conversation> = all.iter().skip(start).take(size).cloned().collect();
        let next_cursor = if start + size < all.len() {
            (page + 1).to_string()
        } else {
            String::new()
        };
        Ok(ConversationPage {
            channels,
            next_cursor,
        })
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Conversation> {
        if self.unsupported_info.contains(channel_id) {
            return Err(Error::Api {
                method: "conversations.info".to_string(),
                code: "method_not_supported_for_channel_type".to_string(),
            });
        }
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == channel_id)
            .cloned()
            .ok_or_else(|| not_found("conversations.info"))
    }

    async fn user_info(&self, user_id: &str) -> Result<Profile> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| not_found("users.info"))
    }

    async fn bot_info(&self, bot_id: &str) -> Result<Profile> {
        self.bots
            .get(bot_id)
            .cloned()
            .ok_or_else(|| not_found("bots.info"))
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| not_found("files.info"))
    }

    async fn post_message(&self, channel: &str, msg: &OutgoingMessage) -> Result<PostedMessage> {
        if self.fail_posts {
            return Err(Error::Api {
                method: "chat.postMessage".to_string(),
                code: "channel_not_found".to_string(),
            });
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), msg.clone()));
        let mut n = self.next_ts.lock().unwrap();
        *n += 1;
        Ok(PostedMessage {
            channel_id: self.channel_id_for(channel),
            timestamp: format!("900.{:03}", *n),
        })
    }

    async fn update_message(
        &self,
        channel_id: &str,
        timestamp: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<()> {
        self.updates.lock().unwrap().push((
            channel_id.to_string(),
            timestamp.to_string(),
            text.to_string(),
            attachments.to_vec(),
        ));
        Ok(())
    }

    async fn upload_file(&self, upload: &FileUpload) -> Result<FileInfo> {
        *self.upload_calls.lock().unwrap() += 1;
        match self.upload_results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(FileInfo {
                id: "FUP".to_string(),
                name: upload.filename.clone(),
                permalink: format!("https://files.example/{}", upload.filename),
                ..Default::default()
            }),
        }
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads.get(url).cloned().ok_or_else(|| Error::Http {
            status: 404,
            message: url.to_string(),
        })
    }

    async fn join_conversation(&self, channel_id: &str) -> Result<()> {
        self.joined.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }

    async fn create_conversation(&self, name: &str, _is_private: bool) -> Result<Conversation> {
        self.created.lock().unwrap().push(name.to_string());
        Ok(Conversation {
            id: format!("CNEW{}", self.created.lock().unwrap().len()),
            name: name.to_string(),
            is_member: true,
            user: None,
        })
    }

    async fn conversation_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        Ok(self
            .history
            .get(channel_id)
            .map(|msgs| msgs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
