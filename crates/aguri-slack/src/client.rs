//! Slack Web API client implementing the core `ChatApi` port.

use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use aguri_core::{
    domain::{
        Attachment, ChannelType, Conversation, ConversationPage, FileInfo, FileShare, FileUpload,
        HistoryMessage, OutgoingMessage, PostedMessage, Profile,
    },
    errors::Error,
    ports::ChatApi,
    Result,
};

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Text of the connection error reported for HTTP 429 responses.
pub const RATE_LIMIT_MESSAGE: &str = "slack rate limit exceeded";

const LIST_PAGE_LIMIT: usize = 200;

#[derive(Clone)]
pub struct SlackClient {
    token: String,
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::External(format!("failed to build http client: {e}")))?;
        Ok(Self {
            token: token.into(),
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, String)]) -> Result<T> {
        let req = self
            .http
            .get(self.endpoint(method))
            .bearer_auth(&self.token)
            .query(query);
        self.send(method, req).await
    }

    async fn post_json<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let req = self
            .http
            .post(self.endpoint(method))
            .bearer_auth(&self.token)
            .json(body);
        self.send(method, req).await
    }

    async fn send<T: DeserializeOwned>(&self, method: &str, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::External(format!("{method} request error: {e}")))?;
        let value: Value = check_status(method, resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::External(format!("{method} json error: {e}")))?;
        decode_response(method, value)
    }

    /// Start a real-time session and return its WebSocket URL.
    pub async fn rtm_connect(&self) -> Result<String> {
        let resp: RtmConnectResponse = self.get("rtm.connect", &[]).await?;
        Ok(resp.url)
    }
}

/// Map non-2xx responses to `Error::Http`; 429 carries the rate-limit text.
async fn check_status(method: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 429 {
        return Err(Error::Http {
            status: 429,
            message: RATE_LIMIT_MESSAGE.to_string(),
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Http {
        status: status.as_u16(),
        message: format!(
            "{method}: {status} {}",
            body.chars().take(200).collect::<String>()
        ),
    })
}

/// Unwrap Slack's `{ "ok": bool, "error": "..." }` envelope.
fn decode_response<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let code = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(Error::Api {
            method: method.to_string(),
            code: code.to_string(),
        });
    }
    Ok(serde_json::from_value(value)?)
}

fn message_body(channel: &str, msg: &OutgoingMessage) -> Value {
    let mut body = json!({
        "channel": channel,
        "text": msg.text,
        "as_user": msg.as_user,
        "unfurl_media": msg.unfurl_media,
        "link_names": msg.link_names,
    });
    if !msg.attachments.is_empty() {
        body["attachments"] = Value::Array(msg.attachments.clone());
    }
    if let Some(username) = &msg.username {
        body["username"] = json!(username);
    }
    if let Some(icon_url) = &msg.icon_url {
        body["icon_url"] = json!(icon_url);
    }
    if let Some(icon_emoji) = &msg.icon_emoji {
        body["icon_emoji"] = json!(icon_emoji);
    }
    body
}

// ============== Wire types ==============

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct WireConversation {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_member: bool,
    #[serde(default)]
    user: Option<String>,
}

impl From<WireConversation> for Conversation {
    fn from(c: WireConversation) -> Self {
        Self {
            id: c.id,
            name: c.name,
            is_member: c.is_member,
            user: c.user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    channels: Vec<WireConversation>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    channel: WireConversation,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    name: String,
    #[serde(default)]
    profile: WireUserProfile,
}

#[derive(Debug, Default, Deserialize)]
struct WireUserProfile {
    #[serde(default)]
    image_192: String,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    bot: WireBot,
}

#[derive(Debug, Deserialize)]
struct WireBot {
    name: String,
    #[serde(default)]
    icons: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    file: WireFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireFile {
    id: String,
    name: String,
    title: String,
    filetype: String,
    user: String,
    url_private_download: String,
    permalink: String,
    initial_comment: Option<WireComment>,
    shares: WireShares,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireComment {
    comment: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireShares {
    public: HashMap<String, Vec<FileShare>>,
    private: HashMap<String, Vec<FileShare>>,
}

impl From<WireFile> for FileInfo {
    fn from(f: WireFile) -> Self {
        let mut shares = f.shares.public;
        for (channel, entries) in f.shares.private {
            shares.entry(channel).or_default().extend(entries);
        }
        Self {
            id: f.id,
            name: f.name,
            title: f.title,
            filetype: f.filetype,
            user: f.user,
            initial_comment: f.initial_comment.map(|c| c.comment).unwrap_or_default(),
            url_private_download: f.url_private_download,
            permalink: f.permalink,
            shares,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    channel: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<WireHistoryMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireHistoryMessage {
    user: String,
    bot_id: String,
    text: String,
    ts: String,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

// ============== ChatApi ==============

#[async_trait]
impl ChatApi for SlackClient {
    async fn list_conversations_page(
        &self,
        types: &[ChannelType],
        cursor: Option<&str>,
    ) -> Result<ConversationPage> {
        let types = types
            .iter()
            .filter_map(|t| t.list_param())
            .collect::<Vec<_>>()
            .join(",");
        let mut query = vec![
            ("types", types),
            ("exclude_archived", "true".to_string()),
            ("limit", LIST_PAGE_LIMIT.to_string()),
        ];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", cursor.to_string()));
        }

        let resp: ListResponse = self.get("conversations.list", &query).await?;
        Ok(ConversationPage {
            channels: resp.channels.into_iter().map(Conversation::from).collect(),
            next_cursor: resp.response_metadata.next_cursor,
        })
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<Conversation> {
        let resp: ChannelResponse = self
            .get("conversations.info", &[("channel", channel_id.to_string())])
            .await?;
        Ok(resp.channel.into())
    }

    async fn user_info(&self, user_id: &str) -> Result<Profile> {
        let resp: UserResponse = self
            .get("users.info", &[("user", user_id.to_string())])
            .await?;
        Ok(Profile {
            name: resp.user.name,
            icon_url: Some(resp.user.profile.image_192).filter(|u| !u.is_empty()),
        })
    }

    async fn bot_info(&self, bot_id: &str) -> Result<Profile> {
        let resp: BotResponse = self.get("bots.info", &[("bot", bot_id.to_string())]).await?;
        let icon_url = ["image_72", "image_48", "image_36"]
            .iter()
            .find_map(|k| resp.bot.icons.get(*k).cloned());
        Ok(Profile {
            name: resp.bot.name,
            icon_url,
        })
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo> {
        let resp: FileResponse = self
            .get("files.info", &[("file", file_id.to_string())])
            .await?;
        Ok(resp.file.into())
    }

    async fn post_message(&self, channel: &str, msg: &OutgoingMessage) -> Result<PostedMessage> {
        let resp: PostResponse = self
            .post_json("chat.postMessage", &message_body(channel, msg))
            .await?;
        Ok(PostedMessage {
            channel_id: resp.channel,
            timestamp: resp.ts,
        })
    }

    async fn update_message(
        &self,
        channel_id: &str,
        timestamp: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<()> {
        let body = json!({
            "channel": channel_id,
            "ts": timestamp,
            "text": text,
            "attachments": attachments,
        });
        let _: Empty = self.post_json("chat.update", &body).await?;
        Ok(())
    }

    async fn upload_file(&self, upload: &FileUpload) -> Result<FileInfo> {
        let method = "files.upload";
        let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.filename.clone());
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("filename", upload.filename.clone());
        if !upload.filetype.is_empty() {
            form = form.text("filetype", upload.filetype.clone());
        }
        if !upload.title.is_empty() {
            form = form.text("title", upload.title.clone());
        }
        if !upload.initial_comment.is_empty() {
            form = form.text("initial_comment", upload.initial_comment.clone());
        }

        let req = self
            .http
            .post(self.endpoint(method))
            .bearer_auth(&self.token)
            .multipart(form);
        let resp: FileResponse = self.send(method, req).await?;
        Ok(resp.file.into())
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::External(format!("download request error: {e}")))?;
        let bytes = check_status("download", resp)
            .await?
            .bytes()
            .await
            .map_err(|e| Error::External(format!("download body error: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn join_conversation(&self, channel_id: &str) -> Result<()> {
        let _: Empty = self
            .post_json("conversations.join", &json!({ "channel": channel_id }))
            .await?;
        Ok(())
    }

    async fn create_conversation(&self, name: &str, is_private: bool) -> Result<Conversation> {
        let resp: ChannelResponse = self
            .post_json(
                "conversations.create",
                &json!({ "name": name, "is_private": is_private }),
            )
            .await?;
        Ok(resp.channel.into())
    }

    async fn conversation_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let resp: HistoryResponse = self
            .get(
                "conversations.history",
                &[
                    ("channel", channel_id.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(resp
            .messages
            .into_iter()
            .map(|m| HistoryMessage {
                user: m.user,
                bot_id: m.bot_id,
                text: m.text,
                ts: m.ts,
                attachments: m.attachments,
            })
            .collect())
    }
}
