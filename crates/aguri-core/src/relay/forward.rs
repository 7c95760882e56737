//! Forward pipeline: one per source workspace.
//!
//! Consumes the workspace's event stream in arrival order, classifies each
//! event and forwards it into `aggr-<workspace>`. A failure while handling one
//! event is logged and the pipeline moves on; only stream closure or
//! cancellation ends it.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::WorkspaceLogger,
    config::aggregation_channel_name,
    directory::Directory,
    domain::{Attachment, FileUpload, OutgoingMessage, PostedMessage},
    errors::{Error, ResultExt},
    events::{
        is_rate_limit_error, FileSharedEvent, MessageEvent, RtmEvent, SubMessage,
        SUBTYPE_MESSAGE_CHANGED, SUBTYPE_MESSAGE_DELETED,
    },
    formatting::{
        aggregated_username, deleted_text, edited_text, mentioned_user_ids, replace_mentions,
    },
    ports::ChatApi,
    relay::upload::upload_file_with_retry,
    retry::{RetryPolicy, Sleeper, TokioSleeper},
    store::CorrelationStore,
    Result,
};

/// Presentation of a forwarded post.
#[derive(Clone, Debug)]
struct PostContext {
    username: String,
    icon_url: Option<String>,
    source_channel_name: String,
}

pub struct ForwardPipeline {
    workspace: String,
    source: Directory,
    destination: Directory,
    store: Arc<CorrelationStore>,
    logger: Arc<WorkspaceLogger>,
    upload_retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    last_timestamp: Option<String>,
}

impl ForwardPipeline {
    pub fn new(
        workspace: &str,
        source: Arc<dyn ChatApi>,
        destination: Arc<dyn ChatApi>,
        store: Arc<CorrelationStore>,
        logger: Arc<WorkspaceLogger>,
    ) -> Self {
        Self {
            workspace: workspace.to_string(),
            source: Directory::new(source),
            destination: Directory::new(destination),
            store,
            logger,
            upload_retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            last_timestamp: None,
        }
    }

    pub fn with_upload_retry(mut self, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        self.upload_retry = policy;
        self.sleeper = sleeper;
        self
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    fn aggregation_channel(&self) -> String {
        aggregation_channel_name(&self.workspace)
    }

    /// Process events until the stream closes or `cancel` fires.
    pub async fn run(mut self, mut events: mpsc::Receiver<RtmEvent>, cancel: CancellationToken) {
        self.logger.info("forward pipeline started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.logger.info("forward pipeline cancelled");
                    return;
                }
                ev = events.recv() => match ev {
                    Some(ev) => self.handle_event(ev).await,
                    None => {
                        self.logger.warn("event stream closed, forward pipeline stopped");
                        return;
                    }
                },
            }
        }
    }

    pub async fn handle_event(&mut self, ev: RtmEvent) {
        if let Some(ts) = ev.dedup_timestamp().filter(|ts| !ts.is_empty()) {
            if self.last_timestamp.as_deref() == Some(ts) {
                self.logger.debug(format!("duplicate delivery dropped (ts: {ts})"));
                return;
            }
            self.last_timestamp = Some(ts.to_string());
        }

        match ev {
            RtmEvent::Connected => self.logger.info("connected"),
            RtmEvent::Message(msg) => {
                if let Err(e) = self.handle_message(&msg).await {
                    self.report(e);
                }
            }
            RtmEvent::FileShared(shared) => {
                if let Err(e) = self.handle_file_shared(&shared).await {
                    self.report(e);
                }
            }
            RtmEvent::RtmError(e) => self.logger.info(format!("RTM Error: {e}")),
            RtmEvent::ConnectionError(text) => {
                if !is_rate_limit_error(&text) {
                    self.logger
                        .warn(format!("Unexpected Event Type: connection_error, Data: {text}"));
                }
            }
            RtmEvent::NotImplemented { kind, raw } => self
                .logger
                .debug(format!("Not Implement Event Type: {kind}, Data: {raw}")),
            RtmEvent::Ignored { .. } => {}
            RtmEvent::Unexpected { kind, raw } => self
                .logger
                .warn(format!("Unexpected Event Type: {kind}, Data: {raw}")),
        }
    }

    fn report(&self, e: Error) {
        if e.is_expected() {
            self.logger.debug(e);
        } else {
            self.logger.warn(e);
        }
    }

    // ============== Messages ==============

    async fn handle_message(&self, ev: &MessageEvent) -> Result<()> {
        match ev.subtype.as_str() {
            SUBTYPE_MESSAGE_CHANGED => {
                let edited = ev.edited();
                if edited.attachments.is_empty() {
                    self.handle_text_edit(ev, &edited).await
                } else {
                    self.handle_link_expand(&edited).await
                }
            }
            SUBTYPE_MESSAGE_DELETED => self.handle_deleted(ev).await,
            _ => self.handle_new(ev).await,
        }
    }

    async fn handle_new(&self, ev: &MessageEvent) -> Result<()> {
        let ctx = self.post_context(ev).await?;
        let text = self.rewrite_mentions(&ev.text).await;

        if let Some(posted) = self.deliver(&ctx, &text, &ev.attachments).await? {
            self.store.put(
                &self.workspace,
                &ev.ts,
                &ctx.source_channel_name,
                &text,
                &posted.channel_id,
                &posted.timestamp,
            );
        }
        Ok(())
    }

    async fn handle_text_edit(&self, ev: &MessageEvent, edited: &SubMessage) -> Result<()> {
        let prior = self
            .store
            .get(&self.workspace, &edited.ts)
            .context("failed to get slack log from memory")?;

        let ctx = self.post_context(ev).await?;
        let new_text = self.rewrite_mentions(&edited.text).await;
        self.deliver(&ctx, &edited_text(&prior.body, &new_text), &[])
            .await?;

        // The forwarded copy stays the delivery target for later unfurls.
        self.store.put(
            &self.workspace,
            &edited.ts,
            &prior.source_channel_name,
            &new_text,
            &prior.destination_channel_id,
            &prior.destination_timestamp,
        );
        Ok(())
    }

    async fn handle_link_expand(&self, edited: &SubMessage) -> Result<()> {
        let prior = self
            .store
            .get(&self.workspace, &edited.ts)
            .context("failed to get slack log from memory")?;

        if edited.attachments.is_empty() {
            return Err(Error::AttachmentNotFound);
        }
        if prior.destination_channel_id.is_empty() || prior.destination_timestamp.is_empty() {
            return Err(Error::External(format!(
                "no forwarded copy to update (ts: {})",
                edited.ts
            )));
        }

        self.destination
            .api()
            .update_message(
                &prior.destination_channel_id,
                &prior.destination_timestamp,
                &prior.body,
                &edited.attachments,
            )
            .await
            .context("failed to update message")
    }

    async fn handle_deleted(&self, ev: &MessageEvent) -> Result<()> {
        let prior = self
            .store
            .get(&self.workspace, &ev.deleted_ts)
            .context("failed to get slack log from memory")?;

        let ctx = self.post_context(ev).await?;
        self.deliver(&ctx, &deleted_text(&prior.body), &[])
            .await
            .context("failed to post message")?;
        Ok(())
    }

    // ============== Files ==============

    async fn handle_file_shared(&self, ev: &FileSharedEvent) -> Result<()> {
        let file = self
            .source
            .api()
            .file_info(&ev.file_id)
            .await
            .with_context(|| format!("failed to get file info ({})", ev.file_id))?;

        // Never leak files from channels this workspace's token has not joined.
        if !self.source.is_joined(&ev.channel_id).await? {
            self.logger.debug(format!(
                "file {} shared in unjoined channel {}, skipped",
                ev.file_id, ev.channel_id
            ));
            return Ok(());
        }

        let bytes = self
            .source
            .api()
            .download_file(&file.url_private_download)
            .await
            .context("failed to download file")?;

        let uploaded = upload_file_with_retry(
            self.destination.api().as_ref(),
            &FileUpload::from_original(bytes, &file),
            self.upload_retry,
            self.sleeper.as_ref(),
        )
        .await
        .context("failed to upload file with retry")?;

        let identity = self.source.resolve_user(&file.user).await?;
        let (channel_type, channel_name) = self
            .source
            .resolve_channel(&ev.channel_id, &file.user, "")
            .await?;
        let share = file.newest_share(&ev.channel_id).ok_or_else(|| {
            Error::External(format!(
                "failed to get shared info from file {} in {}",
                file.id, ev.channel_id
            ))
        })?;

        let ctx = PostContext {
            username: aggregated_username(
                &identity.display_name,
                channel_type,
                &channel_name,
                !share.thread_ts.is_empty(),
            ),
            icon_url: identity.icon_url,
            source_channel_name: channel_name,
        };
        let attachments = vec![serde_json::json!({ "text": uploaded.permalink })];

        if let Some(posted) = self
            .deliver(&ctx, "", &attachments)
            .await
            .context("failed to post uploaded file")?
        {
            self.store.put(
                &self.workspace,
                &ev.event_ts,
                &ctx.source_channel_name,
                &uploaded.permalink,
                &posted.channel_id,
                &posted.timestamp,
            );
        }
        Ok(())
    }

    // ============== Delivery ==============

    async fn post_context(&self, ev: &MessageEvent) -> Result<PostContext> {
        let identity = self
            .source
            .resolve_sender(&ev.bot_id, &ev.user, &ev.subtype)
            .await
            .context("failed to get user info")?;
        let (channel_type, channel_name) = self
            .source
            .resolve_channel(&ev.channel, &ev.user, &ev.subtype)
            .await
            .context("failed to convert channel name")?;

        Ok(PostContext {
            username: aggregated_username(
                &identity.display_name,
                channel_type,
                &channel_name,
                ev.is_in_thread(),
            ),
            icon_url: identity.icon_url,
            source_channel_name: channel_name,
        })
    }

    /// Replace `<@U…>` tokens with display names. Unresolvable ids stay as-is.
    async fn rewrite_mentions(&self, text: &str) -> String {
        let ids = mentioned_user_ids(text);
        if ids.is_empty() {
            return text.to_string();
        }

        let mut names = HashMap::new();
        for id in ids {
            match self.source.resolve_user(&id).await {
                Ok(identity) => {
                    names.insert(id, identity.display_name);
                }
                Err(e) => self.logger.debug(format!("mention not resolved: {e}")),
            }
        }
        replace_mentions(text, &names)
    }

    /// Post `text` (if any) and then every attachment as its own message into
    /// the aggregation channel. Returns the last post.
    ///
    /// Attachment-only posts cover bot integrations that send no text.
    async fn deliver(
        &self,
        ctx: &PostContext,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<Option<PostedMessage>> {
        let channel = self.aggregation_channel();
        self.destination
            .find_channel(&channel)
            .await
            .context("failed to get info of exist channel")?;

        let base = OutgoingMessage {
            username: Some(ctx.username.clone()),
            icon_url: ctx.icon_url.clone(),
            unfurl_media: true,
            link_names: true,
            ..Default::default()
        };

        let mut last = None;
        if !text.is_empty() {
            let msg = OutgoingMessage {
                text: text.to_string(),
                ..base.clone()
            };
            let posted = self
                .destination
                .api()
                .post_message(&channel, &msg)
                .await
                .context("failed to post message")?;
            last = Some(posted);
        }
        for attachment in attachments {
            let msg = OutgoingMessage {
                attachments: vec![attachment.clone()],
                ..base.clone()
            };
            let posted = self
                .destination
                .api()
                .post_message(&channel, &msg)
                .await
                .context("failed to post attachment")?;
            last = Some(posted);
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        domain::{FileInfo, FileShare},
        retry::testing::RecordingSleeper,
        testing::FakeChatApi,
    };

    struct Harness {
        pipeline: ForwardPipeline,
        source: Arc<FakeChatApi>,
        dest: Arc<FakeChatApi>,
        store: Arc<CorrelationStore>,
    }

    fn harness_with(source: FakeChatApi) -> Harness {
        let source = Arc::new(source);
        let dest = Arc::new(FakeChatApi::new().with_channel("CAGGR", "aggr-alpha", true));
        let store = Arc::new(CorrelationStore::new());
        let pipeline = ForwardPipeline::new(
            "alpha",
            source.clone(),
            dest.clone(),
            store.clone(),
            Arc::new(WorkspaceLogger::new("alpha")),
        )
        .with_upload_retry(RetryPolicy::default(), Arc::new(RecordingSleeper::default()));
        Harness {
            pipeline,
            source,
            dest,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakeChatApi::new()
                .with_channel("C1", "general", true)
                .with_user("U1", "alice")
                .with_user("U2", "bob"),
        )
    }

    fn message(ts: &str, text: &str) -> MessageEvent {
        MessageEvent {
            channel: "C1".to_string(),
            user: "U1".to_string(),
            text: text.to_string(),
            ts: ts.to_string(),
            ..Default::default()
        }
    }

    fn edit(outer_ts: &str, original_ts: &str, text: &str, attachments: usize) -> MessageEvent {
        MessageEvent {
            channel: "C1".to_string(),
            ts: outer_ts.to_string(),
            subtype: SUBTYPE_MESSAGE_CHANGED.to_string(),
            message: Some(SubMessage {
                ts: original_ts.to_string(),
                text: text.to_string(),
                user: "U1".to_string(),
                attachments: (0..attachments)
                    .map(|i| serde_json::json!({ "title": format!("preview {i}") }))
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn new_message_is_forwarded_and_recorded() {
        let mut h = harness();
        h.pipeline
            .handle_event(RtmEvent::Message(message("100.001", "hello")))
            .await;

        let posts = h.dest.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "aggr-alpha");
        assert_eq!(posts[0].1.text, "hello");
        assert_eq!(posts[0].1.username.as_deref(), Some("alice@c:general"));
        assert!(posts[0].1.icon_url.is_some());

        let rec = h.store.get("alpha", "100.001").unwrap();
        assert_eq!(rec.body, "hello");
        assert_eq!(rec.source_channel_name, "general");
        assert_eq!(rec.destination_channel_id, "CAGGR");
        assert_eq!(rec.destination_timestamp, "900.001");
    }

    #[tokio::test]
    async fn duplicate_timestamp_is_dropped() {
        let mut h = harness();
        h.pipeline
            .handle_event(RtmEvent::Message(message("100.001", "hello")))
            .await;
        h.pipeline
            .handle_event(RtmEvent::Message(message("100.001", "hello")))
            .await;
        assert_eq!(h.dest.post_count(), 1);

        h.pipeline
            .handle_event(RtmEvent::Message(message("100.002", "again")))
            .await;
        assert_eq!(h.dest.post_count(), 2);
    }

    #[tokio::test]
    async fn mentions_are_rewritten_to_display_names() {
        let mut h = harness();
        h.pipeline
            .handle_event(RtmEvent::Message(message("1.0", "ping <@U2> and <@U404>")))
            .await;
        assert_eq!(h.dest.posts()[0].1.text, "ping @bob and <@U404>");
    }

    #[tokio::test]
    async fn thread_messages_are_marked_in_username() {
        let mut h = harness();
        let mut ev = message("2.0", "in thread");
        ev.thread_ts = "1.0".to_string();
        h.pipeline.handle_event(RtmEvent::Message(ev)).await;
        assert_eq!(
            h.dest.posts()[0].1.username.as_deref(),
            Some("alice@c:general (in Thread)")
        );
    }

    #[tokio::test]
    async fn bot_attachments_are_posted_one_by_one() {
        let mut h = harness_with(
            FakeChatApi::new()
                .with_channel("C1", "general", true)
                .with_bot("B9", "feedbot"),
        );
        let ev = MessageEvent {
            channel: "C1".to_string(),
            bot_id: "B9".to_string(),
            subtype: "bot_message".to_string(),
            ts: "3.0".to_string(),
            attachments: vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})],
            ..Default::default()
        };
        h.pipeline.handle_event(RtmEvent::Message(ev)).await;

        let posts = h.dest.posts();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|(_, m)| m.text.is_empty() && m.attachments.len() == 1));
        assert_eq!(posts[0].1.username.as_deref(), Some("feedbot@c:general"));
        assert_eq!(h.store.get("alpha", "3.0").unwrap().destination_timestamp, "900.002");
    }

    #[tokio::test]
    async fn missing_aggregation_channel_posts_nothing() {
        let source = Arc::new(
            FakeChatApi::new()
                .with_channel("C1", "general", true)
                .with_user("U1", "alice"),
        );
        let dest = Arc::new(FakeChatApi::new());
        let store = Arc::new(CorrelationStore::new());
        let mut pipeline = ForwardPipeline::new(
            "alpha",
            source,
            dest.clone(),
            store.clone(),
            Arc::new(WorkspaceLogger::new("alpha")),
        );
        pipeline
            .handle_event(RtmEvent::Message(message("1.0", "hi")))
            .await;
        assert_eq!(dest.post_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_edits_post_twice_and_keep_latest_body() {
        let mut h = harness();
        h.pipeline
            .handle_event(RtmEvent::Message(message("100.001", "hello")))
            .await;

        h.pipeline
            .handle_event(RtmEvent::Message(edit("101.0", "100.001", "hello!", 0)))
            .await;
        h.pipeline
            .handle_event(RtmEvent::Message(edit("102.0", "100.001", "hello!", 0)))
            .await;

        let posts = h.dest.posts();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[1].1.text, "Edited From:\nhello\n\nEdited To:\nhello!");
        assert_eq!(posts[2].1.text, "Edited From:\nhello!\n\nEdited To:\nhello!");
        assert_eq!(
            posts[1].1.username.as_deref(),
            Some("message_changed@c:general")
        );

        let rec = h.store.get("alpha", "100.001").unwrap();
        assert_eq!(rec.body, "hello!");
        assert_eq!(rec.destination_timestamp, "900.001");
    }

    #[tokio::test]
    async fn edit_of_unknown_message_is_recoverable() {
        let mut h = harness();
        h.pipeline
            .handle_event(RtmEvent::Message(edit("101.0", "100.001", "x", 0)))
            .await;
        assert_eq!(h.dest.post_count(), 0);

        // The pipeline keeps working afterwards.
        h.pipeline
            .handle_event(RtmEvent::Message(message("102.0", "next")))
            .await;
        assert_eq!(h.dest.post_count(), 1);
    }

    #[tokio::test]
    async fn link_expand_updates_forwarded_copy_in_place() {
        let mut h = harness();
        h.pipeline
            .handle_event(RtmEvent::Message(message("100.001", "see https://x.y")))
            .await;
        h.pipeline
            .handle_event(RtmEvent::Message(edit("101.0", "100.001", "see https://x.y", 1)))
            .await;

        assert_eq!(h.dest.post_count(), 1);
        let updates = h.dest.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "CAGGR");
        assert_eq!(updates[0].1, "900.001");
        assert_eq!(updates[0].2, "see https://x.y");
        assert_eq!(updates[0].3.len(), 1);
    }

    #[tokio::test]
    async fn deleted_message_posts_original_text() {
        let mut h = harness();
        h.pipeline
            .handle_event(RtmEvent::Message(message("100.001", "oops")))
            .await;
        let ev = MessageEvent {
            channel: "C1".to_string(),
            ts: "105.0".to_string(),
            subtype: SUBTYPE_MESSAGE_DELETED.to_string(),
            deleted_ts: "100.001".to_string(),
            ..Default::default()
        };
        h.pipeline.handle_event(RtmEvent::Message(ev)).await;

        let posts = h.dest.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].1.text, "Original Text:\noops");
    }

    fn shared_file_source(joined: bool) -> FakeChatApi {
        let mut source = FakeChatApi::new()
            .with_channel("C1", "general", joined)
            .with_user("U1", "alice");
        source.files.insert(
            "F1".to_string(),
            FileInfo {
                id: "F1".to_string(),
                name: "cat.png".to_string(),
                user: "U1".to_string(),
                url_private_download: "https://files.source/cat.png".to_string(),
                shares: HashMap::from([(
                    "C1".to_string(),
                    vec![FileShare {
                        ts: "50.0".to_string(),
                        thread_ts: String::new(),
                    }],
                )]),
                ..Default::default()
            },
        );
        source
            .downloads
            .insert("https://files.source/cat.png".to_string(), b"meow".to_vec());
        source
    }

    fn file_event() -> RtmEvent {
        RtmEvent::FileShared(FileSharedEvent {
            file_id: "F1".to_string(),
            user_id: "U1".to_string(),
            channel_id: "C1".to_string(),
            event_ts: "50.1".to_string(),
        })
    }

    #[tokio::test]
    async fn shared_file_is_reuploaded_and_linked() {
        let mut h = harness_with(shared_file_source(true));
        h.pipeline.handle_event(file_event()).await;

        assert_eq!(*h.dest.upload_calls.lock().unwrap(), 1);
        let posts = h.dest.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1.username.as_deref(), Some("alice@c:general"));
        assert_eq!(
            posts[0].1.attachments[0]["text"],
            "https://files.example/cat.png"
        );
        assert!(h.store.get("alpha", "50.1").is_ok());
        assert_eq!(*h.source.list_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn file_from_unjoined_channel_is_skipped() {
        let mut h = harness_with(shared_file_source(false));
        h.pipeline.handle_event(file_event()).await;

        assert_eq!(*h.dest.upload_calls.lock().unwrap(), 0);
        assert_eq!(h.dest.post_count(), 0);
    }

    #[tokio::test]
    async fn failed_upload_does_not_post() {
        let h = harness_with(shared_file_source(true));
        h.dest
            .upload_results
            .lock()
            .unwrap()
            .push_back(Err(Error::Http {
                status: 413,
                message: "too large".to_string(),
            }));
        let mut pipeline = h.pipeline;
        pipeline.handle_event(file_event()).await;

        assert_eq!(*h.dest.upload_calls.lock().unwrap(), 1);
        assert_eq!(h.dest.post_count(), 0);
    }

    #[tokio::test]
    async fn non_message_events_never_post() {
        let mut h = harness();
        for ev in [
            RtmEvent::Connected,
            RtmEvent::RtmError("boom".to_string()),
            RtmEvent::ConnectionError("slack rate limit exceeded".to_string()),
            RtmEvent::ConnectionError("dial tcp: timeout".to_string()),
            RtmEvent::NotImplemented {
                kind: "reaction_added".to_string(),
                raw: "{}".to_string(),
            },
            RtmEvent::Ignored {
                kind: "hello".to_string(),
            },
            RtmEvent::Unexpected {
                kind: "mystery".to_string(),
                raw: "{}".to_string(),
            },
        ] {
            h.pipeline.handle_event(ev).await;
        }
        assert_eq!(h.dest.post_count(), 0);
    }

    #[tokio::test]
    async fn only_non_rate_limit_connection_errors_raise_alerts() {
        let source = Arc::new(FakeChatApi::new().with_channel("C1", "general", true));
        let dest = Arc::new(FakeChatApi::new().with_channel("CAGGR", "aggr-alpha", true));
        let mut pipeline = ForwardPipeline::new(
            "alpha",
            source,
            dest.clone(),
            Arc::new(CorrelationStore::new()),
            Arc::new(WorkspaceLogger::new("alpha").with_alerts(dest.clone())),
        );

        pipeline
            .handle_event(RtmEvent::ConnectionError(
                "slack Rate Limit Exceeded".to_string(),
            ))
            .await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(dest.post_count(), 0);

        pipeline
            .handle_event(RtmEvent::ConnectionError("dial tcp: timeout".to_string()))
            .await;
        for _ in 0..100 {
            if dest.post_count() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let posts = dest.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "aggr-alpha");
        assert_eq!(
            posts[0].1.text,
            "[warn] Unexpected Event Type: connection_error, Data: dial tcp: timeout"
        );
    }

    #[tokio::test]
    async fn run_stops_on_cancel_and_on_stream_close() {
        let h = harness();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        tx.send(RtmEvent::Message(message("1.0", "hi"))).await.unwrap();

        let task = tokio::spawn(h.pipeline.run(rx, cancel.clone()));
        for _ in 0..50 {
            if h.dest.post_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(h.dest.post_count(), 1);
        drop(tx);

        let h = harness();
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        h.pipeline.run(rx, CancellationToken::new()).await;
    }
}
