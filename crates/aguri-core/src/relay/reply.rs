//! Reply router: the single consumer of the aggregation workspace's stream.
//!
//! Root posts in an `aggr-*` channel either run a `\aguri` command (human
//! sender) or get recorded so thread replies can find their way back (the
//! forward pipeline's own posts). Thread replies are posted into the source
//! channel as the source workspace's acting user.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::{WorkspaceLogger, WorkspaceLoggers},
    config::{workspace_from_channel, AGGREGATION_PREFIX},
    directory::Directory,
    domain::{ChannelType, OutgoingMessage, SLACKBOT_USER_ID},
    errors::{Error, ResultExt},
    events::{MessageEvent, RtmEvent},
    formatting::parse_aggregated_username,
    ports::ChatApi,
    relay::{
        commands::{is_command, CommandInterpreter},
        SourceWorkspaces,
    },
    store::CorrelationStore,
    Result,
};

/// Whether a message seen in the aggregation workspace is a relay candidate.
pub fn validate_message(channel_type: ChannelType, channel_name: &str, ev: &MessageEvent) -> bool {
    if !channel_name.starts_with(AGGREGATION_PREFIX) {
        return false;
    }
    if ev.user == SLACKBOT_USER_ID {
        return false;
    }
    if ev.text.is_empty() {
        return false;
    }
    matches!(channel_type, ChannelType::Channel | ChannelType::Group)
}

pub struct ReplyRouter {
    destination: Directory,
    sources: SourceWorkspaces,
    store: Arc<CorrelationStore>,
    loggers: Arc<WorkspaceLoggers>,
    commands: CommandInterpreter,
}

impl ReplyRouter {
    pub fn new(
        destination: Arc<dyn ChatApi>,
        sources: SourceWorkspaces,
        store: Arc<CorrelationStore>,
        loggers: Arc<WorkspaceLoggers>,
    ) -> Self {
        Self {
            commands: CommandInterpreter::new(destination.clone(), sources.clone()),
            destination: Directory::new(destination),
            sources,
            store,
            loggers,
        }
    }

    fn logger(&self, workspace: &str) -> Arc<WorkspaceLogger> {
        self.loggers
            .load(workspace)
            .unwrap_or_else(|| Arc::new(WorkspaceLogger::new(workspace)))
    }

    /// Route events until `cancel` fires or the stream closes.
    pub async fn run(self, mut events: mpsc::Receiver<RtmEvent>, cancel: CancellationToken) {
        tracing::info!("reply router started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("reply router cancelled");
                    return;
                }
                ev = events.recv() => match ev {
                    Some(ev) => {
                        if let Err(e) = self.handle_event(ev).await {
                            if e.is_expected() {
                                tracing::debug!("{e}");
                            } else {
                                tracing::warn!("{e}");
                            }
                        }
                    }
                    None => {
                        tracing::warn!("aggregation event stream closed, reply router stopped");
                        return;
                    }
                },
            }
        }
    }

    pub async fn handle_event(&self, ev: RtmEvent) -> Result<()> {
        match ev {
            RtmEvent::Message(msg) => self.handle_message(&msg).await,
            RtmEvent::RtmError(e) => Err(Error::External(format!("detect rtm error: {e}"))),
            _ => Ok(()),
        }
    }

    async fn handle_message(&self, ev: &MessageEvent) -> Result<()> {
        let (channel_type, channel_name) = self
            .destination
            .resolve_channel(&ev.channel, &ev.user, &ev.subtype)
            .await
            .context("failed to convert display channel name")?;
        if !validate_message(channel_type, &channel_name, ev) {
            return Ok(());
        }
        let Some(workspace) = workspace_from_channel(&channel_name) else {
            return Ok(());
        };

        if ev.thread_ts.is_empty() {
            self.handle_root_post(ev, workspace).await;
            Ok(())
        } else {
            self.handle_thread_reply(ev, workspace)
                .await
                .context("failed to handle reply message")
        }
    }

    async fn handle_root_post(&self, ev: &MessageEvent, workspace: &str) {
        let logger = self.logger(workspace);

        if !ev.user.is_empty() {
            if is_command(&ev.text) {
                if let Err(e) = self.commands.execute(workspace, &ev.text).await {
                    logger.warn(e);
                }
            }
            return;
        }

        // Alert posts land here too; reporting them above debug would echo forever.
        match self.record_forwarded(ev, workspace) {
            Err(e) if e.is_expected() => logger.debug(e),
            Err(e) => logger.warn(e),
            Ok(()) => {}
        }
    }

    /// Remember a forwarded root post so replies under it can be routed.
    fn record_forwarded(&self, ev: &MessageEvent, workspace: &str) -> Result<()> {
        if ev.username.is_empty() {
            return Err(Error::UsernameNotFound);
        }
        let parsed = parse_aggregated_username(&ev.username)
            .ok_or_else(|| Error::UnparsableUsername(ev.username.clone()))?;

        self.store.put(
            workspace,
            &ev.ts,
            &parsed.channel_name,
            &ev.text,
            &ev.channel,
            &ev.ts,
        );
        Ok(())
    }

    async fn handle_thread_reply(&self, ev: &MessageEvent, workspace: &str) -> Result<()> {
        let record = self
            .store
            .get(workspace, &ev.thread_ts)
            .context("failed to get stored slack log")?;
        let source = self.sources.get(workspace)?;

        source
            .post_message(
                &record.source_channel_name,
                &OutgoingMessage::as_user(ev.text.clone()),
            )
            .await
            .context("failed to post message")?;
        Ok(())
    }
}
