//! Per-workspace logger handles.
//!
//! Every pipeline logs through a `WorkspaceLogger` so its lines carry the
//! workspace name. With alerts enabled, warnings are also mirrored into the
//! workspace's aggregation channel.

use std::{fmt::Display, sync::Arc};

use crate::{
    config::aggregation_channel_name, domain::OutgoingMessage, ports::ChatApi,
    store::LoggerMap,
};

pub type WorkspaceLoggers = LoggerMap<WorkspaceLogger>;

#[derive(Clone)]
struct AlertSink {
    api: Arc<dyn ChatApi>,
    channel: String,
}

#[derive(Clone)]
pub struct WorkspaceLogger {
    workspace: String,
    alerts: Option<AlertSink>,
}

impl WorkspaceLogger {
    pub fn new(workspace: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            alerts: None,
        }
    }

    /// Mirror warnings into `aggr-<workspace>` on the aggregation workspace.
    pub fn with_alerts(mut self, destination: Arc<dyn ChatApi>) -> Self {
        self.alerts = Some(AlertSink {
            api: destination,
            channel: aggregation_channel_name(&self.workspace),
        });
        self
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn debug(&self, msg: impl Display) {
        tracing::debug!(workspace = %self.workspace, "{msg}");
    }

    pub fn info(&self, msg: impl Display) {
        tracing::info!(workspace = %self.workspace, "{msg}");
    }

    pub fn warn(&self, msg: impl Display) {
        let text = msg.to_string();
        tracing::warn!(workspace = %self.workspace, "{text}");

        let Some(sink) = self.alerts.clone() else {
            return;
        };
        let workspace = self.workspace.clone();
        tokio::spawn(async move {
            let alert = OutgoingMessage {
                text: format!("[warn] {text}"),
                username: Some("aguri".to_string()),
                icon_emoji: Some(":ghost:".to_string()),
                ..Default::default()
            };
            // Plain tracing only: an alert failure must not raise another alert.
            if let Err(e) = sink.api.post_message(&sink.channel, &alert).await {
                tracing::debug!(workspace = %workspace, "failed to post alert: {e}");
            }
        });
    }
}
