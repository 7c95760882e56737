//! The relay itself: forward pipelines (source -> aggregation), the reply
//! router (aggregation -> source) and the `\aguri` command interpreter.

pub mod commands;
pub mod forward;
pub mod reply;
pub mod upload;

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::workspace_key, errors::Error, ports::ChatApi, store::CorrelationStore, Result,
};

/// Source-workspace API clients, keyed by lowercased workspace name.
#[derive(Clone, Default)]
pub struct SourceWorkspaces {
    apis: HashMap<String, Arc<dyn ChatApi>>,
}

impl SourceWorkspaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, workspace: &str, api: Arc<dyn ChatApi>) {
        self.apis.insert(workspace_key(workspace), api);
    }

    pub fn get(&self, workspace: &str) -> Result<Arc<dyn ChatApi>> {
        self.apis
            .get(&workspace_key(workspace))
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown source workspace: {workspace}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apis.keys().map(String::as_str)
    }
}

/// Periodically apply the store's retention policy until cancelled.
pub async fn run_sweeper(store: Arc<CorrelationStore>, every: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tick.tick() => {
                let dropped = store.sweep(Utc::now());
                if dropped > 0 {
                    tracing::debug!(dropped, remaining = store.len(), "correlation sweep");
                }
            }
        }
    }
}
