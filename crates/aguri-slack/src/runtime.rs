//! Process wiring: one forward pipeline per source workspace plus the reply
//! router on the aggregation workspace.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use aguri_core::{
    alerts::{WorkspaceLogger, WorkspaceLoggers},
    config::{workspace_key, Config},
    relay::{forward::ForwardPipeline, reply::ReplyRouter, run_sweeper, SourceWorkspaces},
    retry::TokioSleeper,
    store::{CorrelationStore, MaxAge},
};

use crate::{client::SlackClient, rtm};

/// How often expired correlation records are swept.
fn sweep_interval(max_age: Duration) -> Duration {
    max_age.clamp(Duration::from_secs(1), Duration::from_secs(60))
}

/// Run until every forward pipeline has stopped.
///
/// The reply router runs detached; it stops with `cancel`.
pub async fn run(cfg: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let destination = Arc::new(SlackClient::new(cfg.destination.token.clone())?);

    let store = Arc::new(match cfg.correlation_max_age {
        Some(age) => CorrelationStore::with_retention(Box::new(MaxAge(age))),
        None => CorrelationStore::new(),
    });
    if let Some(age) = cfg.correlation_max_age {
        tokio::spawn(run_sweeper(
            store.clone(),
            sweep_interval(age),
            cancel.clone(),
        ));
    }

    let loggers = Arc::new(WorkspaceLoggers::new());
    let mut sources = SourceWorkspaces::new();
    let mut pipelines = Vec::with_capacity(cfg.sources.len());
    for cred in &cfg.sources {
        let key = workspace_key(&cred.name);
        let client = Arc::new(SlackClient::new(cred.token.clone())?);

        let mut logger = WorkspaceLogger::new(&key);
        if cfg.alerts_enabled {
            logger = logger.with_alerts(destination.clone());
        }
        let logger = Arc::new(logger);
        loggers.store(&key, logger.clone());
        sources.insert(&key, client.clone());

        let pipeline = ForwardPipeline::new(
            &key,
            client.clone(),
            destination.clone(),
            store.clone(),
            logger,
        )
        .with_upload_retry(cfg.upload_retry, Arc::new(TokioSleeper));
        pipelines.push((pipeline, client));
    }

    let router = ReplyRouter::new(destination.clone(), sources, store, loggers);
    let events = rtm::spawn(destination, "aggregation", cancel.clone());
    tokio::spawn(router.run(events, cancel.clone()));

    let mut tasks = JoinSet::new();
    for (pipeline, client) in pipelines {
        let events = rtm::spawn(client, pipeline.workspace(), cancel.clone());
        tasks.spawn(pipeline.run(events, cancel.clone()));
    }
    tracing::info!(workspaces = tasks.len(), "aguri started");

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("forward pipeline task failed: {e}");
        }
    }
    tracing::info!("all forward pipelines stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_interval_is_bounded() {
        assert_eq!(sweep_interval(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(sweep_interval(Duration::from_secs(30)), Duration::from_secs(30));
        assert_eq!(sweep_interval(Duration::from_secs(86_400)), Duration::from_secs(60));
    }
}
