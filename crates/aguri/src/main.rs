use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use aguri_core::config::Config;

/// Aggregate many Slack workspaces into one.
#[derive(Debug, Parser)]
#[command(name = "aguri", version, about)]
struct Args {
    /// Config file path or http(s) URL.
    #[arg(long, env = "AGURI_CONFIG", default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    aguri_core::logging::init("aguri")?;

    let cfg = Config::load(&args.config)
        .await
        .with_context(|| format!("failed to load config: {}", args.config))?;
    tracing::info!(
        sources = cfg.sources.len(),
        alerts = cfg.alerts_enabled,
        "config loaded"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        }
    });

    aguri_slack::runtime::run(cfg, cancel).await
}
