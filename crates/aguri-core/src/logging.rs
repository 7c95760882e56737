use crate::{errors::Error, Result};

/// Initialize tracing for the relay.
///
/// Default: debug for our crates, info for everything else. `RUST_LOG` overrides it.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,aguri_core=debug,aguri_slack=debug,{service_name}=debug"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to init logging: {e}")))
}
