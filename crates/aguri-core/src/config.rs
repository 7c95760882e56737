use std::{collections::BTreeMap, fmt, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{errors::Error, retry::RetryPolicy, Result};

/// Channel name prefix in the aggregation workspace. Doubles as the routing key
/// for replies: `aggr-<workspace>` maps back to the source workspace.
pub const AGGREGATION_PREFIX: &str = "aggr-";

/// Normalized workspace key (store keys, registry lookups, channel suffix).
pub fn workspace_key(name: &str) -> String {
    name.to_lowercase()
}

/// `aggr-<lowercased workspace name>`.
pub fn aggregation_channel_name(workspace: &str) -> String {
    format!("{AGGREGATION_PREFIX}{}", workspace_key(workspace))
}

/// Recover the workspace key from an aggregation channel name.
pub fn workspace_from_channel(channel_name: &str) -> Option<&str> {
    channel_name
        .strip_prefix(AGGREGATION_PREFIX)
        .filter(|ws| !ws.is_empty())
}

/// Name + API token of one workspace. Immutable for the process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkspaceCredential {
    pub name: String,
    pub token: String,
}

impl fmt::Debug for WorkspaceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceCredential")
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Typed configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub destination: WorkspaceCredential,
    /// Source workspaces, ordered by name.
    pub sources: Vec<WorkspaceCredential>,

    /// Mirror warnings into the workspace's aggregation channel.
    pub alerts_enabled: bool,
    pub upload_retry: RetryPolicy,
    /// `None` keeps correlation records forever.
    pub correlation_max_age: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    to: RawCredential,
    #[serde(default)]
    from: BTreeMap<String, RawCredential>,
    #[serde(default)]
    alerts: RawAlerts,
    #[serde(default)]
    upload: RawUpload,
    #[serde(default)]
    store: RawStore,
}

#[derive(Debug, Deserialize)]
struct RawCredential {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAlerts {
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpload {
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStore {
    max_age_secs: Option<u64>,
}

impl Config {
    /// Load from a local path or an `http(s)://` URL.
    pub async fn load(location: &str) -> Result<Self> {
        let text = fetch(location)
            .await
            .map_err(|e| e.context(format!("failed to load config from {location}")))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)
            .map_err(|e| Error::from(e).context("failed to unmarshal toml config"))?;

        if raw.to.token.trim().is_empty() {
            return Err(Error::Config("to.token is required".to_string()));
        }
        if raw.from.is_empty() {
            return Err(Error::Config(
                "at least one [from.<name>] workspace is required".to_string(),
            ));
        }

        let mut sources: Vec<WorkspaceCredential> = Vec::with_capacity(raw.from.len());
        for (name, cred) in raw.from {
            if cred.token.trim().is_empty() {
                return Err(Error::Config(format!("from.{name}.token is empty")));
            }
            if let Some(other) = sources
                .iter()
                .find(|s| workspace_key(&s.name) == workspace_key(&name))
            {
                return Err(Error::Config(format!(
                    "workspace names collide after lowercasing: {} / {name}",
                    other.name
                )));
            }
            sources.push(WorkspaceCredential {
                name,
                token: cred.token,
            });
        }

        let defaults = RetryPolicy::default();
        let upload_retry = RetryPolicy {
            max_attempts: raw.upload.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            delay: raw
                .upload
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        };

        Ok(Self {
            destination: WorkspaceCredential {
                name: "to".to_string(),
                token: raw.to.token,
            },
            sources,
            alerts_enabled: raw.alerts.enabled,
            upload_retry,
            correlation_max_age: raw.store.max_age_secs.map(Duration::from_secs),
        })
    }

    pub fn source(&self, workspace: &str) -> Option<&WorkspaceCredential> {
        let key = workspace_key(workspace);
        self.sources.iter().find(|s| workspace_key(&s.name) == key)
    }
}

async fn fetch(location: &str) -> Result<String> {
    match Url::parse(location) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => fetch_http(u).await,
        Ok(u) if u.scheme() == "file" => read_file(Path::new(u.path())).await,
        // Relative paths and Windows drive letters land here.
        _ => read_file(Path::new(location)).await,
    }
}

async fn read_file(path: &Path) -> Result<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

async fn fetch_http(u: Url) -> Result<String> {
    let resp = reqwest::get(u.clone())
        .await
        .map_err(|e| Error::External(format!("failed to get config via HTTP(S): {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            message: format!("GET {u}"),
        });
    }

    resp.text()
        .await
        .map_err(|e| Error::External(format!("failed to read config body: {e}")))
}
