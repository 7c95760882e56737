/// Core error type for the relay.
///
/// Adapter crates map vendor failures into this type so the pipelines can
/// decide uniformly what is fatal, what is retryable and what is only logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The chat API answered `ok: false` with an error code.
    #[error("{method}: {code}")]
    Api { method: String, code: String },

    /// Non-2xx HTTP response from the chat API or a file host.
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("external error: {0}")]
    External(String),

    #[error("log not found (workspace: {workspace}, timestamp: {timestamp})")]
    LogNotFound {
        workspace: String,
        timestamp: String,
    },

    #[error("detected link expand, but attachment is not found")]
    AttachmentNotFound,

    /// A bot root post in an aggregation channel without a username.
    #[error("Username is not found")]
    UsernameNotFound,

    /// A bot root post whose username is not `user@c:channel`.
    #[error("failed to validate message: {0}")]
    UnparsableUsername(String),

    #[error("channel is not found: {0}")]
    ChannelNotFound(String),

    /// Malformed command invocation; the payload is the literal usage string.
    #[error("{0}")]
    Usage(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap `self` with operation context, keeping it as the source.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error of a `Context` chain.
    pub fn root(&self) -> &Error {
        let mut cur = self;
        while let Error::Context { source, .. } = cur {
            cur = source;
        }
        cur
    }

    pub fn is_http_status(&self, status: u16) -> bool {
        match self.root() {
            Error::Http { status: s, .. } => *s == status,
            _ => false,
        }
    }

    pub fn is_api_error(&self, code: &str) -> bool {
        match self.root() {
            Error::Api { code: c, .. } => c == code,
            _ => false,
        }
    }

    /// Conditions that are part of normal operation and never reported above debug.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.root(),
            Error::AttachmentNotFound | Error::UsernameNotFound | Error::UnparsableUsername(_)
        )
    }
}

/// `.context(..)` for results, mirroring the `anyhow` idiom on the typed error.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
