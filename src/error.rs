use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("tool `{0}` not found")]
    UnknownTool(String),

    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),

    #[error("invalid arguments for tool `{name}`: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("language model responded with {status}: {body}")]
    ModelStatus { status: u16, body: String },

    #[error("malformed language model response: {0}")]
    MalformedResponse(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("bridge responded with {status}: {body}")]
    Bridge { status: u16, body: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Whether repeating the same external call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::LanguageModel(_) | GatewayError::Timeout { .. } => true,
            GatewayError::ModelStatus { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Http(err) => err.is_timeout() || err.is_connect(),
            GatewayError::Bridge { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
