//! Engine error types

use thiserror::Error;

/// Errors that can occur in the agent engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Required environment variable is missing or empty
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Voice sample could not be loaded
    #[error("Voice sample error: {0}")]
    VoiceSample(String),

    /// Payload failed schema validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Streaming request was malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Tool execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// Remote call failed
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
        /// Whether retrying the call may succeed
        transient: bool,
    },

    /// Hosting platform failure
    #[error("Platform error: {0}")]
    Platform(String),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a transient transport error
    pub fn transient(msg: impl Into<String>) -> Self {
        EngineError::Transport {
            message: msg.into(),
            transient: true,
        }
    }

    /// Create a permanent transport error
    pub fn permanent(msg: impl Into<String>) -> Self {
        EngineError::Transport {
            message: msg.into(),
            transient: false,
        }
    }

    /// Create a platform error
    pub fn platform(msg: impl Into<String>) -> Self {
        EngineError::Platform(msg.into())
    }

    /// Whether the failed operation may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transport { transient: true, .. })
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .map(|s| s.is_server_error() || s.as_u16() == 429)
                .unwrap_or(false);
        EngineError::Transport {
            message: err.to_string(),
            transient,
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
