//! Error types for agent execution

use thiserror::Error;

/// Result type alias for agent client operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while executing a request
#[derive(Debug, Error)]
pub enum AgentError {
    /// Failed to spawn the CLI agent process
    #[error("Failed to spawn agent process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// No output within the startup window
    #[error("Agent produced no output within {seconds}s of startup")]
    StartupTimeout { seconds: u64 },

    /// No output or stderr activity within the idle window
    #[error("Agent produced no output for {seconds}s while running")]
    IdleTimeout { seconds: u64 },

    /// The caller cancelled the operation
    #[error("Execution was cancelled")]
    Cancelled,

    /// The agent process exited with a failing code
    #[error("Agent process exited with code {code:?}: {message}")]
    ProcessFailed { code: Option<i32>, message: String },

    /// Zero exit code but no usable output
    #[error("Agent exited successfully but produced no output")]
    MissingOutput,

    /// Backend quota/usage limit reached
    #[error("Backend usage limit reached: {message}")]
    QuotaExhausted { message: String },

    /// Backend rejected the credential
    #[error("Backend authentication failed: {message}")]
    AuthFailed { message: String },

    /// The streaming backend returned a non-success response
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Transport-level failure while streaming
    #[error("Stream error: {0}")]
    Stream(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a SpawnFailed error
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a SpawnFailed error with source
    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether this error came from caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error came from a watchdog timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StartupTimeout { .. } | Self::IdleTimeout { .. })
    }
}
