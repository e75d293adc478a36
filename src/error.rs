use thiserror::Error;

/// Error type for pgexec operations
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Prepare failed: {0}")]
    Prepare(String),

    #[error("Execution failed [{code}]: {message}")]
    Execution { code: String, message: String },

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Staging file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template has {expected} placeholder(s), got {actual} argument(s)")]
    PlaceholderMismatch { expected: usize, actual: usize },

    #[error("Connection is closed")]
    Closed,
}

impl ExecError {
    /// Builds an execution error with no server-provided code.
    pub fn execution(message: impl Into<String>) -> Self {
        ExecError::Execution {
            code: String::new(),
            message: message.into(),
        }
    }
}

/// Result type alias for pgexec operations
pub type Result<T> = std::result::Result<T, ExecError>;
