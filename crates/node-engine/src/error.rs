//! Error types for the node engine

use thiserror::Error;

/// Result type alias using NodeEngineError
pub type Result<T> = std::result::Result<T, NodeEngineError>;

/// Errors that can occur in the node engine
#[derive(Debug, Error)]
pub enum NodeEngineError {
    /// No node type registered under this name
    #[error("Node type not found: {0}")]
    UnknownNodeType(String),

    /// Node configuration could not be decoded or is inconsistent
    #[error("Invalid configuration for '{node_type}': {message}")]
    InvalidConfig { node_type: String, message: String },

    /// Input failed structural checks
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Underlying client could not establish or keep a connection
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Downstream system rejected the requested operation
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Operation did not finish within its budget
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Sandboxed expression failed to evaluate
    #[error("Expression error: {0}")]
    Expression(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeEngineError {
    /// Create a connection error with a message
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an operation error with a message
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create an invalid input error with a message
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(node_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidConfig {
            node_type: node_type.into(),
            message: msg.into(),
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only connection failures qualify; a rejected operation or a timeout
    /// is reported as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
