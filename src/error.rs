//! WolfAdmin Error Types

use thiserror::Error;

/// Result type alias for WolfAdmin operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfAdmin error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Local node errors
    #[error("Server not initialized")]
    NotInitialized,

    #[error("Config not present")]
    ConfigAbsent,

    // Quorum errors
    #[error("Insufficient read quorum")]
    InsufficientReadQuorum,

    #[error("Insufficient write quorum")]
    InsufficientWriteQuorum,

    // Config document errors
    #[error("Failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Message serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Check if this error is one of the quorum failures
    pub fn is_quorum_error(&self) -> bool {
        matches!(
            self,
            Error::InsufficientReadQuorum | Error::InsufficientWriteQuorum
        )
    }

    /// Check if this error came from reaching (or failing to reach) a peer
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::Unauthorized
                | Error::Remote(_)
                | Error::Serialization(_)
                | Error::Io(_)
        )
    }
}
