//! Error types for the aggregation and sync engine.
//!
//! Only a few of these ever reach the user: authorization failures during an
//! explicit connect, and a corrupted index when the recovery policy is `fail`.
//! Everything else is logged and absorbed by the orchestrator.

use thiserror::Error;

/// pkm-sync error type
#[derive(Error, Debug)]
pub enum Error {
    /// The persisted index failed authentication or could not be decoded
    #[error("Index storage corrupted: {0}")]
    StorageCorrupted(String),

    /// The persisted index was written by a newer schema
    #[error("Unsupported index version {found} (max supported {supported})")]
    UnsupportedIndexVersion { found: u32, supported: u32 },

    /// The user dismissed the interactive authorization
    #[error("Authorization cancelled")]
    AuthorizationCancelled,

    /// The provider rejected the authorization or the code exchange
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Another authorization session is already waiting for its callback
    #[error("An authorization session is already in progress")]
    AuthorizationInProgress,

    /// A connector is missing its configuration
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Unknown source name
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// HTTP status outside 200-299
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Secret store error
    #[error("Secret store error: {0}")]
    SecretStore(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for pkm-sync operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<keyring::Error> for Error {
    fn from(err: keyring::Error) -> Self {
        Error::SecretStore(err.to_string())
    }
}
