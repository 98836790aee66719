use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A required configuration value is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("OAuth state mismatch")]
    StateMismatch,
    #[error("OAuth2 error during {operation} (status {status:?}): {detail}")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("API error (status {status}): {detail}")]
    Api { status: u16, detail: String },
    #[error("Not authenticated")]
    Unauthenticated,
}
