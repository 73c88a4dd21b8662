use std::io;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinError;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid connection string: {0}")]
    ConnectionString(String),

    #[error("Account key is not valid base64")]
    AccountKey(#[from] base64::DecodeError),

    #[error("Invalid request URL")]
    Url(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service responded {status} ({code}): {message}")]
    Service {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Failed to read upload source: {0}")]
    Io(#[from] io::Error),

    #[error("Block upload task failed: {0}")]
    Join(#[from] JoinError),
}

impl StorageError {
    /// The `x-ms-error-code` reported by the service, if this is a service error.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            StorageError::Service { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}
