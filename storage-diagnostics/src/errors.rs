use std::io;
use std::num::ParseIntError;
use blob_store::StorageError;
use thiserror::Error;

pub type DiagResult<T> = Result<T, DiagError>;

#[derive(Debug, Error)]
pub enum DiagError {
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Environment variable {name} has invalid value `{value}`: {source}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection string is missing {0}")]
    ConnectionString(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
