//! A small Azure Blob REST client: just enough to create and delete
//! containers and to stream data into block blobs.

pub mod auth;
pub mod client;
pub mod connection_string;
pub mod errors;
pub mod memory_store;
pub mod observer;
pub mod store;
pub mod upload;

pub use client::{BlobServiceClient, ClientOptions, ContainerClient, DEFAULT_TIMEOUT};
pub use connection_string::ConnectionString;
pub use errors::{StorageError, StorageResult};
pub use observer::{LoggingObserver, RequestObserver};
pub use store::ContainerStore;
pub use upload::{upload_stream, TransferOptions, UploadSummary};
