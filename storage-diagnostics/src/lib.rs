pub mod config;
pub mod errors;
pub mod force_reset;
pub mod logging;
pub mod params;
pub mod upload_stream;

pub use errors::{DiagError, DiagResult};
