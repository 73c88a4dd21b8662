use clap::{Parser, Subcommand};

/// Reproduces blob client behavior under streaming uploads and connection resets.
///
/// All tuning happens through environment variables.
#[derive(Parser, Debug)]
#[clap(name = "storage-diag", version)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create a container, stream ITERATIONS blobs into it, delete it.
    UploadStream,
    /// Open a raw socket to the account's blob endpoint and wait for data or a reset.
    ForceReset,
}
