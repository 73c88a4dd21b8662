use std::process::ExitCode;

use clap::Parser;
use storage_diagnostics::config::{LogConfig, ProbeConfig, UploadConfig};
use storage_diagnostics::params::{Args, Command};
use storage_diagnostics::{force_reset, logging, upload_stream, DiagResult};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error running sample: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> DiagResult<()> {
    logging::init(&LogConfig::from_env()?);

    match command {
        Command::UploadStream => {
            // Configuration errors surface before any network activity.
            let config = UploadConfig::from_env()?;
            let report = upload_stream::run(&config).await?;
            tracing::info!(
                "Finished: {} uploaded, {} failed in {}",
                report.uploaded.len(),
                report.failed,
                report.container
            );
        }
        Command::ForceReset => {
            let config = ProbeConfig::from_env()?;
            force_reset::run(&config).await?;
        }
    }
    Ok(())
}
