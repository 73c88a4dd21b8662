use std::io::{self, ErrorKind};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::config::ProbeConfig;
use crate::errors::{DiagError, DiagResult};

pub const PROBE_PORT: u16 = 443;
pub const RECEIVE_BUFFER_SIZE: usize = 16384;

static ACCOUNT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AccountName=([^;]*)").expect("valid AccountName pattern"));
static ENDPOINT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"EndpointSuffix=([^;]*)").expect("valid EndpointSuffix pattern"));

/// How the single read on the probe socket ended.
#[derive(Debug)]
pub enum ProbeOutcome {
    Received { bytes: usize, after: Duration },
    Closed { after: Duration },
    Reset { error: io::Error, after: Duration },
}

pub async fn run(config: &ProbeConfig) -> DiagResult<ProbeOutcome> {
    let host = account_host(&config.connection_string)?;
    probe(&host, PROBE_PORT, RECEIVE_BUFFER_SIZE).await
}

/// `{AccountName}.blob.{EndpointSuffix}`, taken from the first match of each key.
pub fn account_host(connection_string: &str) -> DiagResult<String> {
    let account = capture(&ACCOUNT_NAME, connection_string).ok_or(DiagError::ConnectionString("AccountName"))?;
    let suffix = capture(&ENDPOINT_SUFFIX, connection_string).ok_or(DiagError::ConnectionString("EndpointSuffix"))?;
    Ok(format!("{}.blob.{}", account, suffix))
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Connects to `host:port` and blocks on one read of up to `buffer_size` bytes.
pub async fn probe(host: &str, port: u16, buffer_size: usize) -> DiagResult<ProbeOutcome> {
    tracing::info!("Connecting to {}:{}...", host, port);
    let mut stream = TcpStream::connect((host, port)).await?;
    tracing::info!("Connected");

    let mut buffer = vec![0u8; buffer_size];
    tracing::info!("Receiving up to {} bytes...", buffer_size);
    let started = Instant::now();

    let outcome = match stream.read(&mut buffer).await {
        Ok(0) => ProbeOutcome::Closed { after: started.elapsed() },
        Ok(bytes) => ProbeOutcome::Received { bytes, after: started.elapsed() },
        Err(error) if matches!(error.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => {
            ProbeOutcome::Reset { error, after: started.elapsed() }
        }
        Err(error) => return Err(error.into()),
    };

    match &outcome {
        ProbeOutcome::Received { bytes, .. } => tracing::info!("Received {} bytes", bytes),
        ProbeOutcome::Closed { after } => {
            tracing::info!("Received 0 bytes (closed after {:.3}s)", after.as_secs_f64())
        }
        ProbeOutcome::Reset { error, after } => {
            tracing::info!("Connection reset after {:.3}s: {}", after.as_secs_f64(), error)
        }
    }

    Ok(outcome)
}
