use std::fmt;

use chrono::Local;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

// Block staging, commits and service responses from the client are debug events.
const DEFAULT_DIRECTIVES: &str = "info,blob_store=debug";
const TRANSPORT_DIRECTIVES: &str = "reqwest=trace,hyper=trace";

/// Prefixes each line with `[HH:mm:ss.fff]` in local time.
#[derive(Clone, Copy, Debug, Default)]
pub struct BracketedClock;

impl FormatTime for BracketedClock {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", Local::now().format("%H:%M:%S%.3f"))
    }
}

pub fn default_directives(transport: bool) -> String {
    if transport {
        format!("{},{}", DEFAULT_DIRECTIVES, TRANSPORT_DIRECTIVES)
    } else {
        DEFAULT_DIRECTIVES.to_string()
    }
}

/// `RUST_LOG` when set, otherwise the defaults for `config`.
pub fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(config.transport)))
}

/// Lines are `[HH:mm:ss.fff] message`, without level or target.
pub fn build<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(BracketedClock)
        .with_level(false)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .finish()
}

/// Installs the console subscriber. `log` records (reqwest) are forwarded
/// into it as well.
pub fn init(config: &LogConfig) {
    build(filter(config), std::io::stdout).init();
}
