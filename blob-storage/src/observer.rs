use std::sync::{Arc, Mutex};

use reqwest::Method;
use url::Url;

/// Callback invoked with every request the client is about to send.
pub trait RequestObserver: Send + Sync {
    fn on_request(&self, method: &Method, url: &Url);
}

/// Logs `METHOD URL` for each request at info level.
#[derive(Clone, Debug, Default)]
pub struct LoggingObserver;

impl RequestObserver for LoggingObserver {
    fn on_request(&self, method: &Method, url: &Url) {
        tracing::info!("{} {}", method, redact(url));
    }
}

/// Does nothing.
#[derive(Clone, Debug, Default)]
pub struct NoopObserver;

impl RequestObserver for NoopObserver {
    fn on_request(&self, _method: &Method, _url: &Url) {}
}

/// Keeps every observed request in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    seen: Arc<Mutex<Vec<(Method, Url)>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<(Method, Url)> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RequestObserver for RecordingObserver {
    fn on_request(&self, method: &Method, url: &Url) {
        let mut seen = match self.seen.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.push((method.clone(), url.clone()));
    }
}

/// Hides the `sig` parameter of SAS-authorized URLs.
pub fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(name, _)| name == "sig") {
        return url.to_string();
    }
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if name == "sig" { "REDACTED".to_string() } else { value.into_owned() };
            (name.into_owned(), value)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}
