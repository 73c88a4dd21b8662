use std::env;
use std::str::FromStr;

use blob_store::upload::MAX_BLOCK_SIZE;

use crate::errors::{DiagError, DiagResult};

pub const CONNECTION_STRING_VAR: &str = "STORAGE_CONNECTION_STRING";
pub const TRANSPORT_LOG_VAR: &str = "TRANSPORT_LOG";

const MIB: usize = 1024 * 1024;

/// Settings for the upload-stream run. Sizes are in bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadConfig {
    pub connection_string: String,
    pub iterations: usize,
    pub upload_size: usize,
    pub buffer_size: usize,
    pub max_concurrency: usize,
    pub continue_on_error: bool,
}

impl UploadConfig {
    pub fn from_env() -> DiagResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Absent and empty variables both fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> DiagResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connection_string = required(&lookup, CONNECTION_STRING_VAR)?;

        let iterations = parse_or(&lookup, "ITERATIONS", 1usize)?;
        let upload_size = mib(parse_or(&lookup, "UPLOAD_SIZE", 9usize)?, "UPLOAD_SIZE")?;
        let buffer_size = mib(parse_or(&lookup, "BUFFER_SIZE", 4usize)?, "BUFFER_SIZE")?;
        let max_concurrency = parse_or(&lookup, "MAX_CONCURRENCY", 1usize)?;
        let continue_on_error = flag_or(&lookup, "CONTINUE_ON_ERROR", true)?;

        if buffer_size == 0 {
            return Err(DiagError::InvalidConfig("BUFFER_SIZE must be at least 1 MiB".to_string()));
        }
        if buffer_size > MAX_BLOCK_SIZE {
            return Err(DiagError::InvalidConfig(format!(
                "BUFFER_SIZE must be at most {} MiB",
                MAX_BLOCK_SIZE / MIB
            )));
        }
        if max_concurrency == 0 {
            return Err(DiagError::InvalidConfig("MAX_CONCURRENCY must be at least 1".to_string()));
        }

        Ok(Self {
            connection_string,
            iterations,
            upload_size,
            buffer_size,
            max_concurrency,
            continue_on_error,
        })
    }
}

/// Settings for the force-reset probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    pub connection_string: String,
}

impl ProbeConfig {
    pub fn from_env() -> DiagResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DiagResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            connection_string: required(&lookup, CONNECTION_STRING_VAR)?,
        })
    }
}

/// Console logging switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Also show the HTTP and connection events of reqwest and hyper.
    pub transport: bool,
}

impl LogConfig {
    pub fn from_env() -> DiagResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DiagResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            transport: flag_or(&lookup, TRANSPORT_LOG_VAR, false)?,
        })
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> DiagResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name).ok_or(DiagError::MissingEnv(name))
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> DiagResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = std::num::ParseIntError>,
{
    match non_empty(lookup, name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|source| DiagError::InvalidEnv {
            name,
            value,
            source,
        }),
    }
}

fn flag_or<F>(lookup: &F, name: &'static str, default: bool) -> DiagResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(DiagError::InvalidConfig(format!("{} must be true or false, got `{}`", name, value))),
        },
    }
}

fn mib(value: usize, name: &str) -> DiagResult<usize> {
    value
        .checked_mul(MIB)
        .ok_or_else(|| DiagError::InvalidConfig(format!("{} of {} MiB is too large", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_missing_connection_string_is_named() {
        let err = UploadConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, DiagError::MissingEnv(CONNECTION_STRING_VAR)));
        assert_eq!(err.to_string(), "Environment variable STORAGE_CONNECTION_STRING is not set");

        let err = ProbeConfig::from_lookup(lookup(&[(CONNECTION_STRING_VAR, "")])).unwrap_err();
        assert_eq!(err.to_string(), "Environment variable STORAGE_CONNECTION_STRING is not set");
    }

    #[test]
    fn test_defaults() {
        let config = UploadConfig::from_lookup(lookup(&[(CONNECTION_STRING_VAR, "AccountName=a")])).unwrap();
        assert_eq!(
            config,
            UploadConfig {
                connection_string: "AccountName=a".to_string(),
                iterations: 1,
                upload_size: 9 * MIB,
                buffer_size: 4 * MIB,
                max_concurrency: 1,
                continue_on_error: true,
            }
        );
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("ITERATIONS", ""),
            ("UPLOAD_SIZE", ""),
            ("BUFFER_SIZE", " "),
            ("MAX_CONCURRENCY", ""),
        ]))
        .unwrap();
        assert_eq!(config.iterations, 1);
        assert_eq!(config.upload_size, 9 * MIB);
        assert_eq!(config.buffer_size, 4 * MIB);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn test_overrides() {
        let config = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("ITERATIONS", "5"),
            ("UPLOAD_SIZE", "100"),
            ("BUFFER_SIZE", "8"),
            ("MAX_CONCURRENCY", "4"),
            ("CONTINUE_ON_ERROR", "false"),
        ]))
        .unwrap();
        assert_eq!(config.iterations, 5);
        assert_eq!(config.upload_size, 100 * MIB);
        assert_eq!(config.buffer_size, 8 * MIB);
        assert_eq!(config.max_concurrency, 4);
        assert!(!config.continue_on_error);
    }

    #[test]
    fn test_invalid_values() {
        let err = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("ITERATIONS", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DiagError::InvalidEnv { name: "ITERATIONS", .. }));

        let err = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("UPLOAD_SIZE", "-1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DiagError::InvalidEnv { name: "UPLOAD_SIZE", .. }));

        let err = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("BUFFER_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DiagError::InvalidConfig(_)));

        let err = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("MAX_CONCURRENCY", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DiagError::InvalidConfig(_)));
    }

    #[test]
    fn test_buffer_size_capped_at_block_limit() {
        let config = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("BUFFER_SIZE", "4000"),
        ]))
        .unwrap();
        assert_eq!(config.buffer_size, 4000 * MIB);

        let err = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("BUFFER_SIZE", "4001"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DiagError::InvalidConfig(_)));
    }

    #[test]
    fn test_transport_log_flag() {
        assert_eq!(LogConfig::from_lookup(lookup(&[])).unwrap(), LogConfig { transport: false });
        assert_eq!(
            LogConfig::from_lookup(lookup(&[(TRANSPORT_LOG_VAR, "1")])).unwrap(),
            LogConfig { transport: true }
        );
        assert!(LogConfig::from_lookup(lookup(&[(TRANSPORT_LOG_VAR, "loud")])).is_err());
    }

    #[test]
    fn test_size_overflow_is_rejected() {
        let huge = usize::MAX.to_string();
        let err = UploadConfig::from_lookup(lookup(&[
            (CONNECTION_STRING_VAR, "AccountName=a"),
            ("UPLOAD_SIZE", huge.as_str()),
        ]))
        .unwrap_err();
        assert!(matches!(err, DiagError::InvalidConfig(_)));
    }
}
