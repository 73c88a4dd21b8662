use url::Url;

use crate::errors::{StorageError, StorageResult};

pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
pub const DEFAULT_PROTOCOL: &str = "https";

// Well-known Azurite / storage emulator credentials.
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// A parsed storage account connection string.
///
/// Only the settings relevant to the blob service are kept. Keys are matched
/// case-insensitively and the first occurrence of a key wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionString {
    pub account_name: String,
    pub account_key: Option<String>,
    pub endpoint_suffix: String,
    pub protocol: String,
    pub blob_endpoint: Option<String>,
    pub sas_token: Option<String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = None;
        let mut protocol = None;
        let mut blob_endpoint = None;
        let mut sas_token = None;
        let mut development = false;

        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                StorageError::ConnectionString(format!("segment `{}` is not a Key=Value pair", segment))
            })?;
            let slot = match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => &mut account_name,
                "accountkey" => &mut account_key,
                "endpointsuffix" => &mut endpoint_suffix,
                "defaultendpointsprotocol" => &mut protocol,
                "blobendpoint" => &mut blob_endpoint,
                "sharedaccesssignature" => &mut sas_token,
                "usedevelopmentstorage" => {
                    development = value.trim().eq_ignore_ascii_case("true");
                    continue;
                }
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.trim().to_string());
            }
        }

        if development {
            return Ok(Self::development());
        }

        let account_name = account_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StorageError::ConnectionString("missing AccountName".to_string()))?;

        if account_key.is_none() && sas_token.is_none() {
            return Err(StorageError::ConnectionString(
                "expected AccountKey or SharedAccessSignature".to_string(),
            ));
        }

        Ok(Self {
            account_name,
            account_key,
            endpoint_suffix: endpoint_suffix.unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
            protocol: protocol.unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            blob_endpoint,
            sas_token: sas_token.map(|token| token.trim_start_matches('?').to_string()),
        })
    }

    /// Settings for a local storage emulator.
    pub fn development() -> Self {
        Self {
            account_name: DEV_ACCOUNT_NAME.to_string(),
            account_key: Some(DEV_ACCOUNT_KEY.to_string()),
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            protocol: "http".to_string(),
            blob_endpoint: Some(DEV_BLOB_ENDPOINT.to_string()),
            sas_token: None,
        }
    }

    /// `{account}.blob.{suffix}`
    pub fn blob_host(&self) -> String {
        format!("{}.blob.{}", self.account_name, self.endpoint_suffix)
    }

    /// The blob service endpoint, preferring an explicit `BlobEndpoint`.
    pub fn blob_endpoint(&self) -> StorageResult<Url> {
        let raw = match &self.blob_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("{}://{}", self.protocol, self.blob_host()),
        };
        let mut url = Url::parse(&raw)?;
        // Container names are appended as path segments.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}
