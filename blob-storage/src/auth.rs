use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::Request;
use sha2::Sha256;

use crate::connection_string::ConnectionString;
use crate::errors::{StorageError, StorageResult};

pub const API_VERSION: &str = "2021-08-06";

const MS_DATE: &str = "x-ms-date";
const MS_VERSION: &str = "x-ms-version";

// Standard headers covered by the Shared Key signature, in signing order.
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

type HmacSha256 = Hmac<Sha256>;

/// How requests to the account are authorized.
#[derive(Clone)]
pub enum Credentials {
    /// Shared Key signing with the decoded account key.
    SharedKey { account: String, key: Vec<u8> },
    /// A SAS token appended to every request's query string.
    Sas(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .finish_non_exhaustive(),
            Credentials::Sas(_) => f.write_str("Sas(..)"),
        }
    }
}

impl Credentials {
    /// Prefers the account key when both a key and a SAS token are present.
    pub fn from_connection_string(conn: &ConnectionString) -> StorageResult<Self> {
        match (&conn.account_key, &conn.sas_token) {
            (Some(key), _) => Ok(Credentials::SharedKey {
                account: conn.account_name.clone(),
                key: STANDARD.decode(key)?,
            }),
            (None, Some(token)) => Ok(Credentials::Sas(token.clone())),
            (None, None) => Err(StorageError::ConnectionString(
                "expected AccountKey or SharedAccessSignature".to_string(),
            )),
        }
    }

    /// Stamps the date and version headers and authorizes the request.
    pub fn authorize(&self, request: &mut Request, now: DateTime<Utc>) -> StorageResult<()> {
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        insert_header(request.headers_mut(), HeaderName::from_static(MS_DATE), &date)?;
        insert_header(request.headers_mut(), HeaderName::from_static(MS_VERSION), API_VERSION)?;

        match self {
            Credentials::Sas(token) => {
                let url = request.url_mut();
                let query = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, token),
                    _ => token.clone(),
                };
                url.set_query(Some(&query));
                Ok(())
            }
            Credentials::SharedKey { account, key } => {
                let to_sign = string_to_sign(account, request);
                let mut mac = HmacSha256::new_from_slice(key).map_err(|_| {
                    StorageError::ConnectionString("account key cannot be used for HMAC".to_string())
                })?;
                mac.update(to_sign.as_bytes());
                let signature = STANDARD.encode(mac.finalize().into_bytes());

                let value = format!("SharedKey {}:{}", account, signature);
                insert_header(request.headers_mut(), AUTHORIZATION, &value)
            }
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> StorageResult<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| StorageError::ConnectionString(format!("value for {} is not a valid header", name)))?;
    headers.insert(name, value);
    Ok(())
}

/// Builds the canonical Shared Key string-to-sign for a blob service request.
pub fn string_to_sign(account: &str, request: &Request) -> String {
    let headers = request.headers();
    let mut out = String::new();

    out.push_str(request.method().as_str());
    out.push('\n');

    for name in SIGNED_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // A zero length is signed as an empty string.
        if name == CONTENT_LENGTH.as_str() && value == "0" {
            out.push('\n');
            continue;
        }
        out.push_str(value);
        out.push('\n');
    }

    let mut ms_headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers.iter() {
        let name = name.as_str().to_ascii_lowercase();
        if name.starts_with("x-ms-") {
            let value = value.to_str().unwrap_or_default().trim().to_string();
            ms_headers.insert(name, value);
        }
    }
    for (name, value) in &ms_headers {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }

    out.push('/');
    out.push_str(account);
    out.push_str(request.url().path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in request.url().query_pairs() {
        params
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&values.join(","));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::{Body, Method};
    use url::Url;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap()
    }

    fn put_block_request() -> Request {
        let url = Url::parse(
            "https://diagacct.blob.core.windows.net/container1/blob1?comp=block&blockid=QUJD%2B",
        )
        .unwrap();
        let mut request = Request::new(Method::PUT, url);
        request
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("3"));
        *request.body_mut() = Some(Body::from(vec![1u8, 2, 3]));
        request
    }

    #[test]
    fn test_string_to_sign_is_canonical() {
        let creds = Credentials::SharedKey {
            account: "diagacct".to_string(),
            key: b"secret".to_vec(),
        };
        let mut request = put_block_request();
        creds.authorize(&mut request, fixed_now()).unwrap();

        let expected = "PUT\n\n\n3\n\n\n\n\n\n\n\n\n\
            x-ms-date:Tue, 05 Mar 2024 07:08:09 GMT\n\
            x-ms-version:2021-08-06\n\
            /diagacct/container1/blob1\n\
            blockid:QUJD+\n\
            comp:block";
        assert_eq!(string_to_sign("diagacct", &request), expected);
    }

    #[test]
    fn test_zero_length_is_signed_empty() {
        let url = Url::parse("https://a.blob.core.windows.net/c?restype=container").unwrap();
        let mut request = Request::new(Method::PUT, url);
        request
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let signed = string_to_sign("a", &request);
        assert!(signed.starts_with("PUT\n\n\n\n"));
        assert!(signed.ends_with("/a/c\nrestype:container"));
    }

    #[test]
    fn test_shared_key_header_shape() {
        let creds = Credentials::SharedKey {
            account: "diagacct".to_string(),
            key: b"secret".to_vec(),
        };
        let mut first = put_block_request();
        let mut second = put_block_request();
        creds.authorize(&mut first, fixed_now()).unwrap();
        creds.authorize(&mut second, fixed_now()).unwrap();

        let header = first.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(header.starts_with("SharedKey diagacct:"));
        // base64 of a 32 byte digest
        assert_eq!(header.len(), "SharedKey diagacct:".len() + 44);
        assert_eq!(Some(header), second.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()));
    }

    #[test]
    fn test_sas_appends_token() {
        let creds = Credentials::Sas("sv=2021&sig=abc".to_string());
        let mut request = put_block_request();
        creds.authorize(&mut request, fixed_now()).unwrap();

        assert_eq!(
            request.url().query(),
            Some("comp=block&blockid=QUJD%2B&sv=2021&sig=abc")
        );
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_from_connection_string_decodes_key() {
        let conn = ConnectionString::parse("AccountName=a;AccountKey=c2VjcmV0").unwrap();
        match Credentials::from_connection_string(&conn).unwrap() {
            Credentials::SharedKey { account, key } => {
                assert_eq!(account, "a");
                assert_eq!(key, b"secret");
            }
            other => panic!("unexpected credentials {:?}", other),
        }

        let bad = ConnectionString::parse("AccountName=a;AccountKey=!!!").unwrap();
        assert!(matches!(
            Credentials::from_connection_string(&bad),
            Err(StorageError::AccountKey(_))
        ));
    }
}
