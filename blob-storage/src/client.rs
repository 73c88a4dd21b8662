use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Method, Request, Response};
use url::Url;

use crate::auth::Credentials;
use crate::connection_string::ConnectionString;
use crate::errors::{StorageError, StorageResult};
use crate::observer::{NoopObserver, RequestObserver};
use crate::store::ContainerStore;

/// Timeout applied to each HTTP request made by the client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(50);

const ERROR_CODE_HEADER: &str = "x-ms-error-code";
const REQUEST_ID_HEADER: &str = "x-ms-request-id";

#[derive(Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub observer: Arc<dyn RequestObserver>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            observer: Arc::new(NoopObserver),
        }
    }
}

/// Entry point to a storage account's blob service.
#[derive(Clone)]
pub struct BlobServiceClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
    observer: Arc<dyn RequestObserver>,
}

impl BlobServiceClient {
    pub fn from_connection_string(raw: &str, options: ClientOptions) -> StorageResult<Self> {
        let conn = ConnectionString::parse(raw)?;
        Self::new(&conn, options)
    }

    pub fn new(conn: &ConnectionString, options: ClientOptions) -> StorageResult<Self> {
        let http = reqwest::Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            http,
            endpoint: conn.blob_endpoint()?,
            credentials: Credentials::from_connection_string(conn)?,
            observer: options.observer,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn container_client(&self, name: &str) -> StorageResult<ContainerClient> {
        let url = append_segments(&self.endpoint, &[name])?;
        Ok(ContainerClient {
            service: self.clone(),
            name: name.to_string(),
            url,
        })
    }

    async fn send(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> StorageResult<Response> {
        let mut request = Request::new(method, url);
        match body {
            Some(body) => {
                request
                    .headers_mut()
                    .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
                *request.body_mut() = Some(Body::from(body));
            }
            None if request.method() == Method::PUT => {
                request
                    .headers_mut()
                    .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
            None => {}
        }

        self.credentials.authorize(&mut request, Utc::now())?;
        self.observer.on_request(request.method(), request.url());

        let response = self.http.execute(request).await?;
        let status = response.status();
        let request_id = header_str(&response, REQUEST_ID_HEADER);
        tracing::debug!(%status, request_id = %request_id, "blob service responded");

        if status.is_success() {
            return Ok(response);
        }

        let code = header_str(&response, ERROR_CODE_HEADER);
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Service {
            status,
            code: if code.is_empty() { status.as_str().to_string() } else { code },
            message: error_message(&body),
        })
    }
}

/// Operations on a single container and the blobs inside it.
#[derive(Clone)]
pub struct ContainerClient {
    service: BlobServiceClient,
    name: String,
    url: Url,
}

impl ContainerClient {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn blob_url(&self, blob: &str) -> StorageResult<Url> {
        append_segments(&self.url, &[blob])
    }

    pub async fn create(&self) -> StorageResult<()> {
        let url = with_query(&self.url, &[("restype", "container")]);
        self.service.send(Method::PUT, url, None).await?;
        Ok(())
    }

    pub async fn delete(&self) -> StorageResult<()> {
        let url = with_query(&self.url, &[("restype", "container")]);
        self.service.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Put Block: stages `data` under `block_id` without committing it.
    pub async fn put_block(&self, blob: &str, block_id: &str, data: Vec<u8>) -> StorageResult<()> {
        let url = with_query(&self.blob_url(blob)?, &[("comp", "block"), ("blockid", block_id)]);
        self.service.send(Method::PUT, url, Some(data)).await?;
        Ok(())
    }

    /// Put Block List: commits the staged blocks, in order, as the blob's content.
    pub async fn put_block_list(&self, blob: &str, block_ids: &[String]) -> StorageResult<()> {
        let url = with_query(&self.blob_url(blob)?, &[("comp", "blocklist")]);
        self.service
            .send(Method::PUT, url, Some(block_list_xml(block_ids).into_bytes()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerStore for ContainerClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self) -> StorageResult<()> {
        ContainerClient::create(self).await
    }

    async fn delete(&self) -> StorageResult<()> {
        ContainerClient::delete(self).await
    }

    async fn stage_block(&self, blob: &str, block_id: &str, data: Vec<u8>) -> StorageResult<()> {
        self.put_block(blob, block_id, data).await
    }

    async fn commit_blocks(&self, blob: &str, block_ids: &[String]) -> StorageResult<()> {
        self.put_block_list(blob, block_ids).await
    }
}

pub fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

fn append_segments(base: &Url, segments: &[&str]) -> StorageResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StorageError::ConnectionString(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn with_query(base: &Url, pairs: &[(&str, &str)]) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().extend_pairs(pairs);
    url
}

fn header_str(response: &Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// Pulls <Message> out of the service's XML error body.
fn error_message(body: &str) -> String {
    match (body.find("<Message>"), body.find("</Message>")) {
        (Some(start), Some(end)) if start + "<Message>".len() <= end => {
            body[start + "<Message>".len()..end].trim().to_string()
        }
        _ => body.trim().to_string(),
    }
}
