use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RANGE};
use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{Result, UploadError};
use crate::range::{RangeItem, RangeSet};

/// Base URL of the consumer drive API.
pub const DEFAULT_API_BASE: &str = "https://api.onedrive.com/v1.0/";

// RFC 3986 unreserved characters stay as they are
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Percent-encodes one path segment, so that ids and file names containing
/// `/`, `#`, `?` or `%` cannot change the shape of the path.
pub fn path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// What a request is sent to: a path relative to the transport's base URL, or
/// an absolute URL handed out by the server (upload sessions, downloads).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Path(String),
    Url(Url),
}

impl From<&str> for Resource {
    fn from(path: &str) -> Self {
        Resource::Path(path.to_string())
    }
}

impl From<String> for Resource {
    fn from(path: String) -> Self {
        Resource::Path(path)
    }
}

impl From<Url> for Resource {
    fn from(url: Url) -> Self {
        Resource::Url(url)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Path(path) => f.write_str(path),
            Resource::Url(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub resource: Resource,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl TransportRequest {
    pub fn new(method: Method, resource: impl Into<Resource>) -> Self {
        TransportRequest {
            method,
            resource: resource.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(resource: impl Into<Resource>) -> Self {
        TransportRequest::new(Method::GET, resource)
    }

    pub fn post(resource: impl Into<Resource>) -> Self {
        TransportRequest::new(Method::POST, resource)
    }

    pub fn put(resource: impl Into<Resource>) -> Self {
        TransportRequest::new(Method::PUT, resource)
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    pub fn body(self, content_type: &str, body: Bytes) -> Result<Self> {
        let mut request = self.header(CONTENT_TYPE, content_type)?;
        request.body = Some(body);
        Ok(request)
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turns a non-success status into [`UploadError::Transport`].
    pub fn error_for_status(self, method: &Method, resource: &Resource) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(UploadError::Transport {
                method: method.clone(),
                url: resource.to_string(),
                status: self.status,
            })
        }
    }
}

/// Performs HTTP exchanges on behalf of the client.
///
/// Dropping the future returned by [`Transport::execute`] must abort the
/// request; that is how in-flight requests get cancelled.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// [`Transport::execute`], failing on a non-success status.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let method = request.method.clone();
        let resource = request.resource.clone();
        self.execute(request).await?.error_for_status(&method, &resource)
    }

    /// Makes `request` return the entity starting at byte `offset`.
    ///
    /// Sends `Range: bytes=<offset>-` unless the transport has its own way.
    fn resume_from(&self, request: TransportRequest, offset: u64) -> Result<TransportRequest> {
        let range = RangeSet::bytes([RangeItem::starting_at(offset)])?;
        request.header(RANGE, &range.to_string())
    }
}

/// [`Transport`] on top of a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        HttpTransport::with_default_headers(base_url, HeaderMap::new())
    }

    /// `default_headers` go out with every request, e.g. `Authorization`.
    pub fn with_default_headers(base_url: &str, default_headers: HeaderMap) -> Result<Self> {
        let client = reqwest::Client::builder().default_headers(default_headers).build()?;
        Ok(HttpTransport::with_client(client, Url::parse(base_url)?))
    }

    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // paths are joined onto the base, which only works below a trailing slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        HttpTransport { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn resolve(&self, resource: &Resource) -> Result<Url> {
        match resource {
            Resource::Path(path) => Ok(self.base_url.join(path.trim_start_matches('/'))?),
            Resource::Url(url) => Ok(url.clone()),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = self.resolve(&request.resource)?;
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self.client.request(request.method, url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(%status, len = body.len(), "received response");

        Ok(TransportResponse { status, headers, body })
    }
}
