//! HTTP client capability
//!
//! Plugins only ever issue plain GET requests, so the capability is a single
//! method. The production client wraps reqwest; the devkit provides a
//! scripted one for tests.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_CHARSET};
use std::future::Future;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Network-level failures: the remote never produced an HTTP answer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },
    #[error("request to {host} timed out")]
    Timeout { host: String },
    #[error("request to {host} failed: {reason}")]
    Request { host: String, reason: String },
    #[error("cannot build HTTP client: {0}")]
    Client(String),
}

pub trait HttpClient: Send + Sync {
    fn get(&self, url: &Url) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client bounded by `timeout`, optionally announcing `charset`
    /// through `Accept-Charset` on every request.
    pub fn new(timeout: Duration, charset: Option<&str>) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(charset) = charset {
            let value = HeaderValue::from_str(charset)
                .map_err(|e| TransportError::Client(format!("bad charset '{charset}': {e}")))?;
            headers.insert(ACCEPT_CHARSET, value);
        }

        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        let host = host_of(url);
        let response = self
            .inner
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify(&host, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(&host, e))?;
        Ok(HttpResponse { status, body })
    }
}

/// `host:port` of a URL, for log and error messages.
pub fn host_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or("?");
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn classify(host: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout { host: host.to_string() }
    } else if err.is_connect() {
        TransportError::Connect {
            host: host.to_string(),
            reason: err.to_string(),
        }
    } else {
        TransportError::Request {
            host: host.to_string(),
            reason: err.to_string(),
        }
    }
}
