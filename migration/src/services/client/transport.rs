use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::errors::{ClientError, ClientResult, TransportError};
use crate::services::config::NetworkConfig;

/// An outgoing REST request; bodies are `Bytes` so the request can be resent
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RestRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> ClientResult<()> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::validation(name.as_str(), e.to_string()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// REST endpoints live under `/api/{version}/`
    pub fn is_rest(&self) -> bool {
        self.url
            .path_segments()
            .map(|mut segments| segments.any(|s| s == "api"))
            .unwrap_or(false)
    }

    pub fn is_sign_in(&self) -> bool {
        self.is_rest() && self.url.path().ends_with("/auth/signin")
    }
}

#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RestResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// One HTTP exchange. Layers wrap each other to add retry and authentication.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: RestRequest, cancel: &CancellationToken)
        -> ClientResult<RestResponse>;
}

/// Leaf transport backed by reqwest
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: Client,
    request_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(network: &NetworkConfig) -> ClientResult<Self> {
        let http_client = Client::builder()
            .user_agent(network.user_agent.as_str())
            .build()
            .map_err(|e| ClientError::Transport(TransportError::Network {
                message: format!("Failed to create HTTP client: {}", e),
            }))?;

        Ok(Self {
            http_client,
            request_timeout: network.request_timeout,
        })
    }

    async fn exchange(&self, request: RestRequest) -> Result<RestResponse, reqwest::Error> {
        let mut builder = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RestResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: RestRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<RestResponse> {
        let started = Instant::now();
        debug!("[HttpTransport] {} {}", request.method, request.url.path());

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Canceled),
            outcome = tokio::time::timeout(self.request_timeout, self.exchange(request)) => outcome,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let response = match outcome {
            Err(_) => return Err(TransportError::Timeout { elapsed_ms }.into()),
            Ok(Err(e)) if e.is_timeout() => return Err(TransportError::Timeout { elapsed_ms }.into()),
            Ok(Err(e)) => {
                return Err(TransportError::Network {
                    message: e.to_string(),
                }
                .into())
            }
            Ok(Ok(response)) => response,
        };

        reject_rate_limited(response)
    }
}

/// 429 becomes a retryable transport error; every other status passes through
fn reject_rate_limited(response: RestResponse) -> ClientResult<RestResponse> {
    if response.status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TransportError::RateLimited {
            retry_after_ms: retry_after_ms(&response.headers),
        }
        .into());
    }
    Ok(response)
}

/// `Retry-After` in delay-seconds form
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|seconds| seconds * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_detection() {
        let sign_in = RestRequest::new(
            Method::POST,
            Url::parse("https://analytics.example.com/api/3.18/auth/signin").unwrap(),
        );
        assert!(sign_in.is_rest());
        assert!(sign_in.is_sign_in());

        let list = RestRequest::new(
            Method::GET,
            Url::parse("https://analytics.example.com/api/3.18/sites/abc/workbooks").unwrap(),
        );
        assert!(list.is_rest());
        assert!(!list.is_sign_in());

        let asset = RestRequest::new(
            Method::GET,
            Url::parse("https://analytics.example.com/static/logo.png").unwrap(),
        );
        assert!(!asset.is_rest());
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after_ms(&headers), Some(3000));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after_ms(&headers), None);
    }

    #[test]
    fn test_too_many_requests_is_rate_limited() {
        let mut response = RestResponse::new(StatusCode::TOO_MANY_REQUESTS, "");
        response.headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));

        let error = reject_rate_limited(response).unwrap_err();
        assert!(matches!(
            error,
            ClientError::Transport(TransportError::RateLimited {
                retry_after_ms: Some(2000)
            })
        ));
        assert!(error.is_transient());

        let ok = reject_rate_limited(RestResponse::new(StatusCode::SERVICE_UNAVAILABLE, "")).unwrap();
        assert_eq!(ok.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
