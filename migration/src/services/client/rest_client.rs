use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::errors::{ClientError, ClientResult};
use super::session::ServerSessionProvider;
use super::transport::{HttpTransport, RestRequest, RestResponse};
use super::types::ErrorResponse;

/// Lowest REST API version; only used to discover the real one
pub const MINIMUM_API_VERSION: &str = "2.4";

/// Builds REST URLs for one server and sends them through the transport stack
pub struct RestClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    session: Arc<ServerSessionProvider>,
}

/// A downloaded content file
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub file_name: Option<String>,
    pub content: Bytes,
}

impl RestClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: Url,
        session: Arc<ServerSessionProvider>,
    ) -> Self {
        Self {
            transport,
            base_url,
            session,
        }
    }

    pub fn session(&self) -> &Arc<ServerSessionProvider> {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start a request; `path` is relative to `/sites/{siteId}` unless
    /// [`RestRequestBuilder::without_site`] is called
    pub fn request(&self, method: Method, path: &str) -> RestRequestBuilder<'_> {
        RestRequestBuilder {
            client: self,
            method,
            segments: split_path(path),
            site_scoped: true,
            api_version: None,
            query: Vec::new(),
            filters: Vec::new(),
            body: None,
        }
    }

    pub fn get(&self, path: &str) -> RestRequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RestRequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> RestRequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    pub fn delete(&self, path: &str) -> RestRequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct RestRequestBuilder<'a> {
    client: &'a RestClient,
    method: Method,
    segments: Vec<String>,
    site_scoped: bool,
    api_version: Option<String>,
    query: Vec<(String, String)>,
    filters: Vec<String>,
    body: Option<(String, Bytes)>,
}

impl<'a> RestRequestBuilder<'a> {
    /// Append one path segment; it is percent-encoded as a whole
    pub fn segment(mut self, segment: impl ToString) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    pub fn without_site(mut self) -> Self {
        self.site_scoped = false;
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_page(self, page_number: u64, page_size: u64) -> Self {
        self.with_query("pageNumber", page_number.to_string())
            .with_query("pageSize", page_size.to_string())
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds `field:operator:value` to the `filter` query parameter
    ///
    /// Expressions are separated by `,` and parts by `:`, so both are
    /// backslash-escaped inside `value`.
    pub fn with_filter(mut self, field: &str, operator: &str, value: &str) -> Self {
        self.filters
            .push(format!("{}:{}:{}", field, operator, escape_filter_value(value)));
        self
    }

    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> ClientResult<Self> {
        let json = serde_json::to_vec(body)?;
        self.body = Some(("application/json".to_string(), Bytes::from(json)));
        Ok(self)
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: Bytes) -> Self {
        self.body = Some((content_type.into(), body));
        self
    }

    fn build_url(&self) -> ClientResult<Url> {
        let version = match &self.api_version {
            Some(version) => version.clone(),
            None => self
                .client
                .session
                .version()
                .map(|v| v.rest_api_version)
                .ok_or(ClientError::NotSignedIn)?,
        };

        let mut url = self.client.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ClientError::validation("server_url", "server URL cannot be a base")
            })?;
            path.pop_if_empty().push("api").push(&version);
            if self.site_scoped {
                let site_id = self.client.session.site_id().ok_or(ClientError::NotSignedIn)?;
                path.push("sites").push(&site_id.to_string());
            }
            path.extend(self.segments.iter());
        }

        if !self.query.is_empty() || !self.filters.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
            if !self.filters.is_empty() {
                pairs.append_pair("filter", &self.filters.join(","));
            }
        }

        Ok(url)
    }

    pub fn build(self) -> ClientResult<RestRequest> {
        let url = self.build_url()?;
        let mut request = RestRequest::new(self.method, url);
        request.set_header(ACCEPT, "application/json")?;
        if let Some((content_type, body)) = self.body {
            request.set_header(CONTENT_TYPE, &content_type)?;
            request.body = Some(body);
        }
        Ok(request)
    }

    /// Send and fail on any non-2xx status
    pub async fn send(self, cancel: &CancellationToken) -> ClientResult<RestResponse> {
        let transport = self.client.transport.clone();
        let request = self.build()?;
        debug!("[RestClient] {} {}", request.method, request.url.path());
        let response = transport.send(request, cancel).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(&response))
        }
    }

    pub async fn send_json<T: DeserializeOwned>(self, cancel: &CancellationToken) -> ClientResult<T> {
        let response = self.send(cancel).await?;
        serde_json::from_slice(&response.body).map_err(|e| ClientError::Serialization {
            message: format!("Failed to parse response: {}", e),
        })
    }

    pub async fn send_empty(self, cancel: &CancellationToken) -> ClientResult<()> {
        self.send(cancel).await.map(|_| ())
    }

    pub async fn download(self, cancel: &CancellationToken) -> ClientResult<FileDownload> {
        let response = self.send(cancel).await?;
        Ok(FileDownload {
            file_name: response
                .header(CONTENT_DISPOSITION.as_str())
                .and_then(file_name_from_disposition),
            content: response.body,
        })
    }
}

/// Map a non-2xx response to the client error taxonomy
pub fn error_from_response(response: &RestResponse) -> ClientError {
    let envelope = serde_json::from_slice::<ErrorResponse>(&response.body)
        .map(|e| e.error)
        .unwrap_or_default();

    match response.status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized {
            message: if envelope.detail.is_empty() {
                "session token rejected".to_string()
            } else {
                envelope.detail
            },
        },
        StatusCode::NOT_FOUND => ClientError::NotFound {
            resource: if envelope.detail.is_empty() {
                envelope.summary
            } else {
                envelope.detail
            },
        },
        status => ClientError::Api {
            status: status.as_u16(),
            code: envelope.code,
            summary: envelope.summary,
            detail: envelope.detail,
        },
    }
}

/// `attachment; filename="Sales.tdsx"`
fn file_name_from_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let (key, name) = part.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("filename") {
            let name = name.trim().trim_matches('"');
            (!name.is_empty()).then(|| name.to_string())
        } else {
            None
        }
    })
}

fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | ':') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
