use async_trait::async_trait;
use reqwest::header::HeaderName;
use reqwest::StatusCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::errors::{ClientError, ClientResult};
use super::session_refresh::AuthenticationTokenProvider;
use super::transport::{HttpTransport, RestRequest, RestResponse};

/// Session token header
pub const AUTH_HEADER: HeaderName = HeaderName::from_static("x-tableau-auth");

/// Attaches the session token and re-authenticates once on 401
pub struct AuthenticatingTransport {
    inner: Arc<dyn HttpTransport>,
    token_provider: Arc<AuthenticationTokenProvider>,
}

impl AuthenticatingTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, token_provider: Arc<AuthenticationTokenProvider>) -> Self {
        Self {
            inner,
            token_provider,
        }
    }
}

#[async_trait]
impl HttpTransport for AuthenticatingTransport {
    async fn send(
        &self,
        mut request: RestRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<RestResponse> {
        if !request.is_rest() || request.is_sign_in() {
            return self.inner.send(request, cancel).await;
        }

        let used_token = self.token_provider.token();
        if let Some(token) = &used_token {
            request.set_header(AUTH_HEADER, token)?;
        }

        let response = self.inner.send(request.clone(), cancel).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(
            "[AuthHandler] 401 from {} {}, re-authenticating",
            request.method,
            request.url.path()
        );
        let token = self
            .token_provider
            .request_refresh(used_token.as_deref(), cancel)
            .await?;
        request.set_header(AUTH_HEADER, &token)?;

        let response = self.inner.send(request, cancel).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            warn!("[AuthHandler] Still unauthorized after re-authentication");
            return Err(ClientError::Unauthorized {
                message: "request rejected after re-authentication".to_string(),
            });
        }
        Ok(response)
    }
}
