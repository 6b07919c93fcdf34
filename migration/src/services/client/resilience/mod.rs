//! Retry layer of the transport stack

mod policy_cache;
mod retry_policy;

pub use policy_cache::CachedRetryPolicyBuilder;
pub use retry_policy::{RetryPolicy, RetryPolicyBuilder};

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::errors::ClientResult;
use super::transport::{HttpTransport, RestRequest, RestResponse};

/// Applies the current retry policy around the inner transport
pub struct ResilientTransport {
    inner: Arc<dyn HttpTransport>,
    policies: Arc<CachedRetryPolicyBuilder>,
}

impl ResilientTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, policies: Arc<CachedRetryPolicyBuilder>) -> Self {
        Self { inner, policies }
    }
}

#[async_trait]
impl HttpTransport for ResilientTransport {
    async fn send(
        &self,
        request: RestRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<RestResponse> {
        let Some(policy) = self.policies.get_policy() else {
            return self.inner.send(request, cancel).await;
        };

        let inner = &self.inner;
        policy
            .execute(cancel, || {
                let request = request.clone();
                async move { inner.send(request, cancel).await }
            })
            .await
    }
}
