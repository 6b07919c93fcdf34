//! Single-flight session token refresh
//!
//! Sessions expire without warning, so the only signal is a 401. When many
//! requests hit a 401 together they must share one re-authentication: the
//! first caller starts a refresh, the others wait on the same shared future
//! and all of them see the same token or the same failure.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::errors::{ClientError, ClientResult};
use super::session::ServerSessionProvider;

/// Obtains a new session token, typically by signing in again
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_token(&self, cancel: &CancellationToken) -> ClientResult<String>;
}

type RefreshFlight = Shared<BoxFuture<'static, ClientResult<String>>>;

/// Hands out the current token and coalesces refresh requests
pub struct AuthenticationTokenProvider {
    session: Arc<ServerSessionProvider>,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Mutex<Option<RefreshFlight>>,
}

impl AuthenticationTokenProvider {
    pub fn new(session: Arc<ServerSessionProvider>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            session,
            refresher,
            in_flight: Mutex::new(None),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.session.token()
    }

    /// Get a token newer than `failed_token`
    ///
    /// Joins the refresh already in flight if there is one. If the session
    /// token already differs from `failed_token`, another caller refreshed in
    /// the meantime and the current token is returned without a new sign-in.
    #[instrument(skip(self, failed_token, cancel))]
    pub async fn request_refresh(
        &self,
        failed_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> ClientResult<String> {
        let flight = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(flight) if flight.peek().is_none() => {
                    debug!("[TokenProvider] Joining refresh in flight");
                    flight.clone()
                }
                _ => {
                    if let Some(current) = self.session.token() {
                        if Some(current.as_str()) != failed_token {
                            debug!("[TokenProvider] Token already refreshed");
                            return Ok(current);
                        }
                    }
                    let flight = self.start_refresh();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Canceled),
            outcome = flight.clone() => outcome,
        };

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }

        outcome
    }

    fn start_refresh(&self) -> RefreshFlight {
        let refresher = self.refresher.clone();
        let session = self.session.clone();

        // Own task, so the refresh finishes even when every waiter is canceled
        let task = tokio::spawn(async move {
            info!("[TokenProvider] Refreshing session token");
            let cancel = CancellationToken::new();
            match refresher.refresh_token(&cancel).await {
                Ok(token) => {
                    session.set_token(token.clone());
                    info!("[TokenProvider] Session token refreshed");
                    Ok(token)
                }
                Err(e) => {
                    error!("[TokenProvider] Failed to refresh session token: {}", e);
                    Err(match e {
                        ClientError::RefreshFailed { .. } => e,
                        other => ClientError::RefreshFailed {
                            message: other.to_string(),
                        },
                    })
                }
            }
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(ClientError::RefreshFailed {
                    message: format!("refresh task ended: {}", e),
                })
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingRefresher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh_token(&self, _cancel: &CancellationToken) -> ClientResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                Err(ClientError::Unauthorized {
                    message: "personal access token revoked".to_string(),
                })
            } else {
                Ok(format!("token-{}", call + 1))
            }
        }
    }

    fn provider(refresher: Arc<CountingRefresher>) -> Arc<AuthenticationTokenProvider> {
        let session = Arc::new(ServerSessionProvider::new());
        session.set_token("token-1".to_string());
        Arc::new(AuthenticationTokenProvider::new(session, refresher))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_coalesce() {
        let refresher = CountingRefresher::new(false);
        let provider = provider(refresher.clone());
        let cancel = CancellationToken::new();

        let waiters = (0..10).map(|_| {
            let provider = provider.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { provider.request_refresh(Some("token-1"), &cancel).await })
        });
        let results = futures::future::join_all(waiters).await;

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), "token-2");
        }
        assert_eq!(provider.token().as_deref(), Some("token-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_reaches_every_waiter() {
        let refresher = CountingRefresher::new(true);
        let provider = provider(refresher.clone());
        let cancel = CancellationToken::new();

        let waiters = (0..5).map(|_| {
            let provider = provider.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { provider.request_refresh(Some("token-1"), &cancel).await })
        });
        let results = futures::future::join_all(waiters).await;

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert!(matches!(
                result.unwrap(),
                Err(ClientError::RefreshFailed { .. })
            ));
        }
        assert_eq!(provider.token().as_deref(), Some("token-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_completes_after_every_waiter_gives_up() {
        let refresher = CountingRefresher::new(false);
        let provider = provider(refresher.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = provider.request_refresh(Some("token-1"), &cancel).await;
        assert!(matches!(outcome, Err(ClientError::Canceled)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.token().as_deref(), Some("token-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_failure_reuses_newer_token() {
        let refresher = CountingRefresher::new(false);
        let provider = provider(refresher.clone());
        let cancel = CancellationToken::new();

        let token = provider
            .request_refresh(Some("token-0"), &cancel)
            .await
            .unwrap();

        assert_eq!(token, "token-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_expiry_starts_new_refresh() {
        let refresher = CountingRefresher::new(false);
        let provider = provider(refresher.clone());
        let cancel = CancellationToken::new();

        let first = provider
            .request_refresh(Some("token-1"), &cancel)
            .await
            .unwrap();
        let second = provider
            .request_refresh(Some(&first), &cancel)
            .await
            .unwrap();

        assert_eq!(first, "token-2");
        assert_eq!(second, "token-3");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }
}
