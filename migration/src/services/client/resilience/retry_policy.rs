use reqwest::StatusCode;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::transport::RestResponse;
use crate::services::config::ResiliencePolicyConfig;

/// Retries transient failures over a fixed interval sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    intervals: Vec<Duration>,
    override_status_codes: Option<HashSet<u16>>,
}

impl RetryPolicy {
    pub fn new(intervals: Vec<Duration>, override_status_codes: &[u16]) -> Self {
        let override_status_codes = if override_status_codes.is_empty() {
            None
        } else {
            Some(override_status_codes.iter().copied().collect())
        };

        Self {
            intervals,
            override_status_codes,
        }
    }

    /// Maximum number of retries after the first attempt
    pub fn max_retries(&self) -> usize {
        self.intervals.len()
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Override codes replace the default set of 5xx and 408
    pub fn should_retry_status(&self, status: StatusCode) -> bool {
        match &self.override_status_codes {
            Some(codes) => codes.contains(&status.as_u16()),
            None => status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT,
        }
    }

    pub fn should_retry_error(&self, error: &ClientError) -> bool {
        error.is_transient()
    }

    /// Run `attempt` until it succeeds, fails permanently or the intervals run out
    pub async fn execute<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> ClientResult<RestResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<RestResponse>>,
    {
        let mut remaining = self.intervals.iter().enumerate();

        loop {
            let outcome = attempt().await;

            let retryable = match &outcome {
                Ok(response) => self.should_retry_status(response.status),
                Err(error) => self.should_retry_error(error),
            };
            if !retryable {
                return outcome;
            }

            let Some((retry, delay)) = remaining.next() else {
                return outcome;
            };

            match &outcome {
                Ok(response) => warn!(
                    "[RetryPolicy] Status {}, retry {}/{} in {:?}",
                    response.status,
                    retry + 1,
                    self.intervals.len(),
                    delay
                ),
                Err(error) => warn!(
                    "[RetryPolicy] {}, retry {}/{} in {:?}",
                    error,
                    retry + 1,
                    self.intervals.len(),
                    delay
                ),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Canceled),
                _ = tokio::time::sleep(*delay) => {}
            }
        }
    }
}

pub struct RetryPolicyBuilder;

impl RetryPolicyBuilder {
    /// `None` means requests pass straight through
    pub fn build(config: &ResiliencePolicyConfig) -> Option<RetryPolicy> {
        if !config.retry_enabled || config.retry_intervals.is_empty() {
            return None;
        }

        Some(RetryPolicy::new(
            config.retry_intervals.clone(),
            &config.retry_override_status_codes,
        ))
    }
}
