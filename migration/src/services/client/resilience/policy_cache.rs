use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::retry_policy::{RetryPolicy, RetryPolicyBuilder};
use crate::services::config::{ConfigReader, ResiliencePolicyConfig};

struct CachedPolicy {
    signature: String,
    policy: Option<Arc<RetryPolicy>>,
}

/// Rebuilds the retry policy only when the resilience settings change
pub struct CachedRetryPolicyBuilder {
    config_reader: Arc<dyn ConfigReader>,
    cached: Mutex<Option<CachedPolicy>>,
}

impl CachedRetryPolicyBuilder {
    pub fn new(config_reader: Arc<dyn ConfigReader>) -> Self {
        Self {
            config_reader,
            cached: Mutex::new(None),
        }
    }

    /// `{enabled}_{interval;...}_{code;...}`
    pub fn signature(config: &ResiliencePolicyConfig) -> String {
        let intervals: String = config
            .retry_intervals
            .iter()
            .map(|interval| format!("{};", interval.as_millis()))
            .collect();
        let codes: String = config
            .retry_override_status_codes
            .iter()
            .map(|code| format!("{};", code))
            .collect();

        format!("{}_{}_{}", config.retry_enabled, intervals, codes)
    }

    pub fn get_policy(&self) -> Option<Arc<RetryPolicy>> {
        let resilience = self.config_reader.get().network.resilience;
        let signature = Self::signature(&resilience);

        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = cached.as_ref() {
            if current.signature == signature {
                return current.policy.clone();
            }
        }

        debug!("[RetryPolicyCache] Building retry policy for {}", signature);
        let policy = RetryPolicyBuilder::build(&resilience).map(Arc::new);
        *cached = Some(CachedPolicy {
            signature,
            policy: policy.clone(),
        });
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config::{MigrationConfig, SharedConfigReader};
    use std::time::Duration;

    #[test]
    fn test_signature_format() {
        let config = ResiliencePolicyConfig {
            retry_enabled: true,
            retry_intervals: vec![Duration::from_millis(100), Duration::from_secs(1)],
            retry_override_status_codes: vec![500, 503],
        };
        assert_eq!(
            CachedRetryPolicyBuilder::signature(&config),
            "true_100;1000;_500;503;"
        );
    }

    #[test]
    fn test_policy_reused_until_config_changes() {
        let reader = SharedConfigReader::new(MigrationConfig::default());
        let cache = CachedRetryPolicyBuilder::new(reader.clone());

        let first = cache.get_policy().unwrap();
        let second = cache.get_policy().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        reader
            .update(|c| c.network.resilience.retry_intervals = vec![Duration::from_secs(3)])
            .unwrap();
        let rebuilt = cache.get_policy().unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.intervals(), &[Duration::from_secs(3)]);

        reader
            .update(|c| c.network.resilience.retry_enabled = false)
            .unwrap();
        assert!(cache.get_policy().is_none());
    }
}
