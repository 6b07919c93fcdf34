mod connection;

pub use connection::SiteConnectionConfig;

use crate::utils::serialization::{duration_millis, duration_millis_vec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MigrationConfig {
    pub network: NetworkConfig,
    pub batch: BatchConfig,
    pub error_policy: ErrorPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub resilience: ResiliencePolicyConfig,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

/// Retry behaviour for every outgoing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResiliencePolicyConfig {
    pub retry_enabled: bool,
    /// Wait before the i-th retry; the length is the retry bound
    #[serde(with = "duration_millis_vec")]
    pub retry_intervals: Vec<Duration>,
    /// When non-empty, replaces the default transient status set (5xx, 408)
    pub retry_override_status_codes: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub page_size: u64,
    pub max_concurrency: usize,
    pub file_chunk_size: usize,
}

/// What a content type does when one of its items fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ErrorPolicy {
    /// Record the failure and keep going
    #[default]
    ContinueOnError,
    /// Cancel the remaining items of the type and end the run
    StopOnFirstError,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            resilience: ResiliencePolicyConfig::default(),
            request_timeout: Duration::from_secs(100),
            user_agent: format!("site-migration/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ResiliencePolicyConfig {
    fn default() -> Self {
        Self {
            retry_enabled: true,
            retry_intervals: vec![
                Duration::from_millis(200),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ],
            retry_override_status_codes: Vec::new(),
        }
    }
}

impl ResiliencePolicyConfig {
    /// Every request goes straight to the wire
    pub fn disabled() -> Self {
        Self {
            retry_enabled: false,
            retry_intervals: Vec::new(),
            retry_override_status_codes: Vec::new(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_concurrency: 4,
            file_chunk_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

impl BatchConfig {
    /// One item at a time, small pages
    pub fn conservative_defaults() -> Self {
        Self {
            page_size: 50,
            max_concurrency: 1,
            file_chunk_size: 8 * 1024 * 1024,
        }
    }
}

impl MigrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch.page_size == 0 {
            return Err("page_size must be greater than 0".to_string());
        }

        if self.batch.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".to_string());
        }

        if self.batch.file_chunk_size == 0 {
            return Err("file_chunk_size must be greater than 0".to_string());
        }

        if self.network.request_timeout.is_zero() {
            return Err("request_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: MigrationConfig =
            serde_json::from_str(json).map_err(|e| format!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file; missing keys take their defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let config = Self::from_json(&json)?;
        info!("[Config] Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Read access to the live configuration
pub trait ConfigReader: Send + Sync {
    /// Snapshot of the current configuration
    fn get(&self) -> MigrationConfig;
}

/// Configuration that can be replaced while a migration runs
#[derive(Debug, Default)]
pub struct SharedConfigReader {
    config: RwLock<MigrationConfig>,
}

impl SharedConfigReader {
    pub fn new(config: MigrationConfig) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(config),
        })
    }

    /// Replace the configuration; invalid values are rejected and the old
    /// configuration stays in place
    pub fn replace(&self, config: MigrationConfig) -> Result<(), String> {
        if let Err(e) = config.validate() {
            warn!("[Config] Rejected configuration update: {}", e);
            return Err(e);
        }
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn update(&self, change: impl FnOnce(&mut MigrationConfig)) -> Result<(), String> {
        let mut next = self.get();
        change(&mut next);
        self.replace(next)
    }
}

impl ConfigReader for SharedConfigReader {
    fn get(&self) -> MigrationConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MigrationConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.network.resilience.retry_enabled);
        assert_eq!(config.network.resilience.retry_intervals.len(), 5);
        assert_eq!(config.batch.page_size, 100);
        assert_eq!(config.error_policy, ErrorPolicy::ContinueOnError);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = MigrationConfig::default();
        config.batch.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = MigrationConfig::default();
        config.network.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = MigrationConfig::default();
        config.network.resilience.retry_intervals.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MigrationConfig::from_json(
            r#"{
                "network": { "resilience": { "retry_intervals": [1000, 2000, 4000] } },
                "error_policy": "StopOnFirstError"
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.network.resilience.retry_intervals,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert!(config.network.resilience.retry_enabled);
        assert_eq!(config.batch, BatchConfig::default());
        assert_eq!(config.error_policy, ErrorPolicy::StopOnFirstError);
    }

    #[test]
    fn test_shared_reader_rejects_invalid_update() {
        let reader = SharedConfigReader::new(MigrationConfig::default());
        assert!(reader.update(|c| c.batch.page_size = 0).is_err());
        assert_eq!(reader.get().batch.page_size, 100);

        reader.update(|c| c.batch.page_size = 25).unwrap();
        assert_eq!(reader.get().batch.page_size, 25);
    }

    #[tokio::test]
    async fn test_load_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("migration.json");
        tokio::fs::write(&path, r#"{"batch": {"page_size": 10}}"#).await?;

        let config = MigrationConfig::load(&path).await.map_err(anyhow::Error::msg)?;
        assert_eq!(config.batch.page_size, 10);
        assert_eq!(config.batch.max_concurrency, 4);
        Ok(())
    }
}
