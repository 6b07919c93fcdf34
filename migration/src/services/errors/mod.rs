use crate::features::migration::manifest::MigrationStatus;
use crate::services::client::errors::ClientError;
use crate::services::content::ContentType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Client error: {source}")]
    Client {
        #[from]
        source: ClientError,
    },

    #[error("Manifest storage error: {source}")]
    Storage {
        source: StorageError,
        context: String,
    },

    #[error("Configuration error: {field} = {value}")]
    Configuration { field: String, value: String },

    #[error("Invalid manifest transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: MigrationStatus,
        to: MigrationStatus,
    },

    #[error("No destination found for {content_type} {source_id}")]
    ReferenceNotFound {
        content_type: ContentType,
        source_id: uuid::Uuid,
    },

    #[error("Hook error: {hook} - {message}")]
    Hook { hook: String, message: String },

    #[error("Migration canceled")]
    Canceled,

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

/// Manifest persistence failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Manifest I/O failed: {operation} - {reason}")]
    Io { operation: String, reason: String },

    #[error("Manifest is corrupt: {reason}")]
    Corrupt { reason: String },
}

impl From<StorageError> for MigrationError {
    fn from(error: StorageError) -> Self {
        MigrationError::Storage {
            source: error,
            context: "Manifest operation failed".to_string(),
        }
    }
}

impl From<String> for MigrationError {
    fn from(message: String) -> Self {
        MigrationError::Unknown { message }
    }
}

impl From<&str> for MigrationError {
    fn from(message: &str) -> Self {
        MigrationError::Unknown {
            message: message.to_string(),
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    pub fn with_context(self, context: &str) -> Self {
        match self {
            MigrationError::Storage { source, .. } => MigrationError::Storage {
                source,
                context: context.to_string(),
            },
            other => other,
        }
    }

    pub fn is_canceled(&self) -> bool {
        match self {
            MigrationError::Canceled => true,
            MigrationError::Client { source } => source.is_canceled(),
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            MigrationError::Client { source } => source.is_transient(),
            MigrationError::Storage { source, .. } => matches!(source, StorageError::Io { .. }),
            _ => false,
        }
    }

    /// Get error severity for logging/alerting purposes
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MigrationError::Storage { source, .. } => match source {
                StorageError::Corrupt { .. } => ErrorSeverity::Critical,
                StorageError::Io { .. } => ErrorSeverity::High,
            },
            MigrationError::InvalidTransition { .. } => ErrorSeverity::Critical,
            MigrationError::Configuration { .. } => ErrorSeverity::High,
            MigrationError::Client { source } => match source {
                ClientError::Unauthorized { .. } | ClientError::RefreshFailed { .. } => {
                    ErrorSeverity::High
                }
                ClientError::Transport(_) => ErrorSeverity::Low,
                _ => ErrorSeverity::Medium,
            },
            MigrationError::Canceled => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}
