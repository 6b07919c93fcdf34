use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures raised below the REST layer, before any response was read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    /// Connection, TLS or body read failure
    Network { message: String },
    /// No response within the configured request timeout
    Timeout { elapsed_ms: u64 },
    /// Server answered 429 Too Many Requests
    RateLimited { retry_after_ms: Option<u64> },
}

impl TransportError {
    /// Every transport failure is transient and eligible for retry
    pub fn is_transient(&self) -> bool {
        true
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network { message } => write!(f, "Network error: {}", message),
            TransportError::Timeout { elapsed_ms } => {
                write!(f, "Request timed out after {}ms", elapsed_ms)
            }
            TransportError::RateLimited {
                retry_after_ms: Some(ms),
            } => write!(f, "Rate limited, retry after {}ms", ms),
            TransportError::RateLimited {
                retry_after_ms: None,
            } => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for TransportError {}

/// REST client errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientError {
    /// Transport failure that survived the retry policy
    Transport(TransportError),
    /// Server rejected the credentials or the session token
    Unauthorized { message: String },
    /// Re-authentication after a 401 failed
    RefreshFailed { message: String },
    /// Error envelope returned by the REST API
    Api {
        status: u16,
        code: String,
        summary: String,
        detail: String,
    },
    /// Requested resource does not exist
    NotFound { resource: String },
    /// Request rejected locally before any network call
    Validation { field: String, message: String },
    /// Response body could not be (de)serialized
    Serialization { message: String },
    /// Operation requires a signed-in session
    NotSignedIn,
    /// Content file store failure
    FileStore { message: String },
    /// Cancellation token fired
    Canceled,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(err) => write!(f, "{}", err),
            ClientError::Unauthorized { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            ClientError::RefreshFailed { message } => {
                write!(f, "Session refresh failed: {}", message)
            }
            ClientError::Api {
                status,
                code,
                summary,
                detail,
            } => write!(f, "REST API error {} ({}): {} {}", status, code, summary, detail),
            ClientError::NotFound { resource } => write!(f, "Not found: {}", resource),
            ClientError::Validation { field, message } => {
                write!(f, "Validation error: {} - {}", field, message)
            }
            ClientError::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }
            ClientError::NotSignedIn => write!(f, "No user is signed in"),
            ClientError::FileStore { message } => write!(f, "File store error: {}", message),
            ClientError::Canceled => write!(f, "Operation canceled"),
        }
    }
}

impl std::error::Error for ClientError {}

impl ClientError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ClientError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Unauthorized { .. } => Some(401),
            ClientError::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// 409: the item already exists at the destination
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ClientError::Canceled)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(err) if err.is_transient())
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Transport(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<crate::services::files::FileStoreError> for ClientError {
    fn from(err: crate::services::files::FileStoreError) -> Self {
        ClientError::FileStore {
            message: err.to_string(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        let conflict = ClientError::Api {
            status: 409,
            code: "409009".to_string(),
            summary: "Resource Conflict".to_string(),
            detail: "A project with that name already exists".to_string(),
        };
        assert!(conflict.is_conflict());
        assert!(!ClientError::NotFound {
            resource: "/projects".to_string()
        }
        .is_conflict());
    }

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(ClientError::from(TransportError::Timeout { elapsed_ms: 100 }).is_transient());
        assert!(!ClientError::Canceled.is_transient());
        assert!(!ClientError::validation("name", "must not be empty").is_transient());
    }
}
