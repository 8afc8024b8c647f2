//! Errors reported by external collaborators.

use thiserror::Error;

/// Failure of a single call to an external service.
///
/// The variant decides whether the call site may retry it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The call did not finish within its time limit.
    #[error("{service} timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// The service asked us to slow down.
    #[error("{service} rate limit exceeded")]
    RateLimited { service: String },

    /// Network failure or server-side (5xx) error.
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// The response was empty or could not be understood.
    #[error("{service} returned a malformed response: {message}")]
    MalformedResponse { service: String, message: String },

    /// Credentials were missing or refused.
    #[error("{service} rejected credentials: {message}")]
    Authentication { service: String, message: String },

    /// The request was refused on content grounds.
    #[error("{service} rejected the request by content policy: {message}")]
    ContentPolicy { service: String, message: String },

    /// Any other non-recoverable failure (bad request, local tool failure).
    #[error("{service} failed: {message}")]
    Failed { service: String, message: String },
}

impl ServiceError {
    pub fn timeout(service: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            service: service.into(),
            secs,
        }
    }

    pub fn rate_limited(service: impl Into<String>) -> Self {
        Self::RateLimited {
            service: service.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn malformed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn authentication(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn content_policy(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ContentPolicy {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn failed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Map an HTTP error status to the matching variant.
    pub fn from_status(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let service = service.into();
        let message = format!("HTTP {}: {}", status, body.into());
        match status {
            401 | 403 => Self::Authentication { service, message },
            429 => Self::RateLimited { service },
            500..=599 => Self::Unavailable { service, message },
            _ => Self::Failed { service, message },
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::Unavailable { .. }
                | Self::MalformedResponse { .. }
        )
    }

    /// Name of the service that failed.
    pub fn service(&self) -> &str {
        match self {
            Self::Timeout { service, .. }
            | Self::RateLimited { service }
            | Self::Unavailable { service, .. }
            | Self::MalformedResponse { service, .. }
            | Self::Authentication { service, .. }
            | Self::ContentPolicy { service, .. }
            | Self::Failed { service, .. } => service,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        let service = e
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("http")
            .to_string();

        if e.is_timeout() {
            Self::Timeout { service, secs: 0 }
        } else if let Some(status) = e.status() {
            Self::from_status(service, status.as_u16(), e.to_string())
        } else if e.is_decode() {
            Self::MalformedResponse {
                service,
                message: e.to_string(),
            }
        } else {
            Self::Unavailable {
                service,
                message: e.to_string(),
            }
        }
    }
}

/// Result type for collaborator calls.
pub type ServiceResult<T> = Result<T, ServiceError>;
