//! Errors surfaced by repository gateways and content fetchers.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::context::ContextError;

/// Errors produced by a [`super::RepositoryGateway`] or [`super::ContentFetcher`].
///
/// The variants the engines branch on (`NotFound`, `AlreadyExists`,
/// `RateLimited`) are structured so no caller needs to match on message text.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The requested file, ref, or repository does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// The object being created already exists (e.g. a branch ref).
    #[error("already exists: {resource}")]
    AlreadyExists { resource: String },

    /// The API rate limit is exhausted until `reset_at` (when known).
    #[error("rate limit exceeded{}", reset_suffix(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Any other non-success API response.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The run context finished while the call was in flight or waiting.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Rate limiting persisted through every allowed attempt.
    #[error("max retries reached after {attempts} attempts: {last}")]
    MaxRetriesReached {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(", resets at {}", at.to_rfc3339()),
        None => String::new(),
    }
}

impl GatewayError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        GatewayError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn already_exists(resource: impl Into<String>) -> Self {
        GatewayError::AlreadyExists {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited { .. })
    }

    /// The context error behind this failure, if any.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            GatewayError::Context(err) => Some(*err),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display_includes_reset() {
        let reset = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let err = GatewayError::RateLimited {
            reset_at: Some(reset),
        };
        assert!(err.to_string().contains("2026-01-01T00:00:00"));
        assert_eq!(
            GatewayError::RateLimited { reset_at: None }.to_string(),
            "rate limit exceeded"
        );
    }

    #[test]
    fn test_max_retries_wraps_last_error() {
        let err = GatewayError::MaxRetriesReached {
            attempts: 5,
            last: Box::new(GatewayError::RateLimited { reset_at: None }),
        };
        let msg = err.to_string();
        assert!(msg.contains("max retries reached"));
        assert!(msg.contains("rate limit"));
    }

    #[test]
    fn test_context_error_is_transparent() {
        let err = GatewayError::from(ContextError::DeadlineExceeded);
        assert_eq!(err.to_string(), "context deadline exceeded");
        assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));
    }
}
