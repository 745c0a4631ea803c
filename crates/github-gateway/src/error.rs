//! Error types for github-gateway, and the mapping of GitHub responses onto
//! [`GatewayError`].

use chrono::{DateTime, TimeZone, Utc};
use policy_bots_core::GatewayError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use thiserror::Error;

use crate::models::ApiErrorBody;

/// Errors raised while building a client
#[derive(Error, Debug)]
pub enum GitHubError {
    /// No organization configured
    #[error("GitHub organization is not configured (set --org or POLICY_BOT_ORG)")]
    MissingOrganization,

    /// API root is not an absolute http(s) URL
    #[error("invalid GitHub API URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },

    /// Token contains characters not allowed in a header
    #[error("GitHub token is not a valid header value")]
    InvalidToken,

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, GitHubError>;

/// Map a request failure that produced no usable response.
pub(crate) fn transport(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::Transport(err.to_string())
    }
}

/// Map a non-success response for `resource`.
pub(crate) async fn from_response(resource: &str, response: Response) -> GatewayError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    classify(resource, status, &headers, &body, Utc::now())
}

pub(crate) fn classify(
    resource: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> GatewayError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());

    if is_rate_limited(status, headers) {
        return GatewayError::RateLimited {
            reset_at: reset_at(headers, now),
        };
    }

    match status {
        StatusCode::NOT_FOUND => GatewayError::not_found(resource),
        StatusCode::UNPROCESSABLE_ENTITY if message.contains("already exists") => {
            GatewayError::already_exists(resource)
        }
        _ => GatewayError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && (header_str(headers, "x-ratelimit-remaining") == Some("0")
            || headers.contains_key(RETRY_AFTER))
}

/// `x-ratelimit-reset` (epoch seconds) or, failing that, `retry-after`.
fn reset_at(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(epoch) = header_str(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()) {
        if let Some(at) = Utc.timestamp_opt(epoch, 0).single() {
            return Some(at);
        }
    }
    header_str(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.parse::<i64>().ok())
        .map(|secs| now + chrono::Duration::seconds(secs))
}
