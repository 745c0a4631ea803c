//! Paged repository listing with rate-limit aware retries.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::context::RunContext;
use crate::domain::Repository;
use crate::obs;

use super::{GatewayError, GatewayResult, RepositoryGateway};

/// Retry budget for rate-limited calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Unit of the exponential backoff.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// `base_delay * 2^exponent`, saturating.
    pub fn backoff(&self, exponent: u32) -> Duration {
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// How long to wait before retry number `retry` (0-based).
    ///
    /// A reset in the future is waited for exactly. A reset that has already
    /// passed is retried at once the first time and then backs off from one
    /// unit, doubling. Without a reset timestamp the backoff starts at one unit.
    pub fn wait_for(&self, reset_at: Option<DateTime<Utc>>, retry: u32, now: DateTime<Utc>) -> Duration {
        match reset_at {
            Some(reset) if reset > now => (reset - now).to_std().unwrap_or_default(),
            Some(_) if retry == 0 => Duration::ZERO,
            Some(_) => self.backoff(retry - 1),
            None => self.backoff(retry),
        }
    }
}

/// Run `call` until it succeeds, fails with a non-rate-limit error, or the
/// retry budget is spent. The same request is repeated on every attempt.
///
/// Waits race the context, so cancellation or a deadline ends the call
/// immediately with [`GatewayError::Context`].
pub async fn retry_rate_limited<T, F, Fut>(
    ctx: &RunContext,
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        attempt += 1;

        let reset_at = match call().await {
            Ok(value) => return Ok(value),
            Err(GatewayError::RateLimited { reset_at }) => reset_at,
            Err(other) => return Err(other),
        };

        if attempt >= policy.max_attempts {
            return Err(GatewayError::MaxRetriesReached {
                attempts: attempt,
                last: Box::new(GatewayError::RateLimited { reset_at }),
            });
        }

        let wait = policy.wait_for(reset_at, attempt - 1, Utc::now());
        obs::emit_rate_limited(operation, attempt, wait);
        ctx.sleep(wait).await?;
    }
}

/// List every repository of the organization, following page cursors until
/// the gateway reports no next page.
pub async fn list_all_repositories(
    gateway: &dyn RepositoryGateway,
    ctx: &RunContext,
    policy: &RetryPolicy,
) -> GatewayResult<Vec<Repository>> {
    let mut repositories = Vec::new();
    let mut page: Option<u32> = None;

    loop {
        let current = page;
        let result = retry_rate_limited(ctx, policy, "list_repositories", || {
            gateway.list_repositories_page(ctx, current)
        })
        .await?;

        repositories.extend(result.repositories);

        match result.next_page {
            Some(next) if Some(next) != current => page = Some(next),
            _ => break,
        }
    }

    Ok(repositories)
}
