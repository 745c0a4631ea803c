//! Structured observability hooks for fleet run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for key lifecycle events: run start/finish, skipped
//!   repositories, detected deviations, remediation results, rate limiting
//!
//! Events are emitted with an `event` field so they can be filtered in JSON
//! log pipelines (`--json`).

use std::time::Duration;

use tracing::{info, warn, Span};

use crate::domain::{Deviation, RemediationOutcome};

/// Run-scoped span tagged with the run id and organization.
///
/// Attach it with [`tracing::Instrument`] so it follows the run future across
/// await points.
///
/// # Example
///
/// ```ignore
/// orchestrator.run(&ctx).instrument(run_span(&run_id, "stevedores-org")).await
/// ```
pub fn run_span(run_id: &str, organization: &str) -> Span {
    tracing::info_span!("policy_bots.run", run_id = %run_id, organization = %organization)
}

/// Emit event: fleet run started.
pub fn emit_run_started(run_id: &str, policies: usize, audit_only: bool) {
    info!(
        event = "fleet.run_started",
        run_id = %run_id,
        policies = policies,
        audit_only = audit_only,
    );
}

/// Emit event: fleet run finished with per-action counts.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, repositories: usize, outcomes: usize, failures: usize) {
    info!(
        event = "fleet.run_finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        repositories = repositories,
        outcomes = outcomes,
        failures = failures,
    );
}

/// Emit event: a repository was skipped because of a repository-scoped failure.
pub fn emit_repository_skipped(repository: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "fleet.repository_skipped",
        repository = %repository,
        stage = %stage,
        error = %error,
    );
}

/// Emit event: a deviation was detected.
pub fn emit_deviation_detected(deviation: &Deviation) {
    info!(
        event = "drift.deviation_detected",
        repository = %deviation.repository.full_name,
        policy = %deviation.policy.name,
        action = %deviation.action,
        target_path = %deviation.target_path,
    );
}

/// Emit event: a remediation reached a terminal outcome.
pub fn emit_remediation_finished(outcome: &RemediationOutcome) {
    if let Some(error) = &outcome.error {
        warn!(
            event = "remediation.failed",
            repository = %outcome.deviation.repository.full_name,
            policy = %outcome.deviation.policy.name,
            error = %error,
        );
    } else {
        info!(
            event = "remediation.finished",
            repository = %outcome.deviation.repository.full_name,
            policy = %outcome.deviation.policy.name,
            action = %outcome.action,
            pull_request_url = outcome.pull_request_url.as_deref().unwrap_or_default(),
        );
    }
}

/// Emit event: a call was rate limited and will be retried after `wait`.
pub fn emit_rate_limited(operation: &str, attempt: u32, wait: Duration) {
    warn!(
        event = "gateway.rate_limited",
        operation = %operation,
        attempt = attempt,
        wait_ms = wait.as_millis() as u64,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_enter() {
        let _guard = run_span("test-run-id", "org").entered();
        emit_run_started("test-run-id", 3, false);
    }
}
