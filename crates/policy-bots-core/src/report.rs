//! Run reports for remediation and audit-only runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Deviation, RemediationAction, RemediationOutcome};

/// Stage at which a repository-scoped failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    ListFiles,
    Evaluate,
    /// Reached after the run context was cancelled or expired; not processed.
    Cancelled,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::ListFiles => f.write_str("list_files"),
            FailureStage::Evaluate => f.write_str("evaluate"),
            FailureStage::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A repository skipped because of a repository-scoped failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFailure {
    pub repository: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome counts per action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReportTotals {
    pub fn from_outcomes(outcomes: &[RemediationOutcome]) -> Self {
        let mut totals = Self::default();
        for outcome in outcomes {
            match outcome.action {
                RemediationAction::Created => totals.created += 1,
                RemediationAction::Updated => totals.updated += 1,
                RemediationAction::Skipped => totals.skipped += 1,
                RemediationAction::Failed => totals.failed += 1,
            }
        }
        totals
    }
}

/// Result of a full detect-and-remediate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetReport {
    pub run_id: Uuid,
    pub organization: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repositories_scanned: usize,
    pub archived_skipped: usize,
    pub repository_failures: Vec<RepositoryFailure>,
    /// In discovery order.
    pub outcomes: Vec<RemediationOutcome>,
    pub totals: ReportTotals,
}

impl FleetReport {
    pub fn failed_outcomes(&self) -> impl Iterator<Item = &RemediationOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    /// Human-readable report, one line per outcome plus totals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            let d = &outcome.deviation;
            match &outcome.error {
                Some(error) => out.push_str(&format!(
                    "Error: {} in {} - {}\n",
                    d.policy.name, d.repository.full_name, error
                )),
                None => out.push_str(&format!(
                    "Remediation: {} in {} - {} ({})\n",
                    d.policy.name,
                    d.repository.full_name,
                    outcome.action,
                    outcome.pull_request_url.as_deref().unwrap_or("-")
                )),
            }
        }
        push_repository_failures(&mut out, &self.repository_failures);
        out.push_str(&format!(
            "{} repositories scanned ({} archived skipped): {} created, {} updated, {} skipped, {} failed\n",
            self.repositories_scanned,
            self.archived_skipped,
            self.totals.created,
            self.totals.updated,
            self.totals.skipped,
            self.totals.failed,
        ));
        out
    }
}

/// Result of an audit-only run: deviations, no writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: Uuid,
    pub organization: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repositories_scanned: usize,
    pub archived_skipped: usize,
    pub repository_failures: Vec<RepositoryFailure>,
    pub deviations: Vec<Deviation>,
}

impl AuditReport {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for d in &self.deviations {
            out.push_str(&format!(
                "Deviation: {} in {} - {} {}\n",
                d.policy.name, d.repository.full_name, d.action, d.target_path
            ));
        }
        push_repository_failures(&mut out, &self.repository_failures);
        out.push_str(&format!(
            "{} repositories scanned ({} archived skipped): {} deviations\n",
            self.repositories_scanned,
            self.archived_skipped,
            self.deviations.len()
        ));
        out
    }
}

fn push_repository_failures(out: &mut String, failures: &[RepositoryFailure]) {
    for failure in failures {
        out.push_str(&format!(
            "Skipped: {} ({}) - {}\n",
            failure.repository, failure.stage, failure.error
        ));
    }
}
