//! Fleet orchestrator: list, detect and remediate across an organization.
//!
//! Failure isolation:
//! - a failed repository listing fails the run,
//! - a failed file listing or evaluation skips that repository,
//! - a failed remediation becomes a `failed` outcome,
//! - once the context is done, every repository not yet started is reported
//!   as cancelled and the report is returned with what was done so far.
//!
//! Repositories are processed in listing order. With
//! `max_concurrent_repositories > 1` they run concurrently under a semaphore
//! and results are reassembled in listing order afterwards.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::catalog::PolicyCatalog;
use crate::context::RunContext;
use crate::detector::DriftDetector;
use crate::domain::{Deviation, RemediationOutcome, Repository};
use crate::error::{FleetError, FleetResult};
use crate::gateway::{list_all_repositories, ContentFetcher, RepositoryGateway, RetryPolicy};
use crate::obs;
use crate::remediation::RemediationEngine;
use crate::report::{AuditReport, FailureStage, FleetReport, ReportTotals, RepositoryFailure};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub organization: String,
    /// 1 processes repositories strictly one after another.
    pub max_concurrent_repositories: usize,
    /// Retry budget for the repository listing.
    pub retry: RetryPolicy,
}

impl OrchestratorConfig {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            max_concurrent_repositories: 1,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_concurrency(mut self, max_concurrent_repositories: usize) -> Self {
        self.max_concurrent_repositories = max_concurrent_repositories.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// What happened to one repository.
#[derive(Debug)]
enum RepositoryReport {
    Archived,
    Failed(RepositoryFailure),
    Evaluated {
        deviations: Vec<Deviation>,
        outcomes: Vec<RemediationOutcome>,
    },
}

/// Per-repository pipeline, shared with spawned tasks.
struct RepositoryWorker {
    gateway: Arc<dyn RepositoryGateway>,
    detector: Arc<DriftDetector>,
    /// `None` in audit-only mode.
    engine: Option<Arc<RemediationEngine>>,
}

impl RepositoryWorker {
    async fn process(&self, ctx: &RunContext, repo: &Repository) -> RepositoryReport {
        if let Some(err) = ctx.err() {
            return skipped(repo, FailureStage::Cancelled, &err);
        }
        if repo.is_archived {
            debug!(repository = %repo.full_name, "skipping archived repository");
            return RepositoryReport::Archived;
        }

        let files = match self.gateway.list_files(ctx, repo).await {
            Ok(files) => files,
            Err(err) => return skipped(repo, FailureStage::ListFiles, &err),
        };

        let deviations = match self.detector.evaluate(ctx, repo, &files).await {
            Ok(deviations) => deviations,
            Err(err) => return skipped(repo, FailureStage::Evaluate, &err),
        };

        let mut outcomes = Vec::new();
        if let Some(engine) = &self.engine {
            for deviation in &deviations {
                let outcome = match engine.remediate(ctx, deviation).await {
                    Ok(outcome) => outcome,
                    Err(err) => RemediationOutcome::failed(deviation.clone(), &err),
                };
                obs::emit_remediation_finished(&outcome);
                outcomes.push(outcome);
            }
        }

        RepositoryReport::Evaluated {
            deviations,
            outcomes,
        }
    }
}

fn skipped(repo: &Repository, stage: FailureStage, err: &dyn std::fmt::Display) -> RepositoryReport {
    obs::emit_repository_skipped(&repo.full_name, &stage.to_string(), err);
    RepositoryReport::Failed(RepositoryFailure {
        repository: repo.full_name.clone(),
        stage,
        error: err.to_string(),
    })
}

/// Aggregate of one pass over the fleet.
struct Scan {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    repositories_scanned: usize,
    archived_skipped: usize,
    repository_failures: Vec<RepositoryFailure>,
    deviations: Vec<Deviation>,
    outcomes: Vec<RemediationOutcome>,
}

/// Runs detection (and optionally remediation) over every repository of an
/// organization.
pub struct FleetOrchestrator {
    gateway: Arc<dyn RepositoryGateway>,
    detector: Arc<DriftDetector>,
    engine: Arc<RemediationEngine>,
    config: OrchestratorConfig,
}

impl FleetOrchestrator {
    pub fn new(
        catalog: Arc<PolicyCatalog>,
        gateway: Arc<dyn RepositoryGateway>,
        fetcher: Arc<dyn ContentFetcher>,
        config: OrchestratorConfig,
    ) -> Self {
        let detector = Arc::new(DriftDetector::new(
            catalog,
            Arc::clone(&gateway),
            Arc::clone(&fetcher),
        ));
        let engine = Arc::new(RemediationEngine::new(Arc::clone(&gateway), fetcher));
        Self::from_parts(gateway, detector, engine, config)
    }

    pub fn from_parts(
        gateway: Arc<dyn RepositoryGateway>,
        detector: Arc<DriftDetector>,
        engine: Arc<RemediationEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            gateway,
            detector,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Detect and remediate. Fails only when the repository listing fails;
    /// a cancelled or expired context yields a partial report.
    pub async fn run(&self, ctx: &RunContext) -> FleetResult<FleetReport> {
        let scan = self.scan(ctx, true).await?;
        let totals = ReportTotals::from_outcomes(&scan.outcomes);
        Ok(FleetReport {
            run_id: scan.run_id,
            organization: self.config.organization.clone(),
            started_at: scan.started_at,
            finished_at: Utc::now(),
            repositories_scanned: scan.repositories_scanned,
            archived_skipped: scan.archived_skipped,
            repository_failures: scan.repository_failures,
            outcomes: scan.outcomes,
            totals,
        })
    }

    /// Detect only; nothing is written.
    pub async fn audit(&self, ctx: &RunContext) -> FleetResult<AuditReport> {
        let scan = self.scan(ctx, false).await?;
        Ok(AuditReport {
            run_id: scan.run_id,
            organization: self.config.organization.clone(),
            started_at: scan.started_at,
            finished_at: Utc::now(),
            repositories_scanned: scan.repositories_scanned,
            archived_skipped: scan.archived_skipped,
            repository_failures: scan.repository_failures,
            deviations: scan.deviations,
        })
    }

    async fn scan(&self, ctx: &RunContext, remediate: bool) -> FleetResult<Scan> {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string(), &self.config.organization);
        self.scan_inner(ctx, run_id, remediate).instrument(span).await
    }

    async fn scan_inner(&self, ctx: &RunContext, run_id: Uuid, remediate: bool) -> FleetResult<Scan> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_label = run_id.to_string();
        obs::emit_run_started(&run_label, self.detector.catalog().len(), !remediate);

        let repositories = list_all_repositories(self.gateway.as_ref(), ctx, &self.config.retry)
            .await
            .map_err(FleetError::ListRepositories)?;

        let worker = Arc::new(RepositoryWorker {
            gateway: Arc::clone(&self.gateway),
            detector: Arc::clone(&self.detector),
            engine: remediate.then(|| Arc::clone(&self.engine)),
        });

        let reports = if self.config.max_concurrent_repositories <= 1 {
            let mut reports = Vec::with_capacity(repositories.len());
            for repo in &repositories {
                reports.push(worker.process(ctx, repo).await);
            }
            reports
        } else {
            self.process_concurrently(ctx, &worker, &repositories).await
        };

        let mut scan = Scan {
            run_id,
            started_at,
            repositories_scanned: repositories.len(),
            archived_skipped: 0,
            repository_failures: Vec::new(),
            deviations: Vec::new(),
            outcomes: Vec::new(),
        };
        for report in reports {
            match report {
                RepositoryReport::Archived => scan.archived_skipped += 1,
                RepositoryReport::Failed(failure) => scan.repository_failures.push(failure),
                RepositoryReport::Evaluated {
                    deviations,
                    outcomes,
                } => {
                    scan.deviations.extend(deviations);
                    scan.outcomes.extend(outcomes);
                }
            }
        }

        let failures = scan.repository_failures.len()
            + scan.outcomes.iter().filter(|o| o.is_failure()).count();
        obs::emit_run_finished(
            &run_label,
            clock.elapsed().as_millis() as u64,
            scan.repositories_scanned,
            if remediate {
                scan.outcomes.len()
            } else {
                scan.deviations.len()
            },
            failures,
        );
        Ok(scan)
    }

    async fn process_concurrently(
        &self,
        ctx: &RunContext,
        worker: &Arc<RepositoryWorker>,
        repositories: &[Repository],
    ) -> Vec<RepositoryReport> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_repositories));
        let mut join_set = JoinSet::new();
        for (idx, repo) in repositories.iter().cloned().enumerate() {
            let worker = Arc::clone(worker);
            let permits = Arc::clone(&permits);
            let ctx = ctx.clone();
            join_set.spawn(
                async move {
                    let _permit = permits.acquire_owned().await;
                    (idx, worker.process(&ctx, &repo).await)
                }
                .in_current_span(),
            );
        }

        let mut slots: Vec<Option<RepositoryReport>> =
            std::iter::repeat_with(|| None).take(repositories.len()).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, report)) => slots[idx] = Some(report),
                Err(err) => debug!(error = %err, "repository task did not complete"),
            }
        }

        repositories
            .iter()
            .zip(slots)
            .map(|(repo, slot)| {
                slot.unwrap_or_else(|| {
                    skipped(repo, FailureStage::Evaluate, &"repository task aborted")
                })
            })
            .collect()
    }
}
