//! Drift detection: evaluate every policy against one repository.
//!
//! For each policy, in catalog order:
//! 1. skip it unless some repository file matches its pattern,
//! 2. read the managed workflow file; absent ⇒ `Create` deviation,
//! 3. otherwise compare it byte-for-byte with the wrapped canonical content;
//!    different ⇒ `Update` deviation carrying the current content.
//!
//! Unmatched policies cost no remote calls at all.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::catalog::PolicyCatalog;
use crate::context::RunContext;
use crate::domain::{Deviation, Policy, Repository};
use crate::error::{DetectionError, DetectionResult};
use crate::gateway::{ContentFetcher, RepositoryGateway};
use crate::obs;
use crate::pattern;
use crate::wrap::wrap_content;

/// Decides, per repository, which policies are satisfied, missing or stale.
pub struct DriftDetector {
    catalog: Arc<PolicyCatalog>,
    gateway: Arc<dyn RepositoryGateway>,
    fetcher: Arc<dyn ContentFetcher>,
}

impl DriftDetector {
    pub fn new(
        catalog: Arc<PolicyCatalog>,
        gateway: Arc<dyn RepositoryGateway>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            catalog,
            gateway,
            fetcher,
        }
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    /// Evaluate all policies for `repo` given its blob paths.
    ///
    /// Any failure other than a missing workflow file aborts the evaluation
    /// of this repository; the caller decides whether to continue the fleet.
    #[instrument(skip(self, ctx, files), fields(repository = %repo.full_name, files = files.len()))]
    pub async fn evaluate(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        files: &[String],
    ) -> DetectionResult<Vec<Deviation>> {
        let mut deviations = Vec::new();
        if files.is_empty() {
            return Ok(deviations);
        }

        for policy in self.catalog.iter() {
            if let Some(deviation) = self.evaluate_policy(ctx, repo, files, policy).await? {
                obs::emit_deviation_detected(&deviation);
                deviations.push(deviation);
            }
        }

        Ok(deviations)
    }

    async fn evaluate_policy(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        files: &[String],
        policy: &Policy,
    ) -> DetectionResult<Option<Deviation>> {
        let compiled =
            pattern::compile(&policy.match_pattern).map_err(|e| DetectionError::InvalidPattern {
                policy: policy.name.clone(),
                pattern: policy.match_pattern.clone(),
                reason: e.to_string(),
            })?;

        if !pattern::matches_any(&compiled, files) {
            debug!(policy = %policy.name, "no matching files, policy not applicable");
            return Ok(None);
        }

        let target_path = policy.target_path();
        let current = match self.gateway.get_file(ctx, repo, &target_path, None).await {
            Ok(file) => file,
            Err(err) if err.is_not_found() => {
                return Ok(Some(Deviation::create(repo.clone(), policy.clone())));
            }
            Err(source) => {
                return Err(DetectionError::ReadWorkflow {
                    repository: repo.full_name.clone(),
                    path: target_path,
                    source,
                });
            }
        };

        let canonical = self
            .fetcher
            .fetch(ctx, &policy.source_url)
            .await
            .map_err(|source| DetectionError::FetchCanonical {
                policy: policy.name.clone(),
                url: policy.source_url.clone(),
                source,
            })?;

        if current.content == wrap_content(&canonical, &policy.name) {
            debug!(policy = %policy.name, "workflow up to date");
            return Ok(None);
        }

        Ok(Some(Deviation::update(
            repo.clone(),
            policy.clone(),
            current.content,
        )))
    }
}
