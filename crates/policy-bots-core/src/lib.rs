//! Policy Bots Core Library
//!
//! Detects drift between a catalog of workflow policies and the repositories
//! of an organization, and remediates it through branch + pull request.

pub mod catalog;
pub mod context;
pub mod detector;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod gateway;
pub mod obs;
pub mod orchestrator;
pub mod pattern;
pub mod remediation;
pub mod report;
pub mod telemetry;
pub mod workflows;
pub mod wrap;

pub use catalog::{CatalogError, PolicyCatalog};
pub use context::{CancelHandle, ContextError, RunContext};
pub use detector::DriftDetector;
pub use domain::{
    Deviation, DeviationAction, Policy, RemediationAction, RemediationOutcome, Repository,
};
pub use error::{
    DetectionError, DetectionResult, FleetError, FleetResult, RemediationError,
    RemediationResult, RemediationStep,
};
pub use gateway::{
    list_all_repositories, ContentFetcher, GatewayError, GatewayResult, RepositoryGateway,
    RetryPolicy,
};
pub use orchestrator::{FleetOrchestrator, OrchestratorConfig};
pub use remediation::{RemediationConfig, RemediationEngine};
pub use report::{AuditReport, FailureStage, FleetReport, ReportTotals, RepositoryFailure};
pub use workflows::{list_workflows, WorkflowFile};
pub use wrap::wrap_content;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
