//! Domain model: policies, repositories, deviations and remediation outcomes.

pub mod deviation;
pub mod outcome;
pub mod policy;
pub mod repository;

pub use deviation::{Deviation, DeviationAction};
pub use outcome::{RemediationAction, RemediationOutcome};
pub use policy::{Policy, BRANCH_PREFIX, WORKFLOWS_DIR};
pub use repository::Repository;
