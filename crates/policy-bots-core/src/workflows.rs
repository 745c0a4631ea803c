//! Inventory of the workflow files present in a repository.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::RunContext;
use crate::domain::{Repository, WORKFLOWS_DIR};
use crate::gateway::{EntryKind, GatewayError, GatewayResult, RepositoryGateway};

/// A workflow file read from the default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub name: String,
    pub path: String,
    pub content: String,
}

/// Read every file under `.github/workflows` on the default branch.
///
/// A repository without the directory has no workflows. Files that cannot be
/// read are skipped with a warning; a decode failure aborts the listing.
pub async fn list_workflows(
    ctx: &RunContext,
    gateway: &dyn RepositoryGateway,
    repo: &Repository,
) -> GatewayResult<Vec<WorkflowFile>> {
    let entries = match gateway.list_directory(ctx, repo, WORKFLOWS_DIR).await {
        Ok(entries) => entries,
        Err(err) if err.is_not_found() => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut workflows = Vec::new();
    for entry in entries.into_iter().filter(|e| e.kind == EntryKind::File) {
        match gateway.get_file(ctx, repo, &entry.path, None).await {
            Ok(file) => workflows.push(WorkflowFile {
                name: entry.name,
                path: entry.path,
                content: file.content,
            }),
            Err(err @ (GatewayError::Decode(_) | GatewayError::Context(_))) => return Err(err),
            Err(err) => {
                warn!(repository = %repo.full_name, path = %entry.path, error = %err, "skipping unreadable workflow");
            }
        }
    }
    Ok(workflows)
}
