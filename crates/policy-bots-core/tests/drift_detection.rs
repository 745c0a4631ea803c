//! Drift detector behaviour against the in-memory gateway.

use std::sync::Arc;

use policy_bots_core::fakes::{FakeOp, InMemoryGateway, StaticContentFetcher};
use policy_bots_core::{
    wrap_content, DetectionError, DeviationAction, DriftDetector, GatewayError, Policy,
    PolicyCatalog, Repository, RunContext,
};

const SOURCE: &str = "https://policies.test/dockerfile.yml";
const CANONICAL: &str = "name: docker\non: push\n";

fn dockerfile_policy() -> Policy {
    Policy::new("dockerfile", "**/Dockerfile*", SOURCE)
}

struct Harness {
    gateway: Arc<InMemoryGateway>,
    fetcher: Arc<StaticContentFetcher>,
    detector: DriftDetector,
    repo: Repository,
}

fn harness(policies: Vec<Policy>, files: &[&str]) -> Harness {
    let gateway = Arc::new(InMemoryGateway::new());
    let repo = Repository::new("stevedores-org", "api");
    gateway.add_repository(repo.clone(), files);
    let fetcher = Arc::new(StaticContentFetcher::new().with(SOURCE, CANONICAL));
    let catalog = Arc::new(PolicyCatalog::new(policies).expect("valid catalog"));
    let detector = DriftDetector::new(catalog, gateway.clone(), fetcher.clone());
    Harness {
        gateway,
        fetcher,
        detector,
        repo,
    }
}

fn paths(files: &[&str]) -> Vec<String> {
    files.iter().map(|f| f.to_string()).collect()
}

#[tokio::test]
async fn missing_workflow_yields_create_deviation() {
    let files = ["Dockerfile", "main.go"];
    let h = harness(vec![dockerfile_policy()], &files);
    let ctx = RunContext::background();

    let deviations = h.detector.evaluate(&ctx, &h.repo, &paths(&files)).await.unwrap();

    assert_eq!(deviations.len(), 1);
    let d = &deviations[0];
    assert_eq!(d.action, DeviationAction::Create);
    assert_eq!(d.target_path, ".github/workflows/dockerfile.yml");
    assert_eq!(d.expected_source_url, SOURCE);
    assert!(d.current_content.is_empty());
    assert_eq!(h.fetcher.calls(), 0, "create needs no canonical fetch");
}

#[tokio::test]
async fn wrapped_workflow_yields_no_deviation() {
    let files = ["Dockerfile", "main.go"];
    let h = harness(vec![dockerfile_policy()], &files);
    h.gateway.put_default_file(
        &h.repo,
        ".github/workflows/dockerfile.yml",
        &wrap_content(CANONICAL, "dockerfile"),
    );
    let ctx = RunContext::background();

    let deviations = h.detector.evaluate(&ctx, &h.repo, &paths(&files)).await.unwrap();
    assert!(deviations.is_empty());
}

#[tokio::test]
async fn stale_workflow_yields_update_with_raw_content() {
    let files = ["Dockerfile", "main.go"];
    let h = harness(vec![dockerfile_policy()], &files);
    let stale = "name: docker\non: pull_request\n";
    h.gateway
        .put_default_file(&h.repo, ".github/workflows/dockerfile.yml", stale);
    let ctx = RunContext::background();

    let deviations = h.detector.evaluate(&ctx, &h.repo, &paths(&files)).await.unwrap();

    assert_eq!(deviations.len(), 1);
    assert_eq!(deviations[0].action, DeviationAction::Update);
    assert_eq!(deviations[0].current_content, stale);
}

#[tokio::test]
async fn unmatched_repository_costs_no_remote_calls() {
    let files = ["README.md", "src/lib.rs"];
    let h = harness(vec![dockerfile_policy()], &files);
    let ctx = RunContext::background();

    let deviations = h.detector.evaluate(&ctx, &h.repo, &paths(&files)).await.unwrap();

    assert!(deviations.is_empty());
    assert_eq!(h.gateway.total_calls(), 0);
    assert_eq!(h.fetcher.calls(), 0);
}

#[tokio::test]
async fn empty_file_list_and_empty_catalog_yield_nothing() {
    let h = harness(vec![dockerfile_policy()], &[]);
    let ctx = RunContext::background();
    assert!(h.detector.evaluate(&ctx, &h.repo, &[]).await.unwrap().is_empty());
    assert_eq!(h.gateway.total_calls(), 0);

    let files = ["Dockerfile"];
    let h = harness(vec![], &files);
    assert!(h
        .detector
        .evaluate(&ctx, &h.repo, &paths(&files))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn multiple_matches_evaluate_policy_once() {
    let files = ["Dockerfile", "svc/a/Dockerfile", "svc/b/Dockerfile.prod"];
    let h = harness(vec![dockerfile_policy()], &files);
    let ctx = RunContext::background();

    let deviations = h.detector.evaluate(&ctx, &h.repo, &paths(&files)).await.unwrap();

    assert_eq!(deviations.len(), 1);
    assert_eq!(h.gateway.calls(FakeOp::GetFile), 1);
}

#[tokio::test]
async fn deviations_follow_catalog_order() {
    let files = ["go.mod", "Dockerfile"];
    let h = harness(
        vec![
            Policy::new("go", "**/go.mod", "https://policies.test/go.yml"),
            dockerfile_policy(),
        ],
        &files,
    );
    let ctx = RunContext::background();

    let deviations = h.detector.evaluate(&ctx, &h.repo, &paths(&files)).await.unwrap();
    let names: Vec<&str> = deviations.iter().map(|d| d.policy.name.as_str()).collect();
    assert_eq!(names, vec!["go", "dockerfile"]);
}

#[tokio::test]
async fn read_failure_other_than_not_found_aborts() {
    let files = ["Dockerfile"];
    let h = harness(vec![dockerfile_policy()], &files);
    h.gateway.fail_always(
        FakeOp::GetFile,
        &h.repo,
        GatewayError::Api {
            status: 500,
            message: "server error".into(),
        },
    );
    let ctx = RunContext::background();

    let err = h
        .detector
        .evaluate(&ctx, &h.repo, &paths(&files))
        .await
        .unwrap_err();
    assert!(matches!(err, DetectionError::ReadWorkflow { ref path, .. } if path == ".github/workflows/dockerfile.yml"));
}

#[tokio::test]
async fn failed_canonical_fetch_aborts() {
    let files = ["Dockerfile"];
    let h = harness(vec![dockerfile_policy()], &files);
    h.gateway
        .put_default_file(&h.repo, ".github/workflows/dockerfile.yml", "old");
    h.fetcher.fail(
        SOURCE,
        GatewayError::Api {
            status: 404,
            message: "Not Found".into(),
        },
    );
    let ctx = RunContext::background();

    let err = h
        .detector
        .evaluate(&ctx, &h.repo, &paths(&files))
        .await
        .unwrap_err();
    assert!(matches!(err, DetectionError::FetchCanonical { .. }));
    assert!(err.to_string().contains(SOURCE));
}
