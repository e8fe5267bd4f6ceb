//! Router tests driven through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use devserver_api::{AppState, routes};
use devserver_config::{ConfigHandle, parse_config};
use devserver_core::executor::{ProcessRunner, ProcessSpec};
use devserver_core::log::PipelineLog;
use devserver_core::RunnerError;
use devserver_scheduler::FileReportSink;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;

/// Every command succeeds without output.
#[derive(Default)]
struct QuietRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl ProcessRunner for QuietRunner {
    async fn run(&self, _spec: &ProcessSpec, _log: &mut PipelineLog) -> Result<i32, RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

struct TestServer {
    dir: TempDir,
    state: AppState,
    runner: Arc<QuietRunner>,
    app: Router,
}

impl TestServer {
    fn new(extra: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["repos", "reports", "tests", "web"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        let text = format!(
            "repos-path \"{root}/repos\"\nreports-path \"{root}/reports\"\ntests-path \"{root}/tests\"\nweb-path \"{root}/web\"\nproject \"demo\" branch=\"main\"\n{extra}",
            root = dir.path().display(),
        );
        let config = ConfigHandle::new(parse_config(&text).unwrap());
        let sink = FileReportSink::new(dir.path().join("reports"), dir.path().join("tests"));
        let runner = Arc::new(QuietRunner::default());
        let state = AppState::with_parts(config, runner.clone(), Arc::new(sink));
        Self {
            app: routes::router(state.clone()),
            state,
            runner,
            dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn webhook(event: &str, body: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/webhooks/github")
        .header("X-GitHub-Event", event)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Hub-Signature-256", signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

/// Test: health endpoints answer without credentials
#[tokio::test]
async fn test_health() {
    let server = TestServer::new("site-user \"user\"\nsite-pass \"pass\"");

    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ok"));

    let (status, body) = server.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"projects\":1"));
}

/// Test: the landing page lists configured projects and their report links
#[tokio::test]
async fn test_index_lists_projects() {
    let server = TestServer::new("hostname \"dev.example.com\"");

    let (status, body) = server.get("/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("dev.example.com"));
    assert!(body.contains("buildlog/main.demo"));
    assert!(body.contains("testreport/main.demo"));
}

/// Test: configured site credentials are required for pages
#[tokio::test]
async fn test_site_auth() {
    let server = TestServer::new("site-user \"user\"\nsite-pass \"pass\"");

    let response = server
        .app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"Project Viewer\""
    );

    // user:wrong
    let wrong = Request::get("/")
        .header(header::AUTHORIZATION, "Basic dXNlcjp3cm9uZw==")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(wrong).await.0, StatusCode::UNAUTHORIZED);

    // user:pass
    let right = Request::get("/")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(right).await.0, StatusCode::OK);
}

/// Test: a stored build log is rendered with colour spans
#[tokio::test]
async fn test_build_log_page() {
    let server = TestServer::new("");
    std::fs::write(
        server.dir.path().join("reports").join("main.demo"),
        "\x1b[31mfailed <step>\x1b[0m\n",
    )
    .unwrap();

    let (status, body) = server.get("/buildlog/main.demo").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<span class=\"flired\">failed &lt;step&gt;</span>"));
}

/// Test: missing reports and unknown keys are 404s
#[tokio::test]
async fn test_report_not_found() {
    let server = TestServer::new("");

    assert_eq!(server.get("/testreport/main.demo").await.0, StatusCode::NOT_FOUND);
    assert_eq!(server.get("/buildlog/main.other").await.0, StatusCode::NOT_FOUND);
    assert_eq!(server.get("/buildlog/..").await.0, StatusCode::NOT_FOUND);
}

/// Test: triggering an unconfigured project is a 404
#[tokio::test]
async fn test_trigger_unknown_project() {
    let server = TestServer::new("");

    let request = Request::post("/api/v1/projects/missing/build")
        .body(Body::empty())
        .unwrap();
    let (status, body) = server.send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("missing"));
    assert_eq!(server.state.coordinator.queued("missing"), 0);
    assert_eq!(server.state.coordinator.known_queues(), 0);

    let request = Request::post("/api/v1/projects/missing/test")
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(request).await.0, StatusCode::NOT_FOUND);
    assert_eq!(server.state.coordinator.known_queues(), 0);
    assert_eq!(server.runner.calls.load(Ordering::SeqCst), 0);
}

/// Test: a manual test run returns the outcome
#[tokio::test]
async fn test_trigger_test_run() {
    let server = TestServer::new("");
    std::fs::create_dir_all(server.dir.path().join("repos").join("demo")).unwrap();

    let request = Request::post("/api/v1/projects/demo/test")
        .body(Body::empty())
        .unwrap();
    let (status, body) = server.send(request).await;

    assert_eq!(status, StatusCode::OK);
    let outcome: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(outcome["kind_executed"], "test");
    assert_eq!(outcome["results"][0]["ok"], true);
    assert!(server.dir.path().join("tests").join("main.demo").exists());
    // fetch, checkout, merge
    assert_eq!(server.runner.calls.load(Ordering::SeqCst), 3);
}

/// Test: webhooks are refused when no secret is configured
#[tokio::test]
async fn test_webhook_without_secret() {
    let server = TestServer::new("");
    let body = br#"{"zen":"hi"}"#;

    let (status, _) = server.send(webhook("ping", body, Some(&sign("s", body)))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// Test: signed deliveries are accepted and bad signatures refused
#[tokio::test]
async fn test_webhook_signature() {
    let server = TestServer::new("github-webhook-secret \"s3cret\"");
    let body = br#"{"zen":"hi"}"#;

    let (status, _) = server.send(webhook("ping", body, Some(&sign("other", body)))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server.send(webhook("ping", body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, response) = server.send(webhook("ping", body, Some(&sign("s3cret", body)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, "{}");
}

/// Test: a push for an unmonitored repository is acknowledged
#[tokio::test]
async fn test_webhook_push_for_other_repository() {
    let server = TestServer::new("github-webhook-secret \"s3cret\"");
    let body = br#"{"repository":{"name":"elsewhere"}}"#;

    let (status, response) = server.send(webhook("push", body, Some(&sign("s3cret", body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, "{}");
}

/// Test: oversized deliveries are rejected before verification
#[tokio::test]
async fn test_webhook_payload_limit() {
    let server = TestServer::new("github-webhook-secret \"s3cret\"");
    let body = vec![b' '; devserver_api::routes::webhooks::MAX_PAYLOAD_BYTES + 1];

    let (status, _) = server.send(webhook("push", &body, Some(&sign("s3cret", &body)))).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
