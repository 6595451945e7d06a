//! Integration tests for the HTTP API.
//!
//! The router is driven in-process against the in-memory hypervisor.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use vmapi_core::{OrchestratorConfig, VmOrchestrator};
use vmapi_server::build_router;
use vmapi_virt::mock::GatewayOp;
use vmapi_virt::{DomainState, MockGateway};

const FIXED_ID: &str = "123e4567-e89b-12d3-a456-426614174000";

struct TestApp {
    mock: MockGateway,
    router: Router,
    dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_healthcheck(true)
    }

    fn with_healthcheck(healthcheck: bool) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("base.qcow2"), b"base").unwrap();

        let mock = MockGateway::new();
        mock.touch_disks();
        let config = OrchestratorConfig::builder()
            .image_root(dir.path().join("images"))
            .build()
            .unwrap();
        let orchestrator = Arc::new(VmOrchestrator::new(config, Arc::new(mock.clone())));
        let router = build_router(orchestrator, healthcheck);
        Self { mock, router, dir }
    }

    fn base_image(&self) -> PathBuf {
        self.dir.path().join("base.qcow2")
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn post_json(&self, uri: &str, body: String) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

fn assert_error(body: &Value, code: u16) {
    assert_eq!(body["error"]["code"], code, "{body}");
    assert!(body["error"]["message"].is_string(), "{body}");
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_vm() {
    let app = TestApp::new();
    let body = json!({
        "vcpus": 2,
        "memory": 4096,
        "disk_size": 20,
        "base_image": app.base_image(),
        "cpu_pinning": {"cores": [0, 1]},
    });

    let (status, json) = app.post_json("/vms", body.to_string()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "running");
    assert_eq!(json["vcpus"], 2);
    assert_eq!(json["memory"], 4096);
    assert_eq!(json["disk_size"], 20);
    assert_eq!(json["message"], "VM successfully created and storage cloned");

    let vm_id = json["vm_id"].as_str().unwrap();
    assert!(json["disk_file"].as_str().unwrap().contains(vm_id));
    assert!(json["mac_address"].as_str().unwrap().starts_with("00:16:3e:"));
    assert_eq!(app.mock.domain_count(), 1);
}

#[tokio::test]
async fn test_create_missing_base_image() {
    let app = TestApp::new();
    let missing = app.dir.path().join("missing.qcow2");
    let body = json!({
        "vcpus": 1,
        "memory": 512,
        "disk_size": 10,
        "base_image": missing,
    });

    let (status, json) = app.post_json("/vms", body.to_string()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&json, 404);
    assert_eq!(
        json["error"]["message"],
        format!("Base image not found: {}", missing.display())
    );
    assert!(app.mock.calls().is_empty());
}

#[tokio::test]
async fn test_create_malformed_json() {
    let app = TestApp::new();
    let (status, json) = app.post_json("/vms", "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, 400);
}

#[tokio::test]
async fn test_create_wrong_field_type() {
    let app = TestApp::new();
    let body = json!({
        "vcpus": "two",
        "memory": 512,
        "disk_size": 10,
        "base_image": app.base_image(),
    });
    let (status, json) = app.post_json("/vms", body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, 400);
}

#[tokio::test]
async fn test_create_zero_vcpus() {
    let app = TestApp::new();
    let body = json!({
        "vcpus": 0,
        "memory": 512,
        "disk_size": 10,
        "base_image": app.base_image(),
    });
    let (status, json) = app.post_json("/vms", body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, 400);
    assert!(app.mock.calls().is_empty());
}

#[tokio::test]
async fn test_create_without_content_type() {
    let app = TestApp::new();
    let (status, json) = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/vms")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, 400);
}

#[tokio::test]
async fn test_create_hypervisor_failure_hides_cause() {
    let app = TestApp::new();
    app.mock.fail_on(GatewayOp::Start);
    let body = json!({
        "vcpus": 1,
        "memory": 512,
        "disk_size": 10,
        "base_image": app.base_image(),
    });

    let (status, json) = app.post_json("/vms", body.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json,
        json!({"error": {"code": 500, "message": "Internal server error"}})
    );
    // Rolled back.
    assert_eq!(app.mock.domain_count(), 0);
}

#[tokio::test]
async fn test_create_survives_client_disconnect() {
    let app = TestApp::new();
    app.mock.delay_on(GatewayOp::Start, Duration::from_millis(500));
    let body = json!({
        "vcpus": 1,
        "memory": 512,
        "disk_size": 10,
        "base_image": app.base_image(),
    });
    let request = Request::builder()
        .method(Method::POST)
        .uri("/vms")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let dropped =
        tokio::time::timeout(Duration::from_millis(100), app.router.clone().oneshot(request)).await;
    assert!(dropped.is_err());

    for _ in 0..200 {
        if app.mock.count(GatewayOp::Start) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.mock.count(GatewayOp::Start), 1);
    assert_eq!(app.mock.domain_count(), 1);
    assert_eq!(app.mock.count(GatewayOp::Undefine), 0);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_vm() {
    let app = TestApp::new();
    app.mock
        .insert_domain(FIXED_ID.parse().unwrap(), "vm", DomainState::Running);

    let (status, json) = app.delete(&format!("/vms/{FIXED_ID}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["vm_id"], FIXED_ID);
    assert_eq!(json["status"], "deleted");
    assert_eq!(json["message"], "VM successfully deleted");
    assert!(json["disk_file"]
        .as_str()
        .unwrap()
        .ends_with(&format!("{FIXED_ID}.qcow2")));
    assert_eq!(app.mock.count(GatewayOp::Undefine), 1);
}

#[tokio::test]
async fn test_delete_unknown_vm() {
    let app = TestApp::new();
    let (status, json) = app.delete(&format!("/vms/{FIXED_ID}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        json,
        json!({"error": {"code": 404, "message": "VM not found"}})
    );
}

#[tokio::test]
async fn test_delete_invalid_id() {
    let app = TestApp::new();
    let (status, json) = app.delete("/vms/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, 400);
    assert!(app.mock.calls().is_empty());
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_vm_status() {
    let app = TestApp::new();
    app.mock
        .insert_domain(FIXED_ID.parse().unwrap(), "web-1", DomainState::Running);

    let (status, json) = app.get(&format!("/vms/{FIXED_ID}/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "vm_id": FIXED_ID,
            "name": "web-1",
            "status": "running",
            "message": "VM web-1 is running",
        })
    );
}

#[tokio::test]
async fn test_vm_status_stopped() {
    let app = TestApp::new();
    app.mock
        .insert_domain(FIXED_ID.parse().unwrap(), "web-1", DomainState::Shutoff);

    let (status, json) = app.get(&format!("/vms/{FIXED_ID}/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "stopped");
    assert_eq!(json["message"], "VM web-1 is stopped");
}

#[tokio::test]
async fn test_vm_status_unknown_vm() {
    let app = TestApp::new();
    let (status, json) = app.get(&format!("/vms/{FIXED_ID}/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["message"], "VM not found");
}

#[tokio::test]
async fn test_vm_status_invalid_id() {
    let app = TestApp::new();
    let (status, json) = app.get("/vms/1234/status").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, 400);
}

#[tokio::test]
async fn test_vm_status_connect_failure() {
    let app = TestApp::new();
    app.mock.fail_on(GatewayOp::Connect);
    let (status, json) = app.get(&format!("/vms/{FIXED_ID}/status")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["message"], "Internal server error");
}

// ============================================================================
// Lifecycle and health
// ============================================================================

#[tokio::test]
async fn test_create_status_delete_roundtrip() {
    let app = TestApp::new();
    let body = json!({
        "vcpus": 1,
        "memory": 1024,
        "disk_size": 8,
        "base_image": app.base_image(),
        "io_limits": {"iops": 1000},
    });
    let (status, created) = app.post_json("/vms", body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED);
    let vm_id = created["vm_id"].as_str().unwrap().to_string();

    let (status, report) = app.get(&format!("/vms/{vm_id}/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "running");

    let (status, deleted) = app.delete(&format!("/vms/{vm_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["disk_file"], created["disk_file"]);

    let (status, _) = app.get(&format!("/vms/{vm_id}/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, json) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_health_disabled() {
    let app = TestApp::with_healthcheck(false);
    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
