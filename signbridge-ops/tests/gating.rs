//! The capability gate withholds operations locally, before any request

use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use signbridge_auth::{Orchestrator, OrchestratorConfig};
use signbridge_ops::{OpsClient, OpsError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_config(base: &str, data_dir: PathBuf) -> OrchestratorConfig {
    OrchestratorConfig {
        base_url: Url::parse(base).unwrap(),
        username: Some("alice".into()),
        password: Some("hunter2".into()),
        client_id: None,
        client_secret: None,
        passphrase: "test-passphrase".into(),
        data_dir,
        expiry_margin_secs: 300,
        session_hours: 8,
        probe_timeout: Duration::from_secs(2),
        exchange_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
    }
}

fn auth_routes(identity: serde_json::Value) -> Router {
    Router::new()
        .route(
            "/api/authorize/access_token",
            post(|| async {
                Json(json!({ "access_token": "tok", "expires_in": 3600 }))
            }),
        )
        .route("/api/user/me", get(move || {
            let identity = identity.clone();
            async move { Json(identity) }
        }))
}

#[tokio::test]
async fn permitted_operations_reach_the_backend() {
    let router = auth_routes(json!({ "userTypeId": 1 })).route(
        "/api/display",
        get(|| async {
            Json(json!([
                { "displayId": 1, "display": "Lobby", "loggedIn": 1 },
                { "displayId": 2, "display": "Cafeteria" }
            ]))
        }),
    );
    let base = spawn_server(router).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
    orchestrator.login(None).await.unwrap();

    let ops = OpsClient::new(orchestrator);
    let displays = ops.displays().list().await.unwrap();
    assert_eq!(displays.len(), 2);
    assert_eq!(displays[0].display, "Lobby");
    assert_eq!(displays[0].logged_in, Some(1));
}

#[tokio::test]
async fn withheld_operations_fail_before_any_request() {
    let backend_hits = Arc::new(AtomicUsize::new(0));
    let hits = backend_hits.clone();

    // An editor identity: no user administration capability
    let router = auth_routes(json!({ "canEdit": true })).route(
        "/api/user",
        get(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!([]))
            }
        }),
    );
    let base = spawn_server(router).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
    orchestrator.login(None).await.unwrap();

    let ops = OpsClient::new(orchestrator);
    match ops.users().list().await {
        Err(OpsError::NotPermitted { operation }) => {
            assert_eq!(operation, "user.list");
        }
        other => panic!("expected NotPermitted, got {:?}", other.map(|v| v.len())),
    }

    // The gate acted locally: the backend endpoint was never touched
    assert_eq!(backend_hits.load(Ordering::SeqCst), 0);

    // A permitted editor operation passes the gate; the fixture has no
    // display route, so reaching the backend 404 is the proof
    match ops.displays().list().await {
        Ok(_) | Err(OpsError::Backend { .. }) => {}
        Err(other) => panic!("display.list should pass the gate, got {}", other),
    }
}

#[tokio::test]
async fn enveloped_lists_are_tolerated() {
    let router = auth_routes(json!({ "userTypeId": 1 })).route(
        "/api/layout",
        get(|| async {
            Json(json!({ "data": [ { "layoutId": 9, "layout": "Menu board" } ] }))
        }),
    );
    let base = spawn_server(router).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
    orchestrator.login(None).await.unwrap();

    let ops = OpsClient::new(orchestrator);
    let layouts = ops.layouts().list().await.unwrap();
    assert_eq!(layouts.len(), 1);
    assert_eq!(layouts[0].layout, "Menu board");
}
