//! Orchestrator behavior: retry-once on 401, transparent refresh, startup
//! adoption and logout

use axum::extract::Form;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use reqwest::Method;
use serde_json::json;
use signbridge_auth::{AuthError, CredentialSource, Orchestrator, OrchestratorConfig};
use std::collections::HashMap;
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

fn simple_auth_routes() -> Router {
    Router::new()
        .route(
            "/api/authorize/access_token",
            post(|| async {
                Json(json!({
                    "access_token": "tok",
                    "refresh_token": "r1",
                    "expires_in": 3600
                }))
            }),
        )
        .route(
            "/api/user/me",
            get(|| async { Json(json!({ "userTypeId": 1 })) }),
        )
}

// A 401 triggers exactly one re-authentication and retry
#[tokio::test]
async fn unauthorized_response_is_retried_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let display_hits = hits.clone();

    let router = simple_auth_routes().route(
        "/api/display",
        get(move || {
            let hits = display_hits.clone();
            async move {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    StatusCode::UNAUTHORIZED.into_response()
                } else {
                    Json(json!([{ "displayId": 1, "display": "Lobby" }])).into_response()
                }
            }
        }),
    );
    let base = spawn_server(router).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
    orchestrator.login(None).await.unwrap();

    let response = orchestrator
        .request(Method::GET, "/api/display")
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

// A second 401 after forced re-authentication is terminal
#[tokio::test]
async fn persistent_unauthorized_is_a_terminal_error() {
    let router = simple_auth_routes().route(
        "/api/display",
        get(|| async { StatusCode::UNAUTHORIZED }),
    );
    let base = spawn_server(router).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
    orchestrator.login(None).await.unwrap();

    match orchestrator.request(Method::GET, "/api/display").await {
        Err(AuthError::CredentialInvalid { .. }) => {}
        other => panic!("expected CredentialInvalid, got {:?}", other.map(|r| r.status())),
    }
}

// A near-expiry stored token is refreshed transparently before the call
#[tokio::test]
async fn near_expiry_token_is_refreshed_before_the_call() {
    let refreshes = Arc::new(AtomicUsize::new(0));
    let refresh_hits = refreshes.clone();

    let router = Router::new()
        .route(
            "/api/authorize/access_token",
            post(move |Form(params): Form<HashMap<String, String>>| {
                let refreshes = refresh_hits.clone();
                async move {
                    match params.get("grant_type").map(String::as_str) {
                        // 100 s of validity is inside the 300 s margin, so the
                        // next call must refresh
                        Some("password") => Json(json!({
                            "access_token": "tok1",
                            "refresh_token": "r1",
                            "expires_in": 100
                        })),
                        Some("refresh_token") => {
                            assert_eq!(params.get("refresh_token").map(String::as_str), Some("r1"));
                            refreshes.fetch_add(1, Ordering::SeqCst);
                            Json(json!({
                                "access_token": "tok2",
                                "refresh_token": "r2",
                                "expires_in": 3600
                            }))
                        }
                        other => panic!("unexpected grant_type {:?}", other),
                    }
                }
            }),
        )
        .route(
            "/api/user/me",
            get(|| async { Json(json!({ "userTypeId": 1 })) }),
        )
        .route(
            "/api/display",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if auth == "Bearer tok2" {
                    Json(json!([])).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        );
    let base = spawn_server(router).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
    orchestrator.login(None).await.unwrap();

    let response = orchestrator
        .request(Method::GET, "/api/display")
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(refreshes.load(Ordering::SeqCst) >= 1);
    assert_eq!(
        orchestrator.valid_access_token().await.unwrap().as_deref(),
        Some("tok2")
    );
}

// A process restart adopts the persisted record without re-authenticating
#[tokio::test]
async fn startup_adopts_a_persisted_record() {
    let router = simple_auth_routes();
    let base = spawn_server(router).await;
    let dir = tempfile::tempdir().unwrap();

    {
        let orchestrator =
            Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
        orchestrator.login(None).await.unwrap();
    }

    // New orchestrator, same data dir: the record is adopted on startup
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
    let status = orchestrator.startup().await.unwrap();
    assert!(status.is_authenticated);
    assert_eq!(status.mode, CredentialSource::UserTokens);
    assert_eq!(
        orchestrator.valid_access_token().await.unwrap().as_deref(),
        Some("tok")
    );

    // Permissions were re-resolved from the identity probe
    let operations = orchestrator.available_operations().await;
    assert!(operations.contains("settings.edit"));
}

// A wrong passphrase makes the persisted record unreadable, not fatal
#[tokio::test]
async fn startup_with_wrong_passphrase_reads_as_unauthenticated() {
    let router = simple_auth_routes();
    let base = spawn_server(router).await;
    let dir = tempfile::tempdir().unwrap();

    {
        let orchestrator =
            Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();
        orchestrator.login(None).await.unwrap();
    }

    let mut config = test_config(&base, dir.path().to_path_buf());
    config.passphrase = "a-different-passphrase".into();
    let orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.startup().await.unwrap();

    // The sealed tokens cannot be opened; the store reads as empty
    assert_eq!(orchestrator.valid_access_token().await.unwrap(), None);
}

// The background refresh task follows login and logout
#[tokio::test]
async fn refresh_task_lifecycle() {
    let router = simple_auth_routes();
    let base = spawn_server(router).await;

    let dir = tempfile::tempdir().unwrap();
    let orchestrator =
        Orchestrator::new(test_config(&base, dir.path().to_path_buf())).unwrap();

    assert!(!orchestrator.refresh_task_running().await);
    orchestrator.login(None).await.unwrap();
    assert!(orchestrator.refresh_task_running().await);

    orchestrator.logout().await.unwrap();
    assert!(!orchestrator.refresh_task_running().await);

    let status = orchestrator.auth_status().await;
    assert!(!status.is_authenticated);
    assert!(!dir.path().join("credentials/alice.json").exists());
}
