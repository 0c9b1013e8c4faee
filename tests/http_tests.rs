mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{CollectingSink, Script, ScriptedFactory};
use knowva_speech::auth::StaticTokenVerifier;
use knowva_speech::config::Config;
use knowva_speech::http::{create_router, AppState};
use knowva_speech::session::{SessionConfig, TranscriptionSession};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

fn app_state() -> AppState {
    AppState::new(
        Config::default(),
        Arc::new(StaticTokenVerifier::new(HashMap::new())),
        ScriptedFactory::new(Script::default()),
    )
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = get(app_state(), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_list_sessions_empty() {
    let (status, body) = get(app_state(), "/sessions").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 0);
    assert_eq!(json["sessions"], serde_json::json!([]));
}

#[tokio::test]
async fn test_session_status() {
    let state = app_state();
    let session = Arc::new(TranscriptionSession::new(
        "user-1",
        SessionConfig::default(),
        ScriptedFactory::new(Script::default()),
        CollectingSink::new(),
    ));
    state.register(session.clone()).await;

    let (status, body) = get(state.clone(), &format!("/sessions/{}/status", session.id())).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["session_id"], session.id());
    assert_eq!(json["user_id"], "user-1");
    assert_eq!(json["state"], "idle");

    let (_, body) = get(state, "/sessions").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (status, body) = get(app_state(), "/sessions/nope/status").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Session nope not found");
}

#[tokio::test]
async fn test_speech_endpoint_requires_upgrade() {
    let (status, _) = get(app_state(), "/ws/speech").await;

    assert!(status.is_client_error());
}
