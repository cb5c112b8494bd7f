//! Route-level tests of the control surface, driven with `oneshot` against
//! an in-memory store and a canned Slack/Spotify HTTP client.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bridge_desktop::SqliteKeyValueStore;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::SystemClock;
use core_runtime::config::CoreConfig;
use core_service::{api, CoreDependencies, CoreService};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Answers like Slack and Spotify would for a user who set "Away" and is
/// not listening to anything.
#[derive(Default)]
struct CannedApis {
    status_updates: Mutex<Vec<Value>>,
}

impl CannedApis {
    fn status_texts(&self) -> Vec<String> {
        self.status_updates
            .lock()
            .unwrap()
            .iter()
            .map(|body| body["profile"]["status_text"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl HttpClient for CannedApis {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        if request.url.ends_with("/users.profile.get") {
            return Ok(HttpResponse::new(
                200,
                r#"{"ok": true, "profile": {"status_text": "Away", "status_emoji": ":palm_tree:"}}"#,
            ));
        }
        if request.url.ends_with("/users.profile.set") {
            let body: Value = serde_json::from_slice(request.body.as_deref().unwrap_or_default())
                .unwrap_or(Value::Null);
            self.status_updates.lock().unwrap().push(body);
            return Ok(HttpResponse::new(200, r#"{"ok": true}"#));
        }
        if request.url.ends_with("/me/player") {
            return Ok(HttpResponse::new(204, ""));
        }
        Ok(HttpResponse::new(404, "not found"))
    }
}

struct TestApp {
    router: Router,
    service: CoreService,
    apis: Arc<CannedApis>,
}

impl TestApp {
    async fn new() -> Self {
        let apis = Arc::new(CannedApis::default());
        let store = SqliteKeyValueStore::in_memory().await.unwrap();
        let deps = CoreDependencies::new(apis.clone(), Arc::new(store), Arc::new(SystemClock));

        let config = CoreConfig::builder().build().unwrap();
        let service = CoreService::bootstrap(config, deps).await.unwrap();

        Self {
            router: api::router(service.clone()),
            service,
            apis,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn link_both(&self, user: &str) {
        let (status, _) = self
            .send(
                "PUT",
                &format!("/accounts/{user}/messaging"),
                Some(json!({ "accessToken": "xoxp-1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = self
            .send(
                "PUT",
                &format!("/accounts/{user}/playback"),
                Some(json!({ "accessToken": "BQD-1", "refreshToken": "AQD-1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn wait_for_state(&self, user: &str, state: &str) -> Value {
        for _ in 0..100 {
            let (_, body) = self.send("GET", &format!("/sync/status/{user}"), None).await;
            if body["state"] == state {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session of {user} never reached {state}");
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;

    let (status, body) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeSessions"], 0);
}

#[tokio::test]
async fn test_start_without_accounts_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.send("POST", "/sync/start/U1", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("messaging and playback"));
}

#[tokio::test]
async fn test_invalid_user_id_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.send("GET", "/sync/status/a%20b", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_source_is_rejected() {
    let app = TestApp::new().await;
    app.link_both("U1").await;

    let (status, _) = app.send("POST", "/sync/start/U1?source=radio", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_status_stop_lifecycle() {
    let app = TestApp::new().await;
    app.link_both("U1").await;

    let (status, body) = app.send("POST", "/sync/start/U1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["source"], "spotify");

    let (_, status_body) = app.send("GET", "/sync/status/U1", None).await;
    assert_eq!(status_body["active"], true);
    assert_eq!(status_body["state"], "running");
    assert_eq!(status_body["errorCount"], 0);
    assert_eq!(status_body["currentTrack"], Value::Null);

    let (_, list) = app.send("GET", "/sync/list", None).await;
    assert_eq!(list["count"], 1);
    assert_eq!(list["activeSessions"][0]["userId"], "U1");

    let (status, body) = app.send("POST", "/sync/stop/U1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let stopped = app.wait_for_state("U1", "stopped").await;
    assert_eq!(stopped["active"], false);
    // Nothing plays, so every publish is the original status.
    let texts = app.apis.status_texts();
    assert!(!texts.is_empty());
    assert!(texts.iter().all(|text| text == "Away"));

    let (_, list) = app.send("GET", "/sync/list", None).await;
    assert_eq!(list["count"], 0);
}

#[tokio::test]
async fn test_stop_without_session_succeeds() {
    let app = TestApp::new().await;

    let (status, body) = app.send("POST", "/sync/stop/U404", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.apis.status_texts().is_empty());
}

#[tokio::test]
async fn test_status_of_unknown_user() {
    let app = TestApp::new().await;

    let (status, body) = app.send("GET", "/sync/status/U404", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["active"], false);
    assert_eq!(body["errorCount"], 0);
}

#[tokio::test]
async fn test_browser_source_needs_only_messaging() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send(
            "PUT",
            "/accounts/U2/messaging",
            Some(json!({ "accessToken": "xoxp-2" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("POST", "/sync/start/U2", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("playback"));

    let (status, body) = app
        .send("POST", "/sync/start/U2?source=browser", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "browser");

    let (status, _) = app
        .send(
            "POST",
            "/sync/now-playing/U2",
            Some(json!({
                "playing": true,
                "title": "Song A",
                "artist": "Artist X",
                "site": "music.youtube.com"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    app.service.shutdown().await;
}

#[tokio::test]
async fn test_original_status_requires_session() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            "PUT",
            "/sync/original-status/U1",
            Some(json!({ "text": "Focus", "icon": ":headphones:" })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_original_status_is_restored_on_stop() {
    let app = TestApp::new().await;
    app.link_both("U1").await;
    app.send("POST", "/sync/start/U1", None).await;

    let (status, _) = app
        .send(
            "PUT",
            "/sync/original-status/U1",
            Some(json!({ "text": "Focus", "icon": ":headphones:" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    app.send("POST", "/sync/stop/U1", None).await;
    app.wait_for_state("U1", "stopped").await;

    assert_eq!(
        app.apis.status_texts().last().map(String::as_str),
        Some("Focus")
    );
}

#[tokio::test]
async fn test_reset_forgets_session() {
    let app = TestApp::new().await;
    app.link_both("U1").await;
    app.send("POST", "/sync/start/U1", None).await;

    let (status, body) = app.send("POST", "/sync/reset/U1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, status_body) = app.send("GET", "/sync/status/U1", None).await;
    assert_eq!(status_body["state"], Value::Null);
    assert_eq!(status_body["running"], false);
}

#[tokio::test]
async fn test_unlink_stops_sync_and_blocks_restart() {
    let app = TestApp::new().await;
    app.link_both("U1").await;
    app.send("POST", "/sync/start/U1", None).await;

    let (status, _) = app.send("DELETE", "/accounts/U1", None).await;
    assert_eq!(status, StatusCode::OK);

    app.wait_for_state("U1", "stopped").await;

    let (status, _) = app.send("POST", "/sync/start/U1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_link_rejects_empty_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            "PUT",
            "/accounts/U1/messaging",
            Some(json!({ "accessToken": "  " })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
