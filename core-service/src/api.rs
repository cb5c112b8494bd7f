//! HTTP control surface.
//!
//! One route per lifecycle operation of the session registry, plus account
//! linking and the browser-extension playback report. Every failure is
//! answered with `{"success": false, "error": "..."}`.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use bridge_traits::{MessagingStatus, PlaybackSnapshot, TrackInfo};
use chrono::{DateTime, Utc};
use core_auth::UserId;
use core_sync::{PlaybackOrigin, Session};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::{CoreService, Result};

/// Build the router over a bootstrapped service.
pub fn router(service: CoreService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync/start/:user_id", post(start_sync))
        .route("/sync/stop/:user_id", post(stop_sync))
        .route("/sync/status/:user_id", get(sync_status))
        .route("/sync/list", get(list_sessions))
        .route("/sync/reset/:user_id", post(reset_sync))
        .route("/sync/original-status/:user_id", put(set_original_status))
        .route("/sync/now-playing/:user_id", post(report_now_playing))
        .route("/accounts/:user_id", axum::routing::delete(unlink_accounts))
        .route("/accounts/:user_id/messaging", put(link_messaging))
        .route("/accounts/:user_id/playback", put(link_playback))
        .with_state(service)
}

fn parse_user(raw: &str) -> Result<UserId> {
    Ok(UserId::new(raw)?)
}

// ============================================================================
// Bodies
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct StartQuery {
    source: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackBody {
    pub name: String,
    pub artists: Vec<String>,
}

impl From<&TrackInfo> for TrackBody {
    fn from(track: &TrackInfo) -> Self {
        Self {
            name: track.name.clone(),
            artists: track.artists.clone(),
        }
    }
}

/// Response of `GET /sync/status/:user_id`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    /// A worker task is still alive.
    pub running: bool,
    /// The session is in the `running` state.
    pub active: bool,
    pub state: Option<String>,
    pub current_track: Option<TrackBody>,
    pub last_update: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub last_error: Option<String>,
}

impl StatusBody {
    fn absent() -> Self {
        Self {
            running: false,
            active: false,
            state: None,
            current_track: None,
            last_update: None,
            error_count: 0,
            last_error: None,
        }
    }

    fn from_session(session: &Session, running: bool) -> Self {
        Self {
            running,
            active: session.is_running(),
            state: Some(session.state.to_string()),
            current_track: session.current_track.as_ref().map(TrackBody::from),
            last_update: Some(session.last_update),
            error_count: session.consecutive_errors,
            last_error: session.last_error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    user_id: String,
    session_id: String,
    origin: PlaybackOrigin,
    started_at: DateTime<Utc>,
    current_track: Option<TrackBody>,
    error_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagingLinkBody {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackLinkBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OriginalStatusBody {
    #[serde(default)]
    text: String,
    #[serde(default)]
    icon: String,
}

/// What the browser extension reports for the active tab.
#[derive(Debug, Deserialize)]
struct NowPlayingBody {
    playing: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    site: Option<String>,
}

impl NowPlayingBody {
    fn into_snapshot(self) -> PlaybackSnapshot {
        if !self.playing {
            return PlaybackSnapshot::not_playing();
        }

        let title = self
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let artists = self
            .artist
            .filter(|artist| !artist.trim().is_empty() && artist != "Unknown");

        PlaybackSnapshot::playing(TrackInfo::new(title.trim(), artists))
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(service): State<CoreService>) -> Json<Value> {
    let sessions = service.registry().list().await.len();
    Json(json!({ "status": "ok", "activeSessions": sessions }))
}

async fn start_sync(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
    Query(query): Query<StartQuery>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    let origin = match query.source.as_deref() {
        Some(source) => source.parse::<PlaybackOrigin>()?,
        None => PlaybackOrigin::default(),
    };

    let session_id = service.registry().start(&user, origin).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Sync started for user {}", user),
        "sessionId": session_id.to_string(),
        "source": origin,
    })))
}

async fn stop_sync(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    service.registry().stop(&user).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Sync stopped for user {}", user),
    })))
}

async fn sync_status(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
) -> Result<Json<StatusBody>> {
    let user = parse_user(&user_id)?;
    let registry = service.registry();

    let body = match registry.status(&user).await {
        Some(session) => StatusBody::from_session(&session, registry.is_live(&user).await),
        None => StatusBody::absent(),
    };
    Ok(Json(body))
}

async fn list_sessions(State(service): State<CoreService>) -> Json<Value> {
    let sessions: Vec<SessionSummary> = service
        .registry()
        .list()
        .await
        .iter()
        .map(|session| SessionSummary {
            user_id: session.user_id.to_string(),
            session_id: session.session_id.to_string(),
            origin: session.origin,
            started_at: session.started_at,
            current_track: session.current_track.as_ref().map(TrackBody::from),
            error_count: session.consecutive_errors,
        })
        .collect();

    Json(json!({ "count": sessions.len(), "activeSessions": sessions }))
}

async fn reset_sync(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    service.registry().reset(&user).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Sync state reset for user {}", user),
    })))
}

async fn set_original_status(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
    Json(body): Json<OriginalStatusBody>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    service
        .registry()
        .set_original_status(&user, MessagingStatus::new(body.text, body.icon))
        .await?;

    Ok(Json(json!({ "success": true })))
}

async fn report_now_playing(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
    Json(body): Json<NowPlayingBody>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    debug!(user_id = %user, site = ?body.site, playing = body.playing, "Playback reported");

    service
        .reported_playback()
        .report(user.as_str(), body.into_snapshot());

    Ok(Json(json!({ "success": true })))
}

async fn link_messaging(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
    Json(body): Json<MessagingLinkBody>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    service
        .credentials()
        .link_messaging(&user, &body.access_token)
        .await?;

    Ok(Json(json!({ "success": true })))
}

async fn link_playback(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
    Json(body): Json<PlaybackLinkBody>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    service
        .credentials()
        .link_playback(&user, &body.access_token, body.refresh_token.as_deref())
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// Stops any running sync before the tokens disappear.
async fn unlink_accounts(
    State(service): State<CoreService>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    let user = parse_user(&user_id)?;
    service.registry().stop(&user).await?;
    service.reported_playback().forget(user.as_str());
    service.credentials().unlink(&user).await?;

    Ok(Json(json!({ "success": true })))
}
