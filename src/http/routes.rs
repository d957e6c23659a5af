//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::lobby::StartMatchError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_handler))
        .route("/join-info", get(join_info_handler))
        .route("/match/start", post(start_match_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    lobby_players: usize,
    active_matches: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        lobby_players: state.lobby.roster_size(),
        active_matches: state.match_registry.active_matches(),
    })
}

// ============================================================================
// Join info (rendered as a QR code by the host screen)
// ============================================================================

#[derive(Serialize)]
struct JoinInfoResponse {
    /// URL to open on a phone to join the room
    join_url: String,
    /// WebSocket endpoint behind it
    ws_url: String,
    players_joined: usize,
}

async fn join_info_handler(State(state): State<AppState>) -> Json<JoinInfoResponse> {
    let base = &state.config.public_base_url;
    let ws_url = format!(
        "{}/ws",
        base.replace("https://", "wss://").replace("http://", "ws://")
    );

    Json(JoinInfoResponse {
        join_url: base.clone(),
        ws_url,
        players_joined: state.lobby.roster_size(),
    })
}

// ============================================================================
// Match start (HTTP alternative to the start_match WebSocket message)
// ============================================================================

#[derive(Deserialize)]
struct StartMatchRequest {
    turn_duration_secs: Option<u32>,
    #[serde(default)]
    vs_bot: bool,
}

#[derive(Serialize)]
struct StartMatchResponse {
    match_id: Uuid,
}

async fn start_match_handler(
    State(state): State<AppState>,
    Json(req): Json<StartMatchRequest>,
) -> Result<Json<StartMatchResponse>, AppError> {
    let match_id = state
        .lobby
        .start_match(req.turn_duration_secs, req.vs_bot)?;

    Ok(Json(StartMatchResponse { match_id }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StartMatchError> for AppError {
    fn from(e: StartMatchError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
