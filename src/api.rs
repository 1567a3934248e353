//! REST API server for the financial planning assistant
//!
//! Exposes the chat engine and profile store via HTTP endpoints.
//! Integrates with frontend UI.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::engine::{ChatEngine, ChatTurn, PreviousMessage};
use crate::models::FinancialSnapshot;
use crate::profile::{ProfileStore, UserProfile};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_message: String,
    /// Raw input before any client-side rewriting
    pub original_user_message: Option<String>,
    #[serde(default)]
    pub previous_messages: Vec<PreviousMessage>,
    pub financial_parameters: Option<FinancialSnapshot>,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
}

/// =============================
/// Response Models
/// =============================

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ChatErrorResponse {
    pub error: String,
    pub details: String,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ChatEngine>,
    pub profiles: Arc<ProfileStore>,
}

/// =============================
/// Helpers — String → Uuid
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, (StatusCode, Json<ChatErrorResponse>)> {
    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user");
    let conversation_id = parse_or_stable_uuid(
        req.conversation_id.as_deref(),
        req.user_id.as_deref().unwrap_or("anonymous-user"),
    );

    info!(
        "chat_handler ids => conversation_id={} user_id={}",
        conversation_id, user_id
    );

    let turn = ChatTurn {
        user_id,
        conversation_id,
        user_message: req.user_message,
        original_user_message: req.original_user_message,
        previous_messages: req.previous_messages,
        financial_parameters: req.financial_parameters,
    };

    match state.engine.handle_turn(turn).await {
        Ok(response) => Ok(Json(ChatResponse { response })),
        Err(e) => {
            error!("Chat turn failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatErrorResponse {
                    error: "Failed to process the request".to_string(),
                    details: e.to_string(),
                }),
            ))
        }
    }
}

/// =============================
/// Profile Endpoints
/// =============================

async fn get_profile(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> std::result::Result<Json<UserProfile>, (StatusCode, Json<ChatErrorResponse>)> {
    let user_id = parse_or_stable_uuid(Some(&user_id), "anonymous-user");

    match state.profiles.get_profile(user_id).await {
        Ok(Some(profile)) => Ok(Json(profile)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ChatErrorResponse {
                error: "Profile not found".to_string(),
                details: format!("No profile stored for user {}", user_id),
            }),
        )),
        Err(e) => {
            error!("Profile load failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatErrorResponse {
                    error: "Failed to load profile".to_string(),
                    details: e.to_string(),
                }),
            ))
        }
    }
}

async fn put_profile(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(mut profile): Json<UserProfile>,
) -> std::result::Result<StatusCode, (StatusCode, Json<ChatErrorResponse>)> {
    // Path id wins over any id in the body.
    profile.id = parse_or_stable_uuid(Some(&user_id), "anonymous-user");

    match state.profiles.upsert_profile(profile).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            error!("Profile save failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatErrorResponse {
                    error: "Failed to save profile".to_string(),
                    details: e.to_string(),
                }),
            ))
        }
    }
}

/// =============================
/// Financial Snapshot Endpoints
/// =============================

async fn get_financials(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> std::result::Result<Json<FinancialSnapshot>, (StatusCode, Json<ChatErrorResponse>)> {
    let user_id = parse_or_stable_uuid(Some(&user_id), "anonymous-user");

    match state.profiles.get_snapshot(user_id).await {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Ok(Json(FinancialSnapshot::sample())),
        Err(e) => {
            error!("Financial snapshot load failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatErrorResponse {
                    error: "Failed to load financial data".to_string(),
                    details: e.to_string(),
                }),
            ))
        }
    }
}

async fn put_financials(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(snapshot): Json<FinancialSnapshot>,
) -> std::result::Result<StatusCode, (StatusCode, Json<ChatErrorResponse>)> {
    let user_id = parse_or_stable_uuid(Some(&user_id), "anonymous-user");

    match state.profiles.upsert_snapshot(user_id, snapshot).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            error!("Financial snapshot save failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatErrorResponse {
                    error: "Failed to save financial data".to_string(),
                    details: e.to_string(),
                }),
            ))
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(engine: Arc<ChatEngine>, profiles: Arc<ProfileStore>) -> Router {
    let state = ApiState { engine, profiles };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/profile/:user_id", get(get_profile))
        .route("/api/profile/:user_id", put(put_profile))
        .route("/api/profile/:user_id/financials", get(get_financials))
        .route("/api/profile/:user_id/financials", put(put_financials))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    engine: Arc<ChatEngine>,
    profiles: Arc<ProfileStore>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(engine, profiles);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
