use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use datachat_core::agent_loop::{run_turn, AgentConfig};
use datachat_core::assembler::assemble;
use datachat_core::proxy::ToolProxy;
use datachat_core::session::{Session, SessionState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub use_plotting: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub plot_data: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/healthz", get(health))
        .route("/chat", post(chat))
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<&'static str, (StatusCode, String)> {
    match state.session.state() {
        SessionState::Ready => Ok("ok"),
        SessionState::Closed => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "tool session closed".to_string(),
        )),
    }
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let turn_id = uuid::Uuid::new_v4();
    // Per-request key, falling back to the host environment.
    let api_key = body
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();
    let cfg = AgentConfig::new(api_key);
    let proxy = ToolProxy::new(state.session.clone());

    tracing::info!(%turn_id, plotting = body.use_plotting, "chat turn started");
    let raw = run_turn(&proxy, &body.message, &cfg, body.use_plotting)
        .await
        .map_err(|e| {
            tracing::error!(%turn_id, error = %e, "chat turn failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    let reply = assemble(&raw);
    tracing::info!(%turn_id, has_chart = reply.chart.is_some(), "chat turn finished");
    Ok(Json(ChatResponse {
        response: reply.text,
        plot_data: reply.chart,
    }))
}
