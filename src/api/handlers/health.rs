use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};

/// Health check endpoint reporting the configured model
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let health_status = serde_json::json!({
        "status": "ok",
        "model": state.config.settings.openai.model,
        "timestamp": chrono::Utc::now()
    });

    (StatusCode::OK, Json(health_status))
}
