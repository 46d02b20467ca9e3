use crate::errors::ApiError;
use crate::logging::audit_request;
use crate::models::{ApiResponse, ErrorResponse, QueryResponse, UserQuery};
use crate::services::{process_query, McpHub};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use tokio::time;
use tracing::Instrument;

// Route handler for POST /mcpcall which answers the query with the tools of the given MCP servers
pub(crate) async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<UserQuery>, JsonRejection>,
) -> (StatusCode, Json<ApiResponse>) {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            tracing::warn!("Rejected request body: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(
                    ErrorResponse {
                        detail: rejection.body_text(),
                    }
                    .into(),
                ),
            );
        }
    };

    let request_id = uuid::Uuid::new_v4().to_string();
    audit_request(
        "POST",
        "/mcpcall",
        &request_id,
        serde_json::to_value(&payload).ok().as_ref(),
    );

    let span = tracing::info_span!("mcpcall", request_id = %request_id);
    async move {
        let gateway = &state.config.settings.gateway;
        let mut hub =
            McpHub::connect_sse_servers(&payload.mcp_config, &gateway.transport_options()).await;
        tracing::info!(
            "{} of {} MCP servers connected",
            hub.servers().len(),
            payload.mcp_config.len()
        );

        // Only answering is time-bounded, connecting is not
        let outcome = time::timeout(
            state.config.request_timeout(),
            process_query(
                &payload.query,
                &hub,
                state.llm.as_ref(),
                gateway.max_tool_rounds,
            ),
        )
        .await
        .unwrap_or(Err(ApiError::Timeout));

        hub.shutdown().await;

        match outcome {
            Ok(response) => (
                StatusCode::OK,
                Json(QueryResponse { response }.into()),
            ),
            Err(err) => {
                tracing::error!("Error processing query: {}", err);
                (
                    err.status_code(),
                    Json(
                        ErrorResponse {
                            detail: err.to_string(),
                        }
                        .into(),
                    ),
                )
            }
        }
    }
    .instrument(span)
    .await
}
