use axum::Server;
use config::Config;
use std::net::SocketAddr;
use std::sync::Arc;

mod api;
mod config;
mod errors;
mod logging;
mod mcp;
mod models;
mod services;
mod state;

#[cfg(test)]
mod test_support;

/// Result type for API
pub type Result<T> = std::result::Result<T, errors::ApiError>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging
    logging::setup_logging(config.env.log_dir.as_deref())?;
    tracing::info!(
        "Using model {} at {}",
        config.settings.openai.model,
        config.settings.openai.base_url
    );

    // One chat client serves every request
    let llm = Arc::new(services::llm::OpenAiClient::new(&config.settings.openai)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.env.port));
    let app = api::initialize_router(state::AppState::new(config, llm));
    tracing::info!("Server starting on {}", addr);

    Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
