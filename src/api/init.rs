use crate::state::AppState;
use axum::{
    error_handling::HandleErrorLayer,
    http::{Method, StatusCode},
    routing::{get, post},
    BoxError, Router,
};
use std::time::Duration;
use tower::{buffer::BufferLayer, limit::RateLimitLayer, ServiceBuilder};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use super::{handlers::*, index::index};

/// Seconds to replenish one request of a client's per-IP budget
const PER_IP_REPLENISH_SECONDS: u64 = 1;

pub fn initialize_router(state: AppState) -> Router {
    let error_handler = || {
        ServiceBuilder::new().layer(HandleErrorLayer::new(|err: BoxError| async move {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unhandled error: {}", err),
            )
        }))
    };

    let global_rate_limit = |req_per_sec: u64| {
        ServiceBuilder::new()
            .layer(error_handler())
            .layer(BufferLayer::new(1024))
            .layer(RateLimitLayer::new(req_per_sec.max(1), Duration::from_secs(1)))
    };

    let rate_limit_per_ip = |replenish_seconds: u64, burst: u32| {
        let config = Box::new(
            GovernorConfigBuilder::default()
                .per_second(replenish_seconds)
                .burst_size(burst.max(1))
                .use_headers()
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .expect("rate limit quota is non-zero"),
        );

        ServiceBuilder::new()
            .layer(error_handler())
            .layer(GovernorLayer {
                config: Box::leak(config),
            })
    };

    let cors = |method: Method| {
        ServiceBuilder::new().layer(CorsLayer::new().allow_methods(method).allow_origin(Any))
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().include_headers(true))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let global_limit = state.config.env.global_rate_limit;
    let per_ip_burst = state.config.env.per_ip_burst;

    Router::new()
        // Query route, limited per client
        .route("/mcpcall", post(handle_query))
        .layer(
            global_rate_limit(global_limit)
                .layer(rate_limit_per_ip(PER_IP_REPLENISH_SECONDS, per_ip_burst))
                .layer(cors(Method::POST))
                .layer(CompressionLayer::new().zstd(true)),
        )
        // Base routes
        .route("/", get(|| async { index() }))
        .route("/health", get(health_check))
        // Apply common middleware
        .layer(trace_layer)
        .with_state(state)
}
