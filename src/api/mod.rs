// src/api/mod.rs - HTTP surface of the matching service
pub mod dto;
pub mod handlers;
pub mod middleware;

use axum::http::{header, HeaderName, Method};
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::matching::MatchingService;
use crate::utils::config::ServerConfig;
use middleware::FixedWindowLimiter;

#[derive(Clone)]
pub struct AppState {
    pub service: MatchingService,
    pub config: Arc<ServerConfig>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub started: Instant,
}

impl AppState {
    pub fn new(service: MatchingService, config: ServerConfig) -> Self {
        Self {
            service,
            limiter: Arc::new(FixedWindowLimiter::new(config.rate_limit_per_minute)),
            config: Arc::new(config),
            started: Instant::now(),
        }
    }
}

/// Build the full router. `/health` stays public; matching routes sit
/// behind the auth and rate-limit guard.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
        .allow_origin(Any);

    let protected = Router::new()
        .route("/match", post(handlers::match_company))
        .route("/batch", post(handlers::match_batch))
        .route_layer(axum_mw::from_fn_with_state(state.clone(), middleware::guard));

    let public = Router::new().route("/health", get(handlers::health));

    public
        .merge(protected)
        .layer(axum_mw::from_fn(middleware::request_logging))
        .layer(cors)
        .with_state(state)
}
