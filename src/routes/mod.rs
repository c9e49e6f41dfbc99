//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

pub const API_PREFIX: &str = "/cdb-quizz/v1";

/// Build the application router with:
/// - REST API and the live-session WebSocket under `/cdb-quizz/v1/...`
/// - Static quiz client from `./static` with index fallback
/// - CORS (allow any origin/method/headers), to be narrowed per deployment
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    let api = Router::new()
        .route("/ping", get(http::http_ping))
        .route("/generate", post(http::http_generate))
        .route("/finish", post(http::http_finish))
        .route("/profile/:user", get(http::http_get_profile).put(http::http_put_profile))
        .route("/pronunciation/evaluate", post(http::http_pronunciation_evaluate))
        .route("/pronunciation/audio", post(http::http_pronunciation_audio))
        .route("/ws", get(ws::ws_upgrade));

    Router::new()
        .nest(API_PREFIX, api)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
