//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::ws::ws_handler;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let mut v1: Router<AppState> = Router::new().route("/ws", get(ws_handler));

    // In-process producer for manual testing
    if state.auth.is_dev_mode() {
        tracing::warn!("Dev mode: mounting POST /v1/dev/notify/{{user_id}}");
        v1 = v1.route("/dev/notify/{user_id}", post(handlers::dev_notify));
    }

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .nest("/v1", v1)
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}

/// Build the CORS layer based on configuration.
///
/// With no configured origins any origin is allowed, matching the realtime
/// endpoint's origin check.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let allowed_origins = state.auth.allowed_origins();

    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin
                .trim_end_matches('/')
                .parse::<HeaderValue>()
                .ok()
                .or_else(|| {
                    tracing::warn!("CORS: Invalid origin in config: {}", origin);
                    None
                })
        })
        .collect();

    if origins.is_empty() {
        tracing::error!("CORS: All configured origins are invalid!");
        CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")))
    } else {
        tracing::info!("CORS: Allowing {} origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
    }
}
