//! The HTTP/WebSocket gateway (C11) — builds the axum router, wiring auth,
//! CORS, rate limiting, and tracing around the session/process/changes
//! endpoints and the event-bus WebSocket.

pub mod auth;
pub mod process;
pub mod sessions;
pub mod ws;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router: public endpoints (just the websocket upgrade)
/// merged with auth-gated API routes, wrapped in CORS, rate limiting, and
/// request tracing.
pub fn router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state);

    let protected = Router::new()
        .route("/api/sessions", get(sessions::list_sessions).post(sessions::create_session))
        .route("/api/sessions/:id", get(sessions::get_session).delete(sessions::delete_session))
        .route("/api/sessions/:id/title", post(sessions::rename_session))
        .route("/api/sessions/:id/process", post(process::process))
        .route("/api/sessions/:id/input", post(process::input))
        .route("/api/sessions/:id/respond", post(process::respond))
        .route(
            "/api/sessions/:id/changes",
            get(process::get_changes).post(process::apply_changes),
        )
        .route("/api/sessions/:id/cancel-workers", post(process::cancel_session_workers))
        .route("/api/cancel", post(process::cancel))
        .route("/api/yolo", post(process::set_yolo))
        .route("/api/status", get(process::status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_token));

    let public = Router::new().route("/ws", get(ws::ws_handler));

    let app = protected.merge(public).layer(cors_layer).layer(TraceLayer::new_for_http());

    // Per-IP token-bucket rate limiting. Absent `[server.rate_limit]` disables it.
    let governor_layer = state.config.server.rate_limit.as_ref().map(|rl| {
        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second as u64)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");
        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );
        GovernorLayer { config: Arc::new(gov_config) }
    });

    match governor_layer {
        Some(governor) => app.layer(governor).with_state(state),
        None => app.with_state(state),
    }
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may carry a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`), expanded into a predicate that matches any
/// port on that host. A literal `"*"` allows all origins.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let origins = &state.config.server.cors.allowed_origins;

    if origins.len() == 1 && origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();
    for origin in origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            wildcard_prefixes.push(prefix.to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
