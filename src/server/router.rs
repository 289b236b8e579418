//! Route table for the relay.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::{AppState, handlers, ws};

/// Build the complete router.
///
/// - `GET /` -- service banner with the connection count
/// - `GET /health` -- liveness
/// - `GET /api/last-lines` -- last N lines of the file
/// - `GET /api/file-info` -- path, size and existence of the file
/// - `GET /api/status` -- connections, tailer status and configuration
/// - `GET /ws` -- live line stream
/// - `/static/*` -- files from the configured static directory, if any
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/last-lines", get(handlers::last_lines))
        .route("/api/file-info", get(handlers::file_info))
        .route("/api/status", get(handlers::status))
        .route("/ws", get(ws::ws_handler));

    if let Some(dir) = &state.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
