//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use std::path::Path;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use self::state::AppState;

/// Build the application router: control endpoints at the root path, with
/// the static frontend served for everything else.
pub fn router(state: AppState, public_dir: &Path) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .fallback_service(ServeDir::new(public_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
