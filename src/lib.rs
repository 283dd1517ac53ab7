//! zip2pdf server library
//!
//! Accepts a zipped static site, renders its `index.html` to PDF with
//! headless Chrome and serves the result for download.
//!
//! # Modules
//!
//! - `upload`: intake validation and raw archive storage
//! - `archive`: zip extraction into per-upload working trees
//! - `render`: admission-controlled PDF rendering
//! - `artifact`: artifact ids and the on-disk store
//! - `pipeline`: per-request orchestration and cleanup

pub mod archive;
pub mod artifact;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod routes;
pub mod state;
pub mod upload;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the HTTP application
pub fn app(state: AppState) -> Router {
    let public_dir = state.config().server.public_dir.clone();

    let mut router = Router::new()
        .merge(routes::health::router())
        .merge(routes::upload::router())
        .merge(routes::convert::router());

    if public_dir.is_dir() {
        router = router.fallback_service(ServeDir::new(public_dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
