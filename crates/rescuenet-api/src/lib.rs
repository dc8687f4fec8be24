//! RescueNet HTTP API.
//!
//! Exposes the dispatch engine over JSON. Callers identify themselves with
//! the `x-user-id` header.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the full route tree over `state`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/requests", routes::requests::router())
        .nest("/api/v1/assignments", routes::assignments::router())
        .with_state(state)
}
