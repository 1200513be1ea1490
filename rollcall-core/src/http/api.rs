//! API routes definition

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Identity link round trip
        .route("/auth/start", get(handlers::auth_start))
        .route("/auth/callback", get(handlers::auth_callback))
        // Platform events
        .route("/events/member-join", post(handlers::member_join))
        .with_state(state)
}
