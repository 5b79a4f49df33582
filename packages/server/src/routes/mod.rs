mod campaign;
mod claims;
mod eligibility;
mod estimate;
mod health;
mod verify;
pub mod ws;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` sub-router with all API routes.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(campaign::router())
        .merge(eligibility::router())
        .merge(estimate::router())
        .merge(verify::router())
        .merge(claims::router())
        .with_state(state)
}
