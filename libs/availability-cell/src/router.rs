use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;

use crate::handlers;
use crate::services::cache::SlotCache;

/// Shared state for the availability routes. The slot cache is shared
/// with the booking cell, which invalidates entries on creation.
pub struct AvailabilityState {
    pub config: AppConfig,
    pub cache: SlotCache,
}

/// Availability queries are public: prospective customers browse slots
/// before they have an account.
pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    Router::new()
        .route("/", get(handlers::get_availability))
        .with_state(state)
}
