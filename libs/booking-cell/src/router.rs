use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use availability_cell::SlotCache;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

/// Shared state for the booking routes. The slot cache is the same
/// instance the availability cell serves from, so creation can
/// invalidate the affected calendar/day.
pub struct BookingState {
    pub config: AppConfig,
    pub slot_cache: SlotCache,
}

pub fn booking_routes(state: Arc<BookingState>) -> Router {
    let config = Arc::new(state.config.clone());

    let protected_routes = Router::new()
        .route("/", post(handlers::create_booking))
        .route("/search", get(handlers::search_bookings))
        .route("/{booking_id}", get(handlers::get_booking))
        .route(
            "/{booking_id}/status",
            get(handlers::get_booking_status).patch(handlers::transition_booking_status),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

/// Provider callbacks are mounted outside the JWT middleware; the
/// payment handler validates amounts against stored snapshots instead.
pub fn webhook_routes(state: Arc<BookingState>) -> Router {
    Router::new()
        .route("/payment", post(handlers::payment_webhook))
        .with_state(state)
}
