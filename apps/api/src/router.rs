use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};

use availability_cell::{availability_routes, AvailabilityState, SlotCache};
use booking_cell::{booking_routes, webhook_routes, BookingState};
use shared_config::AppConfig;

pub fn create_router(config: AppConfig) -> Router {
    // One slot cache per process, shared between the availability and
    // booking cells so creation invalidates what availability serves.
    let slot_cache = SlotCache::new(
        Duration::from_secs(config.scheduling.availability_cache_ttl_secs),
        config.scheduling.availability_cache_capacity,
    );

    let availability_state = Arc::new(AvailabilityState {
        config: config.clone(),
        cache: slot_cache.clone(),
    });
    let booking_state = Arc::new(BookingState {
        config,
        slot_cache,
    });

    Router::new()
        .route("/", get(|| async { "Notary booking API is running!" }))
        .nest("/api/availability", availability_routes(availability_state))
        .nest("/api/bookings", booking_routes(booking_state.clone()))
        .nest("/api/webhooks", webhook_routes(booking_state))
}
