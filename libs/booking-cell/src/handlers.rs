use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Actor, BookingError, BookingSearchQuery, BookingStatus, CreateBookingRequest,
    CreateBookingResponse, PaymentWebhookPayload, TransitionStatusRequest,
};
use crate::router::BookingState;
use crate::services::automation::BookingAutomationService;
use crate::services::booking::BookingService;

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::NotFound => AppError::NotFound("Booking not found".to_string()),
        BookingError::SlotUnavailable => AppError::Conflict(
            "Selected time is no longer available. Please pick a different time.".to_string(),
        ),
        BookingError::InvalidService(service) => {
            AppError::NotFound(format!("Service not found or inactive: {}", service))
        }
        BookingError::InvalidTransition { from, to } => {
            AppError::Conflict(format!("Invalid status transition from {} to {}", from, to))
        }
        BookingError::ConcurrentUpdate => AppError::Conflict(
            "Booking was modified concurrently; please retry".to_string(),
        ),
        BookingError::ValidationError(msg) => AppError::BadRequest(msg),
        BookingError::PricingIntegrity { .. } => {
            AppError::BadRequest("Payment amount does not match the booked price".to_string())
        }
        BookingError::CalendarNotMapped(service) => {
            AppError::Internal(format!("No calendar configured for service type {}", service))
        }
        BookingError::DatabaseError(msg) => AppError::Database(msg),
        BookingError::ExternalServiceError(msg) => AppError::ExternalService(msg),
    }
}

fn actor_for(user: &User) -> Actor {
    if user.is_staff() {
        Actor::Staff
    } else {
        Actor::Client
    }
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<BookingState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Clients book for themselves; staff can book on a customer's
    // behalf.
    let is_owner = user.email.as_deref() == Some(request.customer_email.as_str());
    if !is_owner && !user.is_staff() {
        return Err(AppError::Auth(
            "Not authorized to create a booking for this customer".to_string(),
        ));
    }

    let service = BookingService::new(&state.config, state.slot_cache.clone());
    let (booking, breakdown) = service
        .create_booking(request, Some(token))
        .await
        .map_err(map_booking_error)?;

    let response = CreateBookingResponse {
        booking_id: booking.id,
        status: booking.status,
        price_snapshot_cents: booking.price_snapshot_cents,
        deposit_cents: booking.deposit_cents,
        breakdown,
    };

    Ok(Json(json!({
        "success": true,
        "booking": response,
        "message": "Booking created successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = BookingService::new(&state.config, state.slot_cache.clone());

    let booking = service
        .get_booking(booking_id, Some(token))
        .await
        .map_err(map_booking_error)?;

    let is_owner = user.email.as_deref() == Some(booking.customer_email.as_str());
    if !is_owner && !user.is_staff() {
        return Err(AppError::Auth(
            "Not authorized to view this booking".to_string(),
        ));
    }

    Ok(Json(json!(booking)))
}

#[axum::debug_handler]
pub async fn search_bookings(
    State(state): State<Arc<BookingState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<BookingSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Non-staff callers only ever see their own bookings.
    if !user.is_staff() {
        query.customer_email = user.email.clone();
    }

    let service = BookingService::new(&state.config, state.slot_cache.clone());
    let bookings = service
        .search_bookings(query, Some(token))
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "count": bookings.len(),
        "bookings": bookings
    })))
}

#[axum::debug_handler]
pub async fn transition_booking_status(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<TransitionStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let actor = actor_for(&user);

    // Clients get a narrow surface: cancelling their own booking or
    // picking a new slot after a reschedule request. Everything else
    // is staff.
    if actor == Actor::Client
        && !matches!(
            request.target_status,
            BookingStatus::CancelledByClient | BookingStatus::Scheduled
        )
    {
        return Err(AppError::Auth(
            "Clients may only cancel or reschedule their own bookings".to_string(),
        ));
    }

    let automation = BookingAutomationService::new(&state.config, state.slot_cache.clone());

    if actor == Actor::Client {
        let booking = automation
            .booking_service()
            .get_booking(booking_id, Some(token))
            .await
            .map_err(map_booking_error)?;
        if user.email.as_deref() != Some(booking.customer_email.as_str()) {
            return Err(AppError::Auth(
                "Not authorized to modify this booking".to_string(),
            ));
        }
    }

    let outcome = automation
        .transition_booking_status(
            booking_id,
            request.target_status,
            request.reason,
            actor,
            request.scheduled_date_time,
            Some(token),
        )
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "previous_status": outcome.previous_status,
        "new_status": outcome.new_status
    })))
}

#[axum::debug_handler]
pub async fn get_booking_status(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let automation = BookingAutomationService::new(&state.config, state.slot_cache.clone());

    let booking = automation
        .booking_service()
        .get_booking(booking_id, Some(token))
        .await
        .map_err(map_booking_error)?;

    let is_owner = user.email.as_deref() == Some(booking.customer_email.as_str());
    if !is_owner && !user.is_staff() {
        return Err(AppError::Auth(
            "Not authorized to view this booking".to_string(),
        ));
    }

    let report = automation
        .status_report(booking_id, Some(token))
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!(report)))
}

// ==============================================================================
// WEBHOOK HANDLERS
// ==============================================================================

/// Payment provider callback. Unauthenticated at the HTTP layer (the
/// provider signs at the transport edge); amounts are validated
/// against the stored price snapshot before any transition applies.
#[axum::debug_handler]
pub async fn payment_webhook(
    State(state): State<Arc<BookingState>>,
    Json(payload): Json<PaymentWebhookPayload>,
) -> Result<Json<Value>, AppError> {
    let automation = BookingAutomationService::new(&state.config, state.slot_cache.clone());

    let outcome = automation
        .handle_payment_event(payload, None)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "processed": true,
        "transition": outcome
    })))
}
