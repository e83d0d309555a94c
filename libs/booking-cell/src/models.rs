use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pricing_cell::{AddOn, PriceBreakdown, ServiceType};

// ==============================================================================
// CORE BOOKING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub service_type: ServiceType,
    /// Nullable until the appointment is pinned to a slot.
    pub scheduled_date_time: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub status: BookingStatus,
    pub location_type: LocationType,
    pub address: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    /// Authoritative amount for payment validation. Written once at
    /// creation; only a server-side repricing tied to an explicit
    /// mutation may overwrite it.
    pub price_snapshot_cents: i64,
    pub deposit_cents: i64,
    pub deposit_status: DepositStatus,
    pub promo_code: Option<String>,
    pub discount_cents: i64,
    pub payment_intent_id: Option<String>,
    pub notes: Option<String>,
    pub external_contact_id: Option<String>,
    pub external_event_id: Option<String>,
    /// Normalized `<calendar>:<bucketed start>` key; a unique partial
    /// index over active statuses makes double-booking a constraint
    /// violation rather than a race.
    pub slot_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn scheduled_end_time(&self) -> Option<DateTime<Utc>> {
        self.scheduled_date_time
            .map(|start| start + chrono::Duration::minutes(self.duration_minutes))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Requested,
    PaymentPending,
    Confirmed,
    Scheduled,
    AwaitingClientAction,
    ReadyForService,
    InProgress,
    Completed,
    RequiresReschedule,
    NoShow,
    CancelledByClient,
    CancelledByStaff,
    Archived,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Requested => "requested",
            BookingStatus::PaymentPending => "payment_pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::AwaitingClientAction => "awaiting_client_action",
            BookingStatus::ReadyForService => "ready_for_service",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::RequiresReschedule => "requires_reschedule",
            BookingStatus::NoShow => "no_show",
            BookingStatus::CancelledByClient => "cancelled_by_client",
            BookingStatus::CancelledByStaff => "cancelled_by_staff",
            BookingStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Mobile,
    Office,
    RemoteOnline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    NotRequired,
    Pending,
    Paid,
    Refunded,
}

/// Who drove a status transition. Validated once at the boundary and
/// carried as a typed value into the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Client,
    Staff,
    System,
    Payment,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Actor::Client => "client",
            Actor::Staff => "staff",
            Actor::System => "system",
            Actor::Payment => "payment",
        };
        write!(f, "{}", s)
    }
}

// ==============================================================================
// AUDIT / NOTIFICATION MODELS (append-only)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// None for the creation event.
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub actor: Actor,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub booking_id: Uuid,
    pub event_type: String,
    pub recipient: String,
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

fn default_one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub service_type: ServiceType,
    pub scheduled_date_time: DateTime<Utc>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub location_type: LocationType,
    pub address: Option<String>,
    #[serde(default = "default_one")]
    pub signer_count: u32,
    #[serde(default = "default_one")]
    pub document_count: u32,
    #[serde(default)]
    pub distance_miles: f64,
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
    pub promo_code: Option<String>,
    pub payment_intent_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub price_snapshot_cents: i64,
    pub deposit_cents: i64,
    pub breakdown: PriceBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionStatusRequest {
    pub target_status: BookingStatus,
    pub reason: Option<String>,
    /// New appointment time when the target is a (re)scheduling move.
    pub scheduled_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub previous_status: BookingStatus,
    pub new_status: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSuggestion {
    pub suggested_status: BookingStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingStatusResponse {
    pub status: BookingStatus,
    pub valid_next_statuses: Vec<BookingStatus>,
    pub automation_suggestion: Option<AutomationSuggestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingSearchQuery {
    pub customer_email: Option<String>,
    pub status: Option<BookingStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

/// Payload delivered by the payment provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhookPayload {
    pub payment_intent_id: String,
    pub status: String,
    pub amount_cents: i64,
}

/// External events automation reacts to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutomationTrigger {
    PaymentCaptured,
    DepositCaptured,
    TimeElapsed,
    NotaryCheckIn,
    ClientConfirmed,
}

// ==============================================================================
// BUSINESS POLICY
// ==============================================================================

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Clients must cancel at least this far ahead; staff may always
    /// cancel.
    pub client_cancellation_notice_hours: i64,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            client_cancellation_notice_hours: 24,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found")]
    NotFound,

    #[error("Selected time is no longer available")]
    SlotUnavailable,

    #[error("Service not found or inactive: {0}")]
    InvalidService(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Booking was modified concurrently; please retry")]
    ConcurrentUpdate,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Payment amount {received_cents} does not match the booked price {expected_cents}")]
    PricingIntegrity {
        expected_cents: i64,
        received_cents: i64,
    },

    #[error("No external calendar is mapped for service type {0}")]
    CalendarNotMapped(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}
