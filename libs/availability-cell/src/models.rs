use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use calendar_cell::CalendarError;

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A bookable window for one service/calendar on one day. Transient:
/// computed per query, cached only briefly, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demand: Option<SlotDemand>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotDemand {
    Low,
    Moderate,
    High,
}

/// Where the candidate slots came from. Downstream consumers use this
/// to tune confidence/urgency messaging when the provider was down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    External,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub slots: Vec<AvailabilitySlot>,
    pub source: SlotSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ==============================================================================
// REFERENCE DATA / DATASTORE ROWS
// ==============================================================================

/// Service reference data as read from the `services` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub service_type: String,
    pub name: String,
    pub duration_minutes: i64,
    pub base_price_cents: i64,
    pub deposit_required: bool,
    pub deposit_cents: i64,
    pub is_active: bool,
    pub external_calendar_id: Option<String>,
}

/// The subset of a booking row the resolver needs for conflict
/// exclusion.
#[derive(Debug, Clone, Deserialize)]
pub struct HeldWindow {
    pub scheduled_date_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Statuses that occupy calendar capacity. Cancelled, archived and
/// no-show bookings free their window.
pub const BLOCKING_STATUSES: [&str; 5] = [
    "confirmed",
    "scheduled",
    "payment_pending",
    "ready_for_service",
    "in_progress",
];

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unknown service type: {0}")]
    UnknownService(String),

    #[error("Service is not currently bookable: {0}")]
    InactiveService(String),

    #[error("No external calendar is mapped for service type {0}")]
    CalendarNotMapped(String),

    #[error("Calendar provider error: {0}")]
    Provider(#[from] CalendarError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
