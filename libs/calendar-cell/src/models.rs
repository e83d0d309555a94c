use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==============================================================================
// PROVIDER-FACING MODELS
// ==============================================================================

/// Handle to a contact record in the external CRM/calendar system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactRef {
    pub id: String,
}

/// A free window as reported by the provider, before any internal
/// conflict exclusion is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Handle to an appointment mirrored into the external calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentRef {
    pub id: String,
}

/// Appointment payload sent to the provider when mirroring a booking.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub title: String,
    pub address: Option<String>,
    pub notify: bool,
}

// ==============================================================================
// ERRORS
// ==============================================================================

/// Typed failure categories for provider calls. Callers choose the
/// fallback policy per category; the adapter itself never substitutes
/// synthetic data.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar provider timed out after {0} seconds")]
    Timeout(u64),

    #[error("Calendar provider transport error: {0}")]
    Transport(String),

    #[error("Calendar provider rate limit exceeded")]
    RateLimited,

    #[error("Calendar provider denied access: {0}")]
    PermissionDenied(String),

    #[error("Calendar resource not found: {0}")]
    NotFound(String),

    #[error("Calendar provider returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("Calendar provider is not configured: {0}")]
    Unconfigured(String),
}

impl CalendarError {
    /// Transient failures are worth degrading around (fallback slots,
    /// retries); permanent ones should surface to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CalendarError::Timeout(_) | CalendarError::Transport(_) | CalendarError::RateLimited
        )
    }
}
