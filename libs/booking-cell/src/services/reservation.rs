use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use shared_database::supabase::SupabaseClient;

use crate::models::{Booking, BookingError};

/// Statuses that occupy capacity on a calendar. Everything else frees
/// its window.
pub const BLOCKING_STATUSES: [&str; 5] = [
    "payment_pending",
    "confirmed",
    "scheduled",
    "ready_for_service",
    "in_progress",
];

/// Pre-insert conflict check for a proposed booking window. The check
/// itself is advisory; the hard guarantee is the unique `slot_key`
/// constraint enforced at insert time, which turns the losing side of
/// a race into a 409 instead of a double-booking.
pub struct ReservationGuard {
    supabase: Arc<SupabaseClient>,
    buffer_minutes: i64,
    slot_interval_minutes: i64,
}

impl ReservationGuard {
    pub fn new(
        supabase: Arc<SupabaseClient>,
        buffer_minutes: i64,
        slot_interval_minutes: i64,
    ) -> Self {
        Self {
            supabase,
            buffer_minutes,
            slot_interval_minutes,
        }
    }

    /// Verify no active booking overlaps the proposed window (expanded
    /// by the buffer on both sides).
    pub async fn ensure_window_free(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_booking_id: Option<uuid::Uuid>,
        auth_token: Option<&str>,
    ) -> Result<(), BookingError> {
        debug!(
            "Checking window {} - {} on calendar {}",
            start, end, calendar_id
        );

        let buffer = Duration::minutes(self.buffer_minutes);
        let window_start = start - buffer;
        let window_end = end + buffer;

        // Bookings starting up to four hours before the window can
        // still reach into it; bound the query rather than scanning
        // the whole table.
        let lookback_start = window_start - Duration::hours(4);

        let mut query_parts = vec![
            format!(
                "slot_key=like.{}*",
                urlencoding::encode(&format!("{}:", calendar_id))
            ),
            format!(
                "scheduled_date_time=gte.{}",
                urlencoding::encode(&lookback_start.to_rfc3339())
            ),
            format!(
                "scheduled_date_time=lt.{}",
                urlencoding::encode(&window_end.to_rfc3339())
            ),
            format!("status=in.({})", BLOCKING_STATUSES.join(",")),
        ];
        if let Some(exclude_id) = exclude_booking_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("/rest/v1/bookings?{}", query_parts.join("&"));
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let existing: Vec<Booking> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Booking>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse bookings: {}", e)))?;

        for booking in &existing {
            let Some(held_start) = booking.scheduled_date_time else {
                continue;
            };
            let held_end = held_start + Duration::minutes(booking.duration_minutes);

            if windows_overlap(window_start, window_end, held_start, held_end) {
                info!(
                    "Overlap detected on {}: requested {} - {} blocked by booking {} ({})",
                    calendar_id, start, end, booking.id, booking.status
                );
                return Err(BookingError::SlotUnavailable);
            }
        }

        Ok(())
    }

    /// Normalized key for the unique constraint: the window start is
    /// bucketed to the slot interval so two requests for the same slot
    /// always produce the same key.
    pub fn slot_key(&self, calendar_id: &str, start: DateTime<Utc>) -> String {
        let interval_secs = (self.slot_interval_minutes * 60).max(60);
        let ts = start.timestamp();
        let bucketed = ts - ts.rem_euclid(interval_secs);
        let bucket_start =
            DateTime::<Utc>::from_timestamp(bucketed, 0).unwrap_or(start);
        format!("{}:{}", calendar_id, bucket_start.to_rfc3339())
    }
}

/// Half-open interval overlap: [a_start, a_end) and [b_start, b_end)
/// overlap iff a_start < b_end && b_start < a_end.
pub fn windows_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_overlap_detection() {
        // Plain overlap.
        assert!(windows_overlap(at(14, 0), at(15, 0), at(14, 30), at(15, 30)));
        // Containment.
        assert!(windows_overlap(at(14, 0), at(16, 0), at(14, 30), at(15, 0)));
        // Disjoint.
        assert!(!windows_overlap(at(14, 0), at(15, 0), at(16, 0), at(17, 0)));
    }

    #[test]
    fn test_half_open_windows_may_touch() {
        // Back-to-back windows share an instant but do not overlap.
        assert!(!windows_overlap(at(14, 0), at(15, 0), at(15, 0), at(16, 0)));
        assert!(!windows_overlap(at(15, 0), at(16, 0), at(14, 0), at(15, 0)));
    }

    #[test]
    fn test_slot_key_is_stable_within_bucket() {
        let supabase = Arc::new(SupabaseClient::new(
            &shared_utils::test_utils::TestConfig::default().to_app_config(),
        ));
        let guard = ReservationGuard::new(supabase, 15, 60);

        // Any start inside the same hour maps to the same key.
        let exact = guard.slot_key("cal_1", at(14, 0));
        let skewed = guard.slot_key("cal_1", at(14, 25));
        assert_eq!(exact, skewed);
        assert!(exact.starts_with("cal_1:"));

        let next_hour = guard.slot_key("cal_1", at(15, 0));
        assert_ne!(exact, next_hour);
    }
}
