use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

use pricing_cell::ServiceType;
use shared_config::SchedulingConfig;

use crate::models::AvailabilitySlot;

/// Synthetic business-hours slot generator. Used when the external
/// calendar cannot be reached: degraded data beats an empty day.
pub fn business_hours_slots(
    date: NaiveDate,
    service_type: ServiceType,
    duration_minutes: i64,
    scheduling: &SchedulingConfig,
) -> Vec<AvailabilitySlot> {
    let (open_hour, close_hour) = service_hours(service_type, scheduling);
    let offset = business_offset(scheduling);

    let mut slots = Vec::new();
    let Some(day_open) = date.and_hms_opt(open_hour, 0, 0) else {
        return slots;
    };

    let day_open: DateTime<Utc> = match day_open.and_local_timezone(offset).single() {
        Some(local) => local.with_timezone(&Utc),
        None => return slots,
    };
    let day_close = day_open + Duration::hours((close_hour.saturating_sub(open_hour)) as i64);

    let interval = Duration::minutes(scheduling.slot_interval_minutes);
    let duration = Duration::minutes(duration_minutes);

    let mut cursor = day_open;
    while cursor + duration <= day_close {
        slots.push(AvailabilitySlot {
            start_time: cursor,
            end_time: cursor + duration,
            duration_minutes,
            available: true,
            demand: None,
        });
        cursor += interval;
    }

    slots
}

/// Operating hours per service. Extended-hours visits run early and
/// late; remote notarization is bookable around the clock.
pub fn service_hours(service_type: ServiceType, scheduling: &SchedulingConfig) -> (u32, u32) {
    match service_type {
        ServiceType::ExtendedHours => (7, 21),
        ServiceType::RonServices => (0, 24),
        _ => (scheduling.business_open_hour, scheduling.business_close_hour),
    }
}

pub fn business_offset(scheduling: &SchedulingConfig) -> FixedOffset {
    FixedOffset::east_opt(scheduling.business_utc_offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
}
