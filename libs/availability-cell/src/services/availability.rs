use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use calendar_cell::{CalendarClient, CalendarProvider};
use pricing_cell::ServiceType;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityError, AvailabilitySlot, DayAvailability, HeldWindow, ServiceRecord, SlotDemand,
    SlotSource, BLOCKING_STATUSES,
};
use crate::services::cache::SlotCache;
use crate::services::fallback::{business_hours_slots, business_offset};

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    provider: Arc<dyn CalendarProvider>,
    cache: SlotCache,
    config: AppConfig,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig, cache: SlotCache) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            provider: Arc::new(CalendarClient::new(config)),
            cache,
            config: config.clone(),
        }
    }

    /// Test seam: swap the production calendar client for a fake.
    pub fn with_provider(
        config: &AppConfig,
        cache: SlotCache,
        provider: Arc<dyn CalendarProvider>,
    ) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            provider,
            cache,
            config: config.clone(),
        }
    }

    /// Produce the candidate slot set for one service on one day,
    /// merging provider free/busy data with internal conflict
    /// exclusion. Transient provider failures degrade to synthetic
    /// business-hours slots; they never empty the day.
    pub async fn get_available_slots(
        &self,
        service_type: ServiceType,
        date: NaiveDate,
    ) -> Result<DayAvailability, AvailabilityError> {
        debug!("Resolving availability for {} on {}", service_type, date);

        let service = self.get_service_record(service_type).await?;
        if !service.is_active {
            return Err(AvailabilityError::InactiveService(service_type.to_string()));
        }

        let calendar_id = service
            .external_calendar_id
            .clone()
            .or_else(|| {
                self.config
                    .calendar_id_for(&service_type.to_string())
                    .map(str::to_string)
            })
            .ok_or_else(|| AvailabilityError::CalendarNotMapped(service_type.to_string()))?;

        if self.config.scheduling.blackout_dates.contains(&date) {
            return Ok(DayAvailability {
                date,
                slots: vec![],
                source: SlotSource::Fallback,
                message: Some("This date is not available for bookings".to_string()),
            });
        }

        if let Some(cached) = self.cache.get(&calendar_id, date) {
            debug!("Availability cache hit for {} on {}", calendar_id, date);
            return Ok(self.drop_past_slots(cached));
        }

        let offset = business_offset(&self.config.scheduling);
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| naive.and_local_timezone(offset).single())
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| AvailabilityError::InvalidDate(date.to_string()))?;
        let day_end = day_start + Duration::days(1);

        let (mut slots, source) = match self
            .provider
            .get_free_slots(&calendar_id, day_start, day_end)
            .await
        {
            Ok(raw_slots) => {
                let slots = raw_slots
                    .into_iter()
                    .map(|raw| AvailabilitySlot {
                        start_time: raw.start_time,
                        end_time: raw.end_time,
                        duration_minutes: service.duration_minutes,
                        available: true,
                        demand: None,
                    })
                    .collect();
                (slots, SlotSource::External)
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Calendar provider unavailable for {} ({}); using business-hours fallback",
                    calendar_id, e
                );
                let slots = business_hours_slots(
                    date,
                    service_type,
                    service.duration_minutes,
                    &self.config.scheduling,
                );
                (slots, SlotSource::Fallback)
            }
            // Permanent provider failures are the caller's decision.
            Err(e) => return Err(AvailabilityError::Provider(e)),
        };

        let held = self
            .get_held_windows(&calendar_id, day_start, day_end)
            .await?;
        self.apply_conflicts(&mut slots, &held);
        self.tag_demand(&mut slots);

        let day = DayAvailability {
            date,
            slots,
            source,
            message: None,
        };

        self.cache.insert(&calendar_id, date, day.clone());

        let day = self.drop_past_slots(day);
        info!(
            "Availability for {} on {}: {} slots ({:?})",
            service_type,
            date,
            day.slots.len(),
            day.source
        );
        Ok(day)
    }

    pub fn cache(&self) -> &SlotCache {
        &self.cache
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn get_service_record(
        &self,
        service_type: ServiceType,
    ) -> Result<ServiceRecord, AvailabilityError> {
        let path = format!(
            "/rest/v1/services?service_type=eq.{}&limit=1",
            service_type
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let Some(record) = result.into_iter().next() else {
            return Err(AvailabilityError::UnknownService(service_type.to_string()));
        };

        serde_json::from_value(record)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse service: {}", e)))
    }

    async fn get_held_windows(
        &self,
        calendar_id: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<Vec<HeldWindow>, AvailabilityError> {
        let path = format!(
            "/rest/v1/bookings?slot_key=like.{}*&scheduled_date_time=gte.{}&scheduled_date_time=lt.{}&status=in.({})&select=scheduled_date_time,duration_minutes",
            urlencoding::encode(&format!("{}:", calendar_id)),
            urlencoding::encode(&day_start.to_rfc3339()),
            urlencoding::encode(&day_end.to_rfc3339()),
            BLOCKING_STATUSES.join(","),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let windows = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<HeldWindow>, _>>()
            .map_err(|e| {
                AvailabilityError::DatabaseError(format!("Failed to parse bookings: {}", e))
            })?;

        Ok(windows)
    }

    /// Mark slots that collide with an internal booking window,
    /// expanding each held window by the configured buffer on both
    /// sides. Half-open interval overlap: [a, b) and [c, d) collide
    /// iff a < d && c < b.
    fn apply_conflicts(&self, slots: &mut [AvailabilitySlot], held: &[HeldWindow]) {
        let buffer = Duration::minutes(self.config.scheduling.slot_buffer_minutes);

        for slot in slots.iter_mut() {
            let blocked = held.iter().any(|window| {
                let held_start = window.scheduled_date_time - buffer;
                let held_end = window.scheduled_date_time
                    + Duration::minutes(window.duration_minutes)
                    + buffer;
                slot.start_time < held_end && held_start < slot.end_time
            });
            if blocked {
                slot.available = false;
            }
        }
    }

    fn tag_demand(&self, slots: &mut [AvailabilitySlot]) {
        if slots.is_empty() {
            return;
        }

        let busy = slots.iter().filter(|slot| !slot.available).count();
        let ratio = busy as f64 / slots.len() as f64;
        let demand = if ratio >= 0.7 {
            SlotDemand::High
        } else if ratio >= 0.4 {
            SlotDemand::Moderate
        } else {
            SlotDemand::Low
        };

        for slot in slots.iter_mut().filter(|slot| slot.available) {
            slot.demand = Some(demand);
        }
    }

    /// Cached entries age against "now": re-filter on every read so a
    /// morning query never serves afternoon slots that have passed.
    fn drop_past_slots(&self, mut day: DayAvailability) -> DayAvailability {
        let cutoff = Utc::now() + Duration::hours(self.config.scheduling.min_lead_time_hours);
        day.slots.retain(|slot| slot.start_time >= cutoff);
        day
    }
}
