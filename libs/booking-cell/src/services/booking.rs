use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::ServiceRecord;
use availability_cell::services::fallback::{business_offset, service_hours};
use availability_cell::SlotCache;
use calendar_cell::{CalendarClient, CalendarProvider, NewAppointment};
use pricing_cell::{compute_price, PriceBreakdown, PricingInput, ServiceType};
use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};

use crate::models::{
    Actor, Booking, BookingError, BookingPolicy, BookingSearchQuery, BookingStatus,
    CreateBookingRequest, TransitionOutcome,
};
use crate::services::lifecycle::BookingLifecycleService;
use crate::services::reservation::ReservationGuard;

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    lifecycle: BookingLifecycleService,
    guard: ReservationGuard,
    calendar: Arc<dyn CalendarProvider>,
    slot_cache: SlotCache,
    policy: BookingPolicy,
    config: AppConfig,
}

impl BookingService {
    pub fn new(config: &AppConfig, slot_cache: SlotCache) -> Self {
        Self::with_provider(config, slot_cache, Arc::new(CalendarClient::new(config)))
    }

    /// Test seam: swap the production calendar client for a fake.
    pub fn with_provider(
        config: &AppConfig,
        slot_cache: SlotCache,
        calendar: Arc<dyn CalendarProvider>,
    ) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let guard = ReservationGuard::new(
            Arc::clone(&supabase),
            config.scheduling.slot_buffer_minutes,
            config.scheduling.slot_interval_minutes,
        );

        Self {
            supabase,
            lifecycle: BookingLifecycleService::new(),
            guard,
            calendar,
            slot_cache,
            policy: BookingPolicy::default(),
            config: config.clone(),
        }
    }

    pub fn lifecycle(&self) -> &BookingLifecycleService {
        &self.lifecycle
    }

    /// Create a conflict-free, priced booking. The conflict check plus
    /// the unique slot-key insert make creation all-or-nothing: a
    /// losing race or an aborted request leaves no partial record.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
        auth_token: Option<&str>,
    ) -> Result<(Booking, PriceBreakdown), BookingError> {
        info!(
            "Creating {} booking for {}",
            request.service_type, request.customer_email
        );

        self.validate_booking_request(&request)?;

        let service = self.get_service_record(request.service_type, auth_token).await?;
        let calendar_id = self.calendar_id_for(&service)?;

        let start = request.scheduled_date_time;
        let end = start + Duration::minutes(service.duration_minutes);

        self.guard
            .ensure_window_free(&calendar_id, start, end, None, auth_token)
            .await?;

        let breakdown = self.price_booking(&request, auth_token).await?;
        let deposit_cents = if service.deposit_required && breakdown.deposit_cents == 0 {
            service.deposit_cents
        } else {
            breakdown.deposit_cents
        };

        let initial_status = self.lifecycle.initial_status(deposit_cents > 0);
        let slot_key = self.guard.slot_key(&calendar_id, start);
        let now = Utc::now();

        let booking_data = json!({
            "service_type": request.service_type.to_string(),
            "scheduled_date_time": start.to_rfc3339(),
            "duration_minutes": service.duration_minutes,
            "status": initial_status.to_string(),
            "location_type": request.location_type,
            "address": request.address,
            "customer_name": request.customer_name,
            "customer_email": request.customer_email,
            "customer_phone": request.customer_phone,
            "price_snapshot_cents": breakdown.total_cents,
            "deposit_cents": deposit_cents,
            "deposit_status": if deposit_cents > 0 { "pending" } else { "not_required" },
            "promo_code": request.promo_code,
            "discount_cents": breakdown.discount_cents,
            "payment_intent_id": request.payment_intent_id,
            "notes": request.notes,
            "slot_key": slot_key,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/bookings",
                auth_token,
                Some(booking_data),
                Some(headers),
            )
            .await
            .map_err(|e| {
                // The unique slot-key index turns the losing side of a
                // creation race into a conflict.
                if e.is_conflict() {
                    BookingError::SlotUnavailable
                } else {
                    BookingError::DatabaseError(e.to_string())
                }
            })?;

        let Some(created) = result.into_iter().next() else {
            return Err(BookingError::DatabaseError(
                "Failed to create booking".to_string(),
            ));
        };
        let booking: Booking = serde_json::from_value(created).map_err(|e| {
            BookingError::DatabaseError(format!("Failed to parse created booking: {}", e))
        })?;

        if let Err(e) = self
            .record_status_event(
                booking.id,
                None,
                initial_status,
                Actor::System,
                Some("booking created"),
                auth_token,
            )
            .await
        {
            warn!("Failed to record creation event for {}: {}", booking.id, e);
        }

        let local_date = start
            .with_timezone(&business_offset(&self.config.scheduling))
            .date_naive();
        self.slot_cache.invalidate(&calendar_id, local_date);

        self.mirror_to_calendar(&booking, &calendar_id, auth_token).await;
        self.log_notification(
            booking.id,
            "booking_created",
            &booking.customer_email,
            auth_token,
        )
        .await;

        info!(
            "Booking {} created in status {} (snapshot {} cents)",
            booking.id, booking.status, booking.price_snapshot_cents
        );
        Ok((booking, breakdown))
    }

    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Booking, BookingError> {
        debug!("Fetching booking: {}", booking_id);

        let path = format!("/rest/v1/bookings?id=eq.{}", booking_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let Some(raw) = result.into_iter().next() else {
            return Err(BookingError::NotFound);
        };

        serde_json::from_value(raw)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse booking: {}", e)))
    }

    pub async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Booking, BookingError> {
        let path = format!(
            "/rest/v1/bookings?payment_intent_id=eq.{}&limit=1",
            urlencoding::encode(payment_intent_id)
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let Some(raw) = result.into_iter().next() else {
            return Err(BookingError::NotFound);
        };

        serde_json::from_value(raw)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse booking: {}", e)))
    }

    pub async fn search_bookings(
        &self,
        query: BookingSearchQuery,
        auth_token: Option<&str>,
    ) -> Result<Vec<Booking>, BookingError> {
        debug!("Searching bookings with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(email) = query.customer_email {
            query_parts.push(format!("customer_email=eq.{}", urlencoding::encode(&email)));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!(
                "scheduled_date_time=gte.{}",
                urlencoding::encode(&from_date.to_rfc3339())
            ));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!(
                "scheduled_date_time=lte.{}",
                urlencoding::encode(&to_date.to_rfc3339())
            ));
        }

        let mut path = format!(
            "/rest/v1/bookings?{}&order=scheduled_date_time.desc",
            query_parts.join("&")
        );
        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Booking>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse bookings: {}", e)))
    }

    /// Apply a validated status transition. The audit event is written
    /// before the commit (an orphaned event is acceptable, an
    /// unaudited transition is not), and the update itself is a
    /// compare-and-swap on the previous status so concurrent writers
    /// serialize per booking instead of clobbering each other.
    pub async fn transition(
        &self,
        booking_id: Uuid,
        target: BookingStatus,
        reason: Option<String>,
        actor: Actor,
        new_time: Option<DateTime<Utc>>,
        auth_token: Option<&str>,
    ) -> Result<TransitionOutcome, BookingError> {
        let booking = self.get_booking(booking_id, auth_token).await?;
        let previous = booking.status;

        self.lifecycle.validate_transition(&previous, &target)?;
        self.enforce_cancellation_notice(&booking, target, actor)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(target.to_string()));
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let calendar_id = self
            .config
            .calendar_id_for(&booking.service_type.to_string())
            .map(str::to_string);

        if let Some(new_start) = new_time {
            if target != BookingStatus::Scheduled {
                return Err(BookingError::ValidationError(
                    "A new appointment time is only valid when moving to scheduled".to_string(),
                ));
            }
            let calendar_id = calendar_id.clone().ok_or_else(|| {
                BookingError::CalendarNotMapped(booking.service_type.to_string())
            })?;

            let new_end = new_start + Duration::minutes(booking.duration_minutes);
            self.guard
                .ensure_window_free(&calendar_id, new_start, new_end, Some(booking.id), auth_token)
                .await?;

            update_data.insert(
                "scheduled_date_time".to_string(),
                json!(new_start.to_rfc3339()),
            );
            update_data.insert(
                "slot_key".to_string(),
                json!(self.guard.slot_key(&calendar_id, new_start)),
            );
        }

        self.record_status_event(
            booking.id,
            Some(previous),
            target,
            actor,
            reason.as_deref(),
            auth_token,
        )
        .await?;

        let path = format!(
            "/rest/v1/bookings?id=eq.{}&status=eq.{}",
            booking.id, previous
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                auth_token,
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            // Another writer changed the status between read and
            // update; the caller must re-read and retry.
            warn!(
                "Concurrent update lost on booking {} ({} -> {})",
                booking.id, previous, target
            );
            return Err(BookingError::ConcurrentUpdate);
        }

        if let Some(calendar_id) = calendar_id {
            let offset = business_offset(&self.config.scheduling);
            if let Some(old_start) = booking.scheduled_date_time {
                self.slot_cache
                    .invalidate(&calendar_id, old_start.with_timezone(&offset).date_naive());
            }
            if let Some(new_start) = new_time {
                self.slot_cache
                    .invalidate(&calendar_id, new_start.with_timezone(&offset).date_naive());
            }
        }

        info!(
            "Booking {} transitioned {} -> {} by {}",
            booking.id, previous, target, actor
        );

        Ok(TransitionOutcome {
            previous_status: previous,
            new_status: target,
        })
    }

    /// Append a status event to the audit trail. Append-only: rows are
    /// never updated or deleted.
    pub async fn record_status_event(
        &self,
        booking_id: Uuid,
        from: Option<BookingStatus>,
        to: BookingStatus,
        actor: Actor,
        reason: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<(), BookingError> {
        let event = json!({
            "booking_id": booking_id,
            "from_status": from.map(|s| s.to_string()),
            "to_status": to.to_string(),
            "actor": actor.to_string(),
            "reason": reason,
            "created_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/booking_status_events",
                auth_token,
                Some(event),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(format!("Failed to record event: {}", e)))?;

        Ok(())
    }

    /// Fire-and-forget notification emit. Failures are logged, never
    /// retried synchronously, and never fail the surrounding
    /// operation.
    pub async fn log_notification(
        &self,
        booking_id: Uuid,
        event_type: &str,
        recipient: &str,
        auth_token: Option<&str>,
    ) {
        let entry = json!({
            "booking_id": booking_id,
            "event_type": event_type,
            "recipient": recipient,
            "created_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Result<Vec<Value>, DbError> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notification_log",
                auth_token,
                Some(entry),
                Some(headers),
            )
            .await;

        if let Err(e) = result {
            warn!(
                "Failed to log {} notification for booking {}: {}",
                event_type, booking_id, e
            );
        }
    }

    /// Patch non-status fields (deposit state, external references).
    pub async fn update_fields(
        &self,
        booking_id: Uuid,
        mut fields: serde_json::Map<String, Value>,
        auth_token: Option<&str>,
    ) -> Result<(), BookingError> {
        fields.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/bookings?id=eq.{}", booking_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                auth_token,
                Some(Value::Object(fields)),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_booking_request(&self, request: &CreateBookingRequest) -> Result<(), BookingError> {
        let now = Utc::now();
        let scheduling = &self.config.scheduling;

        let min_start = now + Duration::hours(scheduling.min_lead_time_hours);
        if request.scheduled_date_time < min_start {
            return Err(BookingError::ValidationError(format!(
                "Appointments must be booked at least {} hours in advance",
                scheduling.min_lead_time_hours
            )));
        }

        let max_start = now + Duration::days(scheduling.max_advance_booking_days);
        if request.scheduled_date_time > max_start {
            return Err(BookingError::ValidationError(format!(
                "Appointments cannot be booked more than {} days in advance",
                scheduling.max_advance_booking_days
            )));
        }

        let local_date = request
            .scheduled_date_time
            .with_timezone(&business_offset(scheduling))
            .date_naive();
        if scheduling.blackout_dates.contains(&local_date) {
            return Err(BookingError::ValidationError(
                "This date is not available for bookings".to_string(),
            ));
        }

        match request.location_type {
            crate::models::LocationType::RemoteOnline => {}
            _ => {
                if request.service_type.is_remote() {
                    return Err(BookingError::ValidationError(
                        "Remote notarization must use a remote-online location".to_string(),
                    ));
                }
                if request.address.as_deref().map_or(true, str::is_empty) {
                    return Err(BookingError::ValidationError(
                        "An address is required for in-person appointments".to_string(),
                    ));
                }
            }
        }

        if request.customer_email.is_empty() || !request.customer_email.contains('@') {
            return Err(BookingError::ValidationError(
                "A valid customer email is required".to_string(),
            ));
        }

        Ok(())
    }

    async fn get_service_record(
        &self,
        service_type: ServiceType,
        auth_token: Option<&str>,
    ) -> Result<ServiceRecord, BookingError> {
        let path = format!("/rest/v1/services?service_type=eq.{}&limit=1", service_type);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let Some(raw) = result.into_iter().next() else {
            return Err(BookingError::InvalidService(service_type.to_string()));
        };

        let service: ServiceRecord = serde_json::from_value(raw)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse service: {}", e)))?;

        if !service.is_active {
            return Err(BookingError::InvalidService(service_type.to_string()));
        }

        Ok(service)
    }

    fn calendar_id_for(&self, service: &ServiceRecord) -> Result<String, BookingError> {
        service
            .external_calendar_id
            .clone()
            .or_else(|| {
                self.config
                    .calendar_id_for(&service.service_type)
                    .map(str::to_string)
            })
            .ok_or_else(|| BookingError::CalendarNotMapped(service.service_type.clone()))
    }

    /// Derive the timing attributes and resolve discounts, then hand
    /// everything to the pure pricing engine. The resulting total is
    /// the booking's immutable price snapshot.
    async fn price_booking(
        &self,
        request: &CreateBookingRequest,
        auth_token: Option<&str>,
    ) -> Result<PriceBreakdown, BookingError> {
        let scheduling = &self.config.scheduling;
        let local = request
            .scheduled_date_time
            .with_timezone(&business_offset(scheduling));

        let is_weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        let is_holiday = scheduling.holiday_dates.contains(&local.date_naive());

        let (open_hour, close_hour) = service_hours(request.service_type, scheduling);
        let hour = local.hour();
        let is_after_hours = hour < open_hour || hour >= close_hour;

        let promo_discount_cents = match &request.promo_code {
            Some(code) => self.resolve_promo_discount(code, auth_token).await,
            None => 0,
        };

        let rates = request.service_type.rates();
        let extra_documents = request
            .document_count
            .saturating_sub(rates.included_documents);

        let input = PricingInput {
            service_type: request.service_type,
            signer_count: request.signer_count,
            distance_miles: request.distance_miles,
            is_weekend,
            is_holiday,
            is_after_hours,
            extra_documents,
            add_ons: request.add_ons.clone(),
            promo_discount_cents,
        };

        compute_price(&input).map_err(|e| BookingError::ValidationError(e.to_string()))
    }

    /// Promo codes live in reference data; an unknown or inactive code
    /// quietly prices as zero discount rather than failing the
    /// booking.
    async fn resolve_promo_discount(&self, code: &str, auth_token: Option<&str>) -> i64 {
        let normalized = code.trim().to_uppercase();
        if normalized.is_empty() {
            return 0;
        }

        let path = format!(
            "/rest/v1/promo_codes?code=eq.{}&is_active=eq.true&limit=1",
            urlencoding::encode(&normalized)
        );

        let result: Result<Vec<Value>, DbError> =
            self.supabase.request(Method::GET, &path, auth_token, None).await;

        match result {
            Ok(rows) => rows
                .first()
                .and_then(|row| row["discount_cents"].as_i64())
                .unwrap_or_else(|| {
                    debug!("Promo code {} not found or inactive", normalized);
                    0
                }),
            Err(e) => {
                warn!("Promo code lookup failed for {}: {}", normalized, e);
                0
            }
        }
    }

    fn enforce_cancellation_notice(
        &self,
        booking: &Booking,
        target: BookingStatus,
        actor: Actor,
    ) -> Result<(), BookingError> {
        if actor != Actor::Client || target != BookingStatus::CancelledByClient {
            return Ok(());
        }

        let Some(start) = booking.scheduled_date_time else {
            return Ok(());
        };

        let notice = Duration::hours(self.policy.client_cancellation_notice_hours);
        if start <= Utc::now() + notice {
            return Err(BookingError::ValidationError(format!(
                "Appointments can only be cancelled at least {} hours in advance",
                self.policy.client_cancellation_notice_hours
            )));
        }

        Ok(())
    }

    /// Best-effort mirror into the external calendar. Runs after the
    /// booking row is committed; provider failures are logged and the
    /// booking stands.
    async fn mirror_to_calendar(
        &self,
        booking: &Booking,
        calendar_id: &str,
        auth_token: Option<&str>,
    ) {
        let Some(start) = booking.scheduled_date_time else {
            return;
        };
        let end = start + Duration::minutes(booking.duration_minutes);

        let contact = match self
            .calendar
            .find_or_create_contact(
                &booking.customer_email,
                &booking.customer_name,
                booking.customer_phone.as_deref(),
            )
            .await
        {
            Ok(contact) => contact,
            Err(e) => {
                warn!(
                    "Calendar contact sync failed for booking {}: {}",
                    booking.id, e
                );
                return;
            }
        };

        let details = NewAppointment {
            title: format!("{} - {}", booking.service_type, booking.customer_name),
            address: booking.address.clone(),
            notify: true,
        };

        match self
            .calendar
            .create_appointment(calendar_id, &contact, start, end, &details)
            .await
        {
            Ok(appointment) => {
                let mut fields = serde_json::Map::new();
                fields.insert("external_contact_id".to_string(), json!(contact.id));
                fields.insert("external_event_id".to_string(), json!(appointment.id));
                if let Err(e) = self.update_fields(booking.id, fields, auth_token).await {
                    warn!(
                        "Failed to store external calendar refs on booking {}: {}",
                        booking.id, e
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Calendar appointment mirror failed for booking {}: {}",
                    booking.id, e
                );
            }
        }
    }
}
