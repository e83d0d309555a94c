use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use availability_cell::SlotCache;
use calendar_cell::CalendarProvider;
use shared_config::{AppConfig, AutomationConfig};

use crate::models::{
    Actor, AutomationSuggestion, AutomationTrigger, Booking, BookingError, BookingStatus,
    BookingStatusResponse, PaymentWebhookPayload, TransitionOutcome,
};
use crate::services::booking::BookingService;

/// Drives status changes in response to external events (payment,
/// staff action, elapsed time). Never mutates status directly: every
/// change goes through the state machine via `BookingService`.
pub struct BookingAutomationService {
    booking: BookingService,
    automation: AutomationConfig,
}

impl BookingAutomationService {
    pub fn new(config: &AppConfig, slot_cache: SlotCache) -> Self {
        Self {
            booking: BookingService::new(config, slot_cache),
            automation: config.automation.clone(),
        }
    }

    pub fn with_provider(
        config: &AppConfig,
        slot_cache: SlotCache,
        calendar: Arc<dyn CalendarProvider>,
    ) -> Self {
        Self {
            booking: BookingService::with_provider(config, slot_cache, calendar),
            automation: config.automation.clone(),
        }
    }

    pub fn booking_service(&self) -> &BookingService {
        &self.booking
    }

    /// Evaluate automation rules for a booking and apply the first one
    /// that fires. Idempotent: re-reads current state and no-ops when
    /// the booking is already at or past the rule's target, so it is
    /// safe to call on every status read or webhook redelivery.
    pub async fn progress_booking_status(
        &self,
        booking_id: Uuid,
        trigger: AutomationTrigger,
        auth_token: Option<&str>,
    ) -> Result<Option<TransitionOutcome>, BookingError> {
        let booking = self.booking.get_booking(booking_id, auth_token).await?;

        let Some((target, reason)) = self.evaluate(&booking, trigger, Utc::now()) else {
            debug!(
                "No automation rule fired for booking {} ({}, trigger {:?})",
                booking_id, booking.status, trigger
            );
            return Ok(None);
        };

        let outcome = match self
            .booking
            .transition(
                booking_id,
                target,
                Some(reason.to_string()),
                Actor::System,
                None,
                auth_token,
            )
            .await
        {
            Ok(outcome) => outcome,
            // A concurrent caller already applied this rule; the
            // desired end state holds either way.
            Err(BookingError::ConcurrentUpdate) => return Ok(None),
            Err(e) => return Err(e),
        };

        self.fire_post_transition_effects(&booking, &outcome, auth_token)
            .await;

        Ok(Some(outcome))
    }

    /// Explicit transition request from a handler. Validated against
    /// the transition table before being applied; side effects fire
    /// only after the commit.
    pub async fn transition_booking_status(
        &self,
        booking_id: Uuid,
        target: BookingStatus,
        notes: Option<String>,
        triggered_by: Actor,
        new_time: Option<DateTime<Utc>>,
        auth_token: Option<&str>,
    ) -> Result<TransitionOutcome, BookingError> {
        let booking = self.booking.get_booking(booking_id, auth_token).await?;

        let outcome = self
            .booking
            .transition(booking_id, target, notes, triggered_by, new_time, auth_token)
            .await?;

        self.fire_post_transition_effects(&booking, &outcome, auth_token)
            .await;

        Ok(outcome)
    }

    /// Current status plus what may happen next: the legal transitions
    /// and any automation suggestion awaiting a human decision. The
    /// read path also runs the time-based rules, so stale statuses
    /// catch up on every poll.
    pub async fn status_report(
        &self,
        booking_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<BookingStatusResponse, BookingError> {
        self.progress_booking_status(booking_id, AutomationTrigger::TimeElapsed, auth_token)
            .await?;

        let booking = self.booking.get_booking(booking_id, auth_token).await?;

        Ok(BookingStatusResponse {
            status: booking.status,
            valid_next_statuses: self.booking.lifecycle().valid_transitions(&booking.status),
            automation_suggestion: self.suggest(&booking, Utc::now()),
        })
    }

    /// Map a payment provider event onto a transition request. The
    /// stored price snapshot is the only validation truth: amounts are
    /// compared against it, never recomputed from business rules.
    pub async fn handle_payment_event(
        &self,
        payload: PaymentWebhookPayload,
        auth_token: Option<&str>,
    ) -> Result<Option<TransitionOutcome>, BookingError> {
        let booking = self
            .booking
            .find_by_payment_intent(&payload.payment_intent_id, auth_token)
            .await?;

        match payload.status.as_str() {
            "succeeded" | "captured" | "payment_intent.succeeded" => {
                let trigger = self.classify_captured_amount(&booking, payload.amount_cents)?;

                if trigger == AutomationTrigger::DepositCaptured {
                    let mut fields = serde_json::Map::new();
                    fields.insert("deposit_status".to_string(), json!("paid"));
                    self.booking
                        .update_fields(booking.id, fields, auth_token)
                        .await?;
                }

                self.progress_booking_status(booking.id, trigger, auth_token)
                    .await
            }
            "failed" | "payment_intent.payment_failed" => {
                info!("Payment failed for booking {}", booking.id);
                self.booking
                    .log_notification(
                        booking.id,
                        "payment_failed",
                        &booking.customer_email,
                        auth_token,
                    )
                    .await;
                Ok(None)
            }
            other => {
                debug!("Ignoring payment event status {}", other);
                Ok(None)
            }
        }
    }

    // ==============================================================================
    // RULE EVALUATION (pure)
    // ==============================================================================

    /// Decide which transition, if any, a trigger implies for the
    /// booking's current state.
    pub fn evaluate(
        &self,
        booking: &Booking,
        trigger: AutomationTrigger,
        now: DateTime<Utc>,
    ) -> Option<(BookingStatus, &'static str)> {
        use BookingStatus::*;

        match trigger {
            AutomationTrigger::PaymentCaptured => match booking.status {
                Requested | PaymentPending => Some((Confirmed, "payment captured")),
                _ => None,
            },
            AutomationTrigger::DepositCaptured => match booking.status {
                Requested | PaymentPending => Some((Confirmed, "deposit captured")),
                Confirmed => Some((Scheduled, "deposit captured")),
                _ => None,
            },
            AutomationTrigger::ClientConfirmed => match booking.status {
                AwaitingClientAction => Some((Confirmed, "client confirmed")),
                _ => None,
            },
            AutomationTrigger::NotaryCheckIn => match booking.status {
                Scheduled | ReadyForService => Some((InProgress, "notary checked in")),
                _ => None,
            },
            AutomationTrigger::TimeElapsed => {
                let start = booking.scheduled_date_time?;

                match booking.status {
                    Confirmed => {
                        let window =
                            Duration::hours(self.automation.schedule_promotion_window_hours);
                        if start <= now + window {
                            Some((Scheduled, "appointment date approaching"))
                        } else {
                            None
                        }
                    }
                    InProgress => {
                        let end = booking.scheduled_end_time()?;
                        let grace = Duration::minutes(self.automation.no_show_grace_minutes);
                        if now > end + grace {
                            Some((Completed, "service window elapsed"))
                        } else {
                            None
                        }
                    }
                    Scheduled | ReadyForService if self.automation.auto_apply_no_show => {
                        let grace = Duration::minutes(self.automation.no_show_grace_minutes);
                        if now > start + grace {
                            Some((NoShow, "no notary check-in after appointment time"))
                        } else {
                            None
                        }
                    }
                    _ => None,
                }
            }
        }
    }

    /// A missed appointment is surfaced as a suggestion for staff; it
    /// is only auto-applied under the explicit opt-in policy.
    pub fn suggest(&self, booking: &Booking, now: DateTime<Utc>) -> Option<AutomationSuggestion> {
        if !matches!(
            booking.status,
            BookingStatus::Scheduled | BookingStatus::ReadyForService
        ) {
            return None;
        }

        let start = booking.scheduled_date_time?;
        let grace = Duration::minutes(self.automation.no_show_grace_minutes);
        if now <= start + grace {
            return None;
        }

        Some(AutomationSuggestion {
            suggested_status: BookingStatus::NoShow,
            reason: format!(
                "Appointment time passed over {} minutes ago with no notary check-in",
                self.automation.no_show_grace_minutes
            ),
        })
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn classify_captured_amount(
        &self,
        booking: &Booking,
        amount_cents: i64,
    ) -> Result<AutomationTrigger, BookingError> {
        if booking.deposit_cents > 0 && amount_cents == booking.deposit_cents {
            return Ok(AutomationTrigger::DepositCaptured);
        }
        if amount_cents == booking.price_snapshot_cents {
            return Ok(AutomationTrigger::PaymentCaptured);
        }

        error!(
            security_event = true,
            booking_id = %booking.id,
            expected_cents = booking.price_snapshot_cents,
            deposit_cents = booking.deposit_cents,
            received_cents = amount_cents,
            "Payment amount does not match the stored price snapshot"
        );

        Err(BookingError::PricingIntegrity {
            expected_cents: booking.price_snapshot_cents,
            received_cents: amount_cents,
        })
    }

    async fn fire_post_transition_effects(
        &self,
        booking: &Booking,
        outcome: &TransitionOutcome,
        auth_token: Option<&str>,
    ) {
        self.booking
            .log_notification(
                booking.id,
                &format!("status_{}", outcome.new_status),
                &booking.customer_email,
                auth_token,
            )
            .await;
    }
}
