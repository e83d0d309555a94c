use tracing::{debug, warn};

use crate::models::{BookingError, BookingStatus};

/// Owns the booking status transition table. All status changes in the
/// system pass through `validate_transition`; nothing assigns the
/// status field directly.
pub struct BookingLifecycleService;

impl BookingLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Initial status chosen by the creation workflow: bookings that
    /// collect money up front start in payment_pending.
    pub fn initial_status(&self, requires_upfront_payment: bool) -> BookingStatus {
        if requires_upfront_payment {
            BookingStatus::PaymentPending
        } else {
            BookingStatus::Requested
        }
    }

    pub fn validate_transition(
        &self,
        from: &BookingStatus,
        to: &BookingStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition {} -> {}", from, to);

        if !self.valid_transitions(from).contains(to) {
            warn!("Invalid status transition attempted: {} -> {}", from, to);
            return Err(BookingError::InvalidTransition {
                from: *from,
                to: *to,
            });
        }

        Ok(())
    }

    pub fn valid_transitions(&self, from: &BookingStatus) -> Vec<BookingStatus> {
        use BookingStatus::*;

        match from {
            Requested => vec![PaymentPending, Confirmed, CancelledByClient, CancelledByStaff],
            PaymentPending => vec![Confirmed, CancelledByClient, CancelledByStaff],
            Confirmed => vec![
                Scheduled,
                RequiresReschedule,
                CancelledByClient,
                CancelledByStaff,
            ],
            Scheduled => vec![
                ReadyForService,
                InProgress,
                RequiresReschedule,
                NoShow,
                CancelledByClient,
                CancelledByStaff,
            ],
            AwaitingClientAction => vec![
                Confirmed,
                Scheduled,
                CancelledByClient,
                CancelledByStaff,
            ],
            ReadyForService => vec![InProgress, NoShow, CancelledByClient, CancelledByStaff],
            InProgress => vec![Completed, CancelledByStaff],
            Completed => vec![Archived],
            CancelledByClient => vec![Archived],
            CancelledByStaff => vec![Archived],
            RequiresReschedule => vec![Scheduled, CancelledByClient, CancelledByStaff],
            NoShow => vec![Scheduled, CancelledByClient, Archived],
            Archived => vec![],
        }
    }

    pub fn is_terminal(&self, status: &BookingStatus) -> bool {
        matches!(status, BookingStatus::Archived)
    }

    /// Statuses that hold calendar capacity for conflict exclusion.
    pub fn is_active(&self, status: &BookingStatus) -> bool {
        matches!(
            status,
            BookingStatus::PaymentPending
                | BookingStatus::Confirmed
                | BookingStatus::Scheduled
                | BookingStatus::ReadyForService
                | BookingStatus::InProgress
        )
    }
}

impl Default for BookingLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use BookingStatus::*;

    const ALL_STATUSES: [BookingStatus; 13] = [
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
    ];

    #[test]
    fn test_every_listed_transition_validates() {
        let lifecycle = BookingLifecycleService::new();

        for from in ALL_STATUSES {
            for to in lifecycle.valid_transitions(&from) {
                assert!(
                    lifecycle.validate_transition(&from, &to).is_ok(),
                    "{} -> {} should be legal",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_every_unlisted_transition_fails_with_both_states_named() {
        let lifecycle = BookingLifecycleService::new();

        for from in ALL_STATUSES {
            let allowed = lifecycle.valid_transitions(&from);
            for to in ALL_STATUSES {
                if allowed.contains(&to) {
                    continue;
                }
                let err = lifecycle.validate_transition(&from, &to).unwrap_err();
                assert_matches!(
                    err,
                    BookingError::InvalidTransition { from: f, to: t }
                        if f == from && t == to
                );
            }
        }
    }

    #[test]
    fn test_archived_is_terminal() {
        let lifecycle = BookingLifecycleService::new();
        assert!(lifecycle.is_terminal(&Archived));
        assert!(lifecycle.valid_transitions(&Archived).is_empty());
    }

    #[test]
    fn test_archive_only_reachable_from_closing_states() {
        let lifecycle = BookingLifecycleService::new();

        let can_archive: Vec<BookingStatus> = ALL_STATUSES
            .into_iter()
            .filter(|from| lifecycle.valid_transitions(from).contains(&Archived))
            .collect();

        assert_eq!(
            can_archive,
            vec![Completed, NoShow, CancelledByClient, CancelledByStaff]
        );
    }

    #[test]
    fn test_self_transitions_are_rejected() {
        let lifecycle = BookingLifecycleService::new();
        for status in ALL_STATUSES {
            assert!(lifecycle.validate_transition(&status, &status).is_err());
        }
    }

    #[test]
    fn test_initial_status_depends_on_upfront_payment() {
        let lifecycle = BookingLifecycleService::new();
        assert_eq!(lifecycle.initial_status(true), PaymentPending);
        assert_eq!(lifecycle.initial_status(false), Requested);
    }

    #[test]
    fn test_active_statuses_hold_capacity() {
        let lifecycle = BookingLifecycleService::new();

        for status in [PaymentPending, Confirmed, Scheduled, ReadyForService, InProgress] {
            assert!(lifecycle.is_active(&status), "{} should hold capacity", status);
        }
        for status in [Requested, Completed, NoShow, CancelledByClient, Archived] {
            assert!(!lifecycle.is_active(&status), "{} should not hold capacity", status);
        }
    }

    #[test]
    fn test_completed_work_cannot_be_cancelled() {
        let lifecycle = BookingLifecycleService::new();
        assert!(lifecycle
            .validate_transition(&Completed, &CancelledByStaff)
            .is_err());
        assert!(lifecycle
            .validate_transition(&Completed, &CancelledByClient)
            .is_err());
    }
}
