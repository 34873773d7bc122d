use tracing::debug;
use ulid::Ulid;

use crate::model::*;
use crate::observability::state_label;

use super::{BookingError, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptKind {
    Create,
    /// Move an existing appointment; its old slot is released on commit.
    Reschedule { appointment: Appointment },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Submitting {
        request: BookingRequest,
    },
    Committed {
        appointment: Appointment,
    },
    /// The store rejected `rejected`; `slots` is the regenerated offer, never containing its time.
    AwaitingReselection {
        rejected: BookingRequest,
        conflict: ConflictKind,
        slots: Vec<TimeOfDay>,
    },
    /// Nothing left on the rejected date.
    AwaitingDateChange {
        rejected: BookingRequest,
        conflict: ConflictKind,
    },
    Failed {
        request: BookingRequest,
        error: BookingError,
    },
}

/// One user's attempt to book (or move) an appointment.
#[derive(Debug, Clone)]
pub struct BookingAttempt {
    id: Ulid,
    kind: AttemptKind,
    state: AttemptState,
}

impl Default for BookingAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingAttempt {
    pub fn new() -> Self {
        Self {
            id: Ulid::new(),
            kind: AttemptKind::Create,
            state: AttemptState::Idle,
        }
    }

    pub fn reschedule(appointment: Appointment) -> Self {
        Self {
            id: Ulid::new(),
            kind: AttemptKind::Reschedule { appointment },
            state: AttemptState::Idle,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn kind(&self) -> &AttemptKind {
        &self.kind
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn offered_slots(&self) -> Option<&[TimeOfDay]> {
        match &self.state {
            AttemptState::AwaitingReselection { slots, .. } => Some(slots),
            _ => None,
        }
    }

    pub fn committed(&self) -> Option<&Appointment> {
        match &self.state {
            AttemptState::Committed { appointment } => Some(appointment),
            _ => None,
        }
    }

    /// Abandon a non-committed attempt. Returns false if it was already committed.
    pub fn cancel(&mut self) -> bool {
        if matches!(self.state, AttemptState::Committed { .. }) {
            return false;
        }
        self.set_state(AttemptState::Idle);
        true
    }

    pub(crate) fn set_state(&mut self, next: AttemptState) {
        debug!(
            attempt = %self.id,
            from = state_label(&self.state),
            to = state_label(&next),
            "attempt transition"
        );
        self.state = next;
    }

    /// Whether `request` may be submitted from the current state.
    pub(crate) fn check_submittable(&self, request: &BookingRequest) -> Result<(), BookingError> {
        match &self.state {
            AttemptState::Idle | AttemptState::Failed { .. } => Ok(()),
            AttemptState::AwaitingReselection { rejected, slots, .. } => {
                if request.date != rejected.date {
                    return Ok(());
                }
                // The offer only holds for the duration it was generated with.
                if request.duration_minutes != rejected.duration_minutes {
                    return Err(ValidationError::DurationChanged {
                        offered: rejected.duration_minutes,
                        requested: request.duration_minutes,
                    }
                    .into());
                }
                if !slots.contains(&request.time) {
                    return Err(ValidationError::SlotNotOffered(request.time).into());
                }
                Ok(())
            }
            AttemptState::AwaitingDateChange { rejected, .. } => {
                if request.date == rejected.date {
                    return Err(ValidationError::DateChangeRequired(rejected.date).into());
                }
                Ok(())
            }
            state @ (AttemptState::Submitting { .. } | AttemptState::Committed { .. }) => {
                Err(BookingError::InvalidTransition {
                    state: state_label(state),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn request(day: u32, time: &str) -> BookingRequest {
        BookingRequest {
            business_id: "b1".into(),
            service_id: "s1".into(),
            requester: "u1".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            time: t(time),
            duration_minutes: 60,
            notes: None,
        }
    }

    fn appointment() -> Appointment {
        Appointment {
            id: "a1".into(),
            business: "b1".into(),
            service: "s1".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            time: t("10:00"),
            duration_minutes: 60,
        }
    }

    #[test]
    fn idle_and_failed_accept_anything() {
        let mut attempt = BookingAttempt::new();
        assert!(attempt.check_submittable(&request(19, "10:00")).is_ok());
        attempt.set_state(AttemptState::Failed {
            request: request(19, "10:00"),
            error: BookingError::InvalidTransition { state: "x" },
        });
        assert!(attempt.check_submittable(&request(19, "10:00")).is_ok());
    }

    #[test]
    fn reselection_limits_same_date_to_offer() {
        let mut attempt = BookingAttempt::new();
        attempt.set_state(AttemptState::AwaitingReselection {
            rejected: request(19, "10:00"),
            conflict: ConflictKind::TimeConflict,
            slots: vec![t("11:15"), t("11:30")],
        });
        assert_eq!(
            attempt.check_submittable(&request(19, "10:00")),
            Err(BookingError::Validation(ValidationError::SlotNotOffered(t("10:00"))))
        );
        assert!(attempt.check_submittable(&request(19, "11:30")).is_ok());
        assert!(attempt.check_submittable(&request(20, "10:00")).is_ok());
        assert_eq!(attempt.offered_slots(), Some(&[t("11:15"), t("11:30")][..]));
    }

    #[test]
    fn reselection_keeps_offered_duration() {
        let mut attempt = BookingAttempt::new();
        attempt.set_state(AttemptState::AwaitingReselection {
            rejected: request(19, "10:00"),
            conflict: ConflictKind::TimeConflict,
            slots: vec![t("11:15")],
        });
        let mut longer = request(19, "11:15");
        longer.duration_minutes = 120;
        assert_eq!(
            attempt.check_submittable(&longer),
            Err(BookingError::Validation(ValidationError::DurationChanged {
                offered: 60,
                requested: 120
            }))
        );
        let mut other_day = request(20, "11:15");
        other_day.duration_minutes = 120;
        assert!(attempt.check_submittable(&other_day).is_ok());
    }

    #[test]
    fn date_change_requires_new_date() {
        let mut attempt = BookingAttempt::new();
        attempt.set_state(AttemptState::AwaitingDateChange {
            rejected: request(19, "16:00"),
            conflict: ConflictKind::DurationOverlap,
        });
        assert!(matches!(
            attempt.check_submittable(&request(19, "09:00")),
            Err(BookingError::Validation(ValidationError::DateChangeRequired(_)))
        ));
        assert!(attempt.check_submittable(&request(20, "09:00")).is_ok());
    }

    #[test]
    fn committed_is_terminal() {
        let mut attempt = BookingAttempt::reschedule(appointment());
        attempt.set_state(AttemptState::Committed {
            appointment: appointment(),
        });
        assert_eq!(
            attempt.check_submittable(&request(19, "11:00")),
            Err(BookingError::InvalidTransition { state: "committed" })
        );
        assert!(!attempt.cancel());
        assert!(attempt.committed().is_some());
    }

    #[test]
    fn cancel_returns_to_idle() {
        let mut attempt = BookingAttempt::new();
        attempt.set_state(AttemptState::AwaitingDateChange {
            rejected: request(19, "16:00"),
            conflict: ConflictKind::TimeConflict,
        });
        assert!(attempt.cancel());
        assert_eq!(attempt.state(), &AttemptState::Idle);
    }
}
