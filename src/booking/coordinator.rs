use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppointmentApi};
use crate::clock::Clock;
use crate::config::Config;
use crate::engine::{
    generate_slots, same_day_cutoff, BookedSlotStore, CacheStats, EngineError, SlotCache, SlotKey,
    SlotParams, WorkingHoursModel,
};
use crate::model::*;
use crate::notify::{Notification, NotifyHub};
use crate::observability::{BOOKING_ATTEMPTS_TOTAL, CONFLICTS_TOTAL};

use super::validation::{validate_date, validate_duration};
use super::{AttemptKind, AttemptState, BookingAttempt, BookingDraft, BookingError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub buffer_minutes: Minutes,
    pub lookahead_days: u32,
    pub cache_capacity: usize,
    pub call_timeout: Duration,
    pub max_slot_iterations: usize,
}

impl From<&Config> for CoordinatorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            buffer_minutes: cfg.buffer_minutes,
            lookahead_days: cfg.lookahead_days,
            cache_capacity: cfg.cache_capacity,
            call_timeout: cfg.submit_timeout,
            max_slot_iterations: cfg.max_slot_iterations,
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Owns everything this process knows about availability: working hours,
/// booked slots, cached slot lists and change subscriptions. Shared behind
/// `Arc`; the appointment store stays the only authority on what is booked.
pub struct BookingCoordinator {
    api: Arc<dyn AppointmentApi>,
    clock: Arc<dyn Clock>,
    settings: CoordinatorSettings,
    hours: DashMap<BusinessId, Arc<WorkingHoursModel>>,
    booked: BookedSlotStore,
    cache: SlotCache,
    notify: NotifyHub,
}

impl BookingCoordinator {
    pub fn new(
        api: Arc<dyn AppointmentApi>,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            api,
            clock,
            settings,
            hours: DashMap::new(),
            booked: BookedSlotStore::new(),
            cache: SlotCache::new(settings.cache_capacity),
            notify: NotifyHub::new(),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Run one store call under the configured timeout.
    async fn call<T>(
        &self,
        name: &'static str,
        fut: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => {
                if let Err(e) = &result {
                    debug!(call = name, error = %e, "appointment store call failed");
                }
                result
            }
            Err(_) => {
                warn!(
                    call = name,
                    timeout = ?self.settings.call_timeout,
                    "appointment store call timed out"
                );
                Err(ApiError::Timeout(self.settings.call_timeout))
            }
        }
    }

    // ── Reference data ────────────────────────────────────────

    /// Weekly hours for a business, fetched once and validated.
    pub async fn working_hours(
        &self,
        business: &BusinessId,
    ) -> Result<Arc<WorkingHoursModel>, BookingError> {
        if let Some(model) = self.hours.get(business) {
            return Ok(model.value().clone());
        }
        let raw = self.call("working_hours", self.api.working_hours(business)).await?;
        let model = Arc::new(WorkingHoursModel::new(&raw)?);
        if model.is_closed_all_week() {
            info!(%business, "business has no opening hours on any weekday");
        }
        self.hours.insert(business.clone(), model.clone());
        Ok(model)
    }

    /// Drop hours, booked sets and cached slots for a business.
    pub fn forget_business(&self, business: &BusinessId) {
        self.hours.remove(business);
        self.booked.forget_business(business);
        let dropped = self.cache.invalidate_business(business);
        self.notify.prune();
        debug!(%business, dropped, "business forgotten");
    }

    /// Fetch a day's booked set from the store and make it the local truth.
    async fn fetch_booked(&self, day: &BusinessDay) -> Result<Vec<BookedSlot>, ApiError> {
        let listed = self
            .call("booked_slots", self.api.booked_slots(&day.business, Some(day.date)))
            .await?;
        let slots: Vec<BookedSlot> = listed
            .iter()
            .filter(|a| a.date == day.date)
            .map(BookedAppointment::slot)
            .collect();
        debug!(%day, count = slots.len(), "booked set fetched");
        self.booked.replace(day.clone(), slots);
        Ok(self.booked.get(day).unwrap_or_default())
    }

    async fn booked_for(&self, day: &BusinessDay) -> Result<Vec<BookedSlot>, ApiError> {
        match self.booked.get(day) {
            Some(slots) => Ok(slots),
            None => self.fetch_booked(day).await,
        }
    }

    /// Locally known booked set for a day, if it was ever fetched.
    pub fn booked(&self, day: &BusinessDay) -> Option<Vec<BookedSlot>> {
        self.booked.get(day)
    }

    // ── Availability ──────────────────────────────────────────

    fn compute_slots(
        &self,
        day: &BusinessDay,
        hours: &WorkingHoursModel,
        booked: &[BookedSlot],
        duration: Minutes,
    ) -> Result<Vec<TimeOfDay>, EngineError> {
        let params = SlotParams::new(duration, self.settings.buffer_minutes)
            .with_max_iterations(self.settings.max_slot_iterations);
        let now = self.clock.now();
        let mut key = SlotKey::new(day.clone(), &params, booked);
        if day.date == now.date() {
            let cutoff = same_day_cutoff(now, params.buffer_minutes, params.step_minutes());
            key = key.not_before(cutoff);
        }
        self.cache.get_or_compute(&key, || {
            generate_slots(day.date, hours.hours_for(day.date), booked, &params, now)
        })
    }

    /// Bookable start times for `duration` on `date`, chronological.
    pub async fn available_slots(
        &self,
        business: &BusinessId,
        date: NaiveDate,
        duration: Minutes,
    ) -> Result<Vec<TimeOfDay>, BookingError> {
        validate_duration(duration)?;
        validate_date(date, self.clock.today(), self.settings.lookahead_days)?;

        let hours = self.working_hours(business).await?;
        let day = BusinessDay::new(business.clone(), date);
        if hours.hours_for(date).is_none() {
            return Ok(Vec::new());
        }
        let booked = self.booked_for(&day).await?;
        Ok(self.compute_slots(&day, &hours, &booked, duration)?)
    }

    /// Slots an existing appointment could move to. Its own slot counts as free.
    pub async fn reschedule_slots(
        &self,
        appointment: &Appointment,
        date: NaiveDate,
        duration: Minutes,
    ) -> Result<Vec<TimeOfDay>, BookingError> {
        validate_duration(duration)?;
        validate_date(date, self.clock.today(), self.settings.lookahead_days)?;

        let hours = self.working_hours(&appointment.business).await?;
        let day = BusinessDay::new(appointment.business.clone(), date);
        let booked = self.booked_for(&day).await?;
        let basis = without_own_slot(booked, appointment, &day);
        Ok(self.compute_slots(&day, &hours, &basis, duration)?)
    }

    /// Explicit revisit of a date: refetch, invalidate, notify.
    pub async fn refresh_date(
        &self,
        business: &BusinessId,
        date: NaiveDate,
    ) -> Result<Vec<BookedSlot>, BookingError> {
        let day = BusinessDay::new(business.clone(), date);
        self.cache.invalidate(&day);
        let slots = self.fetch_booked(&day).await?;
        self.notify.send(&day, BookedSetChange::Refreshed);
        Ok(slots)
    }

    // ── Booking ───────────────────────────────────────────────

    /// Drive `attempt` through one submission of `draft`.
    ///
    /// Returns `Ok` once the attempt is `Committed`, `AwaitingReselection` or
    /// `AwaitingDateChange`. Validation errors leave the attempt untouched and
    /// make no call; any other error leaves it `Failed`.
    pub async fn submit(
        &self,
        attempt: &mut BookingAttempt,
        draft: &BookingDraft,
    ) -> Result<(), BookingError> {
        let request = draft.to_request(self.clock.today(), self.settings.lookahead_days)?;
        attempt.check_submittable(&request)?;
        let previous = match attempt.kind() {
            AttemptKind::Reschedule { appointment } => {
                if appointment.business != request.business_id {
                    return Err(ValidationError::BusinessMismatch.into());
                }
                Some(appointment.clone())
            }
            AttemptKind::Create => None,
        };

        let day = request.business_day();
        info!(
            attempt = %attempt.id(),
            %day,
            time = %request.time,
            duration = request.duration_minutes,
            "submitting booking"
        );
        attempt.set_state(AttemptState::Submitting {
            request: request.clone(),
        });

        let released = previous.as_ref().is_some_and(|prev| self.release_locally(prev));
        let outcome = match &previous {
            None => {
                self.call("create_appointment", self.api.create_appointment(&request))
                    .await
            }
            Some(prev) => {
                self.call(
                    "reschedule_appointment",
                    self.api.reschedule_appointment(
                        &prev.id,
                        request.date,
                        request.time,
                        request.duration_minutes,
                    ),
                )
                .await
            }
        };

        match outcome {
            Ok(appointment) => {
                self.apply_commit(previous.as_ref(), &appointment);
                info!(
                    attempt = %attempt.id(),
                    id = %appointment.id,
                    %day,
                    time = %appointment.time,
                    "booking committed"
                );
                metrics::counter!(BOOKING_ATTEMPTS_TOTAL, "outcome" => "committed").increment(1);
                attempt.set_state(AttemptState::Committed { appointment });
                Ok(())
            }
            Err(ApiError::Conflict(conflict)) => {
                if released && let Some(prev) = &previous {
                    self.restore_locally(prev);
                }
                self.recover(attempt, request, conflict, previous.as_ref()).await
            }
            Err(error) => {
                if released && let Some(prev) = &previous {
                    self.restore_locally(prev);
                }
                warn!(
                    attempt = %attempt.id(),
                    %day,
                    error = %error,
                    retryable = error.is_retryable(),
                    "booking failed"
                );
                metrics::counter!(BOOKING_ATTEMPTS_TOTAL, "outcome" => "failed").increment(1);
                let error = BookingError::from(error);
                attempt.set_state(AttemptState::Failed {
                    request,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Conflict recovery: refetch, regenerate, and never offer the rejected time again.
    async fn recover(
        &self,
        attempt: &mut BookingAttempt,
        request: BookingRequest,
        conflict: ConflictKind,
        previous: Option<&Appointment>,
    ) -> Result<(), BookingError> {
        let day = request.business_day();
        warn!(
            attempt = %attempt.id(),
            %day,
            time = %request.time,
            %conflict,
            "slot taken by another booking"
        );
        metrics::counter!(CONFLICTS_TOTAL, "kind" => conflict.code()).increment(1);
        self.cache.invalidate(&day);

        let regenerated = async {
            let (booked, hours) = futures::try_join!(
                async { self.fetch_booked(&day).await.map_err(BookingError::from) },
                self.working_hours(&request.business_id),
            )?;
            self.notify.send(&day, BookedSetChange::Refreshed);
            let basis = match previous {
                Some(prev) => without_own_slot(booked, prev, &day),
                None => booked,
            };
            // The cache keeps the unfiltered list; the rejected time is only
            // withheld from this attempt's offer.
            let mut slots = self.compute_slots(&day, &hours, &basis, request.duration_minutes)?;
            slots.retain(|t| *t != request.time);
            Ok::<_, BookingError>(slots)
        }
        .await;

        let slots = match regenerated {
            Ok(slots) => slots,
            Err(error) => {
                warn!(
                    attempt = %attempt.id(),
                    %day,
                    error = %error,
                    "could not refresh availability after conflict"
                );
                metrics::counter!(BOOKING_ATTEMPTS_TOTAL, "outcome" => "failed").increment(1);
                attempt.set_state(AttemptState::Failed {
                    request,
                    error: error.clone(),
                });
                return Err(error);
            }
        };

        metrics::counter!(BOOKING_ATTEMPTS_TOTAL, "outcome" => "conflict").increment(1);
        if slots.is_empty() {
            info!(attempt = %attempt.id(), %day, "no slots left; date change required");
            attempt.set_state(AttemptState::AwaitingDateChange {
                rejected: request,
                conflict,
            });
        } else {
            info!(attempt = %attempt.id(), %day, offered = slots.len(), "awaiting reselection");
            attempt.set_state(AttemptState::AwaitingReselection {
                rejected: request,
                conflict,
                slots,
            });
        }
        Ok(())
    }

    /// Take a rescheduled appointment's old slot out of the local set ahead of the store call.
    fn release_locally(&self, appointment: &Appointment) -> bool {
        let day = appointment.business_day();
        let released = self.booked.remove(&day, &appointment.slot());
        if released {
            self.cache.invalidate(&day);
        }
        released
    }

    fn restore_locally(&self, appointment: &Appointment) {
        let day = appointment.business_day();
        if self.booked.insert(&day, appointment.slot()) {
            self.cache.invalidate(&day);
            debug!(%day, time = %appointment.time, "released slot restored");
        }
    }

    fn apply_commit(&self, previous: Option<&Appointment>, appointment: &Appointment) {
        if let Some(prev) = previous {
            let old_day = prev.business_day();
            self.cache.invalidate(&old_day);
            self.notify.send(&old_day, BookedSetChange::Released { slot: prev.slot() });
        }
        let day = appointment.business_day();
        let slot = appointment.slot();
        if !self.booked.insert(&day, slot) {
            debug!(%day, "committed into a day never fetched; next read will fetch it");
        }
        self.cache.invalidate(&day);
        self.notify.send(&day, BookedSetChange::Added { slot });
    }

    /// Cancel a committed appointment and free its slot.
    pub async fn cancel_appointment(&self, appointment: &Appointment) -> Result<(), BookingError> {
        self.call("cancel_appointment", self.api.cancel_appointment(&appointment.id))
            .await?;
        let day = appointment.business_day();
        self.booked.remove(&day, &appointment.slot());
        self.cache.invalidate(&day);
        self.notify.send(&day, BookedSetChange::Released {
            slot: appointment.slot(),
        });
        info!(id = %appointment.id, %day, time = %appointment.time, "appointment cancelled");
        Ok(())
    }

    // ── Subscriptions & introspection ─────────────────────────

    pub fn subscribe(
        &self,
        business: &BusinessId,
        date: NaiveDate,
    ) -> broadcast::Receiver<Notification> {
        self.notify.subscribe(BusinessDay::new(business.clone(), date))
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Notification> {
        self.notify.subscribe_all()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn without_own_slot(
    mut booked: Vec<BookedSlot>,
    appointment: &Appointment,
    day: &BusinessDay,
) -> Vec<BookedSlot> {
    if appointment.business_day() == *day
        && let Some(pos) = booked.iter().position(|s| *s == appointment.slot())
    {
        booked.remove(pos);
    }
    booked
}
