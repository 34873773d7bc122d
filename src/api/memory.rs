use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::model::*;

use super::{ApiError, AppointmentApi};

#[derive(Debug, Clone)]
struct Record {
    appointment: Appointment,
    requester: UserId,
    cancelled: bool,
}

/// Authoritative appointment store held in memory. Enforces at-most-one
/// booking per slot the way a real backend would, so several coordinators
/// can race against one instance.
pub struct InMemoryAppointmentApi {
    hours: DashMap<BusinessId, WorkingHours>,
    records: Mutex<Vec<Record>>,
    scripted: Mutex<VecDeque<ApiError>>,
    buffer_minutes: Minutes,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl Default for InMemoryAppointmentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAppointmentApi {
    pub fn new() -> Self {
        Self {
            hours: DashMap::new(),
            records: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            buffer_minutes: 0,
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Also reject bookings closer than `minutes` to an existing one.
    pub fn with_buffer(mut self, minutes: Minutes) -> Self {
        self.buffer_minutes = minutes;
        self
    }

    /// Delay every call, e.g. to trip a caller's timeout.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_hours(&self, business: BusinessId, hours: WorkingHours) {
        self.hours.insert(business, hours);
    }

    /// Record an existing booking without going through validation.
    pub async fn seed(
        &self,
        business: &BusinessId,
        date: NaiveDate,
        slot: BookedSlot,
    ) -> AppointmentId {
        let appointment = Appointment {
            id: AppointmentId::new(Ulid::new().to_string()),
            business: business.clone(),
            service: ServiceId::from("seed"),
            date,
            time: slot.start,
            duration_minutes: slot.duration_minutes,
        };
        let id = appointment.id.clone();
        self.records.lock().await.push(Record {
            appointment,
            requester: UserId::from("seed"),
            cancelled: false,
        });
        id
    }

    /// The next call fails with `error` instead of running. Queued in order.
    pub async fn fail_next(&self, error: ApiError) {
        self.scripted.lock().await.push_back(error);
    }

    /// Number of calls received, including scripted failures.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn appointment(&self, id: &AppointmentId) -> Option<Appointment> {
        let records = self.records.lock().await;
        records
            .iter()
            .find(|r| &r.appointment.id == id && !r.cancelled)
            .map(|r| r.appointment.clone())
    }

    async fn enter(&self) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.scripted.lock().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// How the store would reject `slot` for `requester`, ignoring `except`.
    fn classify(
        &self,
        records: &[Record],
        business: &BusinessId,
        date: NaiveDate,
        slot: BookedSlot,
        requester: &UserId,
        except: Option<&AppointmentId>,
    ) -> Option<ConflictKind> {
        let wanted = slot.span_on(date);
        records
            .iter()
            .filter(|r| !r.cancelled && Some(&r.appointment.id) != except)
            .filter(|r| &r.appointment.business == business && r.appointment.date == date)
            .find_map(|r| {
                let existing = r.appointment.slot();
                if existing.start == slot.start {
                    Some(if &r.requester == requester {
                        ConflictKind::DuplicateBooking
                    } else {
                        ConflictKind::TimeConflict
                    })
                } else if existing.span_on(date).expanded(self.buffer_minutes).overlaps(&wanted) {
                    Some(ConflictKind::DurationOverlap)
                } else {
                    None
                }
            })
    }
}

#[async_trait]
impl AppointmentApi for InMemoryAppointmentApi {
    async fn working_hours(&self, business: &BusinessId) -> Result<WorkingHours, ApiError> {
        self.enter().await?;
        self.hours
            .get(business)
            .map(|h| h.value().clone())
            .ok_or_else(|| ApiError::NotFound(format!("business {business}")))
    }

    async fn booked_slots(
        &self,
        business: &BusinessId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<BookedAppointment>, ApiError> {
        self.enter().await?;
        let records = self.records.lock().await;
        let mut out: Vec<BookedAppointment> = records
            .iter()
            .filter(|r| !r.cancelled && &r.appointment.business == business)
            .filter(|r| date.is_none_or(|d| r.appointment.date == d))
            .map(|r| BookedAppointment {
                date: r.appointment.date,
                time: r.appointment.time,
                duration_minutes: r.appointment.duration_minutes,
            })
            .collect();
        out.sort_by_key(|a| (a.date, a.time));
        Ok(out)
    }

    async fn create_appointment(&self, request: &BookingRequest) -> Result<Appointment, ApiError> {
        self.enter().await?;
        let mut records = self.records.lock().await;
        if let Some(kind) = self.classify(
            &records,
            &request.business_id,
            request.date,
            request.slot(),
            &request.requester,
            None,
        ) {
            return Err(ApiError::Conflict(kind));
        }

        let appointment = Appointment {
            id: AppointmentId::new(Ulid::new().to_string()),
            business: request.business_id.clone(),
            service: request.service_id.clone(),
            date: request.date,
            time: request.time,
            duration_minutes: request.duration_minutes,
        };
        records.push(Record {
            appointment: appointment.clone(),
            requester: request.requester.clone(),
            cancelled: false,
        });
        Ok(appointment)
    }

    async fn reschedule_appointment(
        &self,
        id: &AppointmentId,
        date: NaiveDate,
        time: TimeOfDay,
        duration_minutes: Minutes,
    ) -> Result<Appointment, ApiError> {
        self.enter().await?;
        let mut records = self.records.lock().await;
        let Some(pos) = records.iter().position(|r| &r.appointment.id == id && !r.cancelled) else {
            return Err(ApiError::NotFound(format!("appointment {id}")));
        };

        let business = records[pos].appointment.business.clone();
        let requester = records[pos].requester.clone();
        let slot = BookedSlot::new(time, duration_minutes);
        if let Some(kind) = self.classify(&records, &business, date, slot, &requester, Some(id)) {
            return Err(ApiError::Conflict(kind));
        }

        let appointment = &mut records[pos].appointment;
        appointment.date = date;
        appointment.time = time;
        appointment.duration_minutes = duration_minutes;
        Ok(appointment.clone())
    }

    async fn cancel_appointment(&self, id: &AppointmentId) -> Result<(), ApiError> {
        self.enter().await?;
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| &r.appointment.id == id && !r.cancelled) {
            Some(record) => {
                record.cancelled = true;
                Ok(())
            }
            None => Err(ApiError::NotFound(format!("appointment {id}"))),
        }
    }
}
