use chrono::{NaiveDate, TimeDelta};
use thiserror::Error;

use crate::limits::{MAX_DURATION_MINUTES, MAX_NOTES_LEN};
use crate::model::*;

/// Input problems caught before anything is sent to the appointment store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duration must be positive")]
    NonPositiveDuration,
    #[error("duration of {0} minutes exceeds a day")]
    DurationTooLong(Minutes),
    #[error("{date} is outside the {days}-day booking window starting {today}")]
    OutsideLookahead {
        date: NaiveDate,
        today: NaiveDate,
        days: u32,
    },
    #[error("no date selected")]
    MissingDate,
    #[error("no time selected")]
    MissingTime,
    #[error("{0} is not among the offered slots")]
    SlotNotOffered(TimeOfDay),
    #[error("slots were offered for {offered} minutes, not {requested}")]
    DurationChanged { offered: Minutes, requested: Minutes },
    #[error("no slots left on {0}; pick another date")]
    DateChangeRequired(NaiveDate),
    #[error("notes exceed {} characters", MAX_NOTES_LEN)]
    NotesTooLong,
    #[error("appointment belongs to a different business")]
    BusinessMismatch,
}

pub fn validate_duration(duration: Minutes) -> Result<(), ValidationError> {
    if duration == 0 {
        return Err(ValidationError::NonPositiveDuration);
    }
    if duration > MAX_DURATION_MINUTES {
        return Err(ValidationError::DurationTooLong(duration));
    }
    Ok(())
}

/// `date` must fall in `[today, today + days]`. A window running past the
/// calendar's end is open-ended.
pub fn validate_date(date: NaiveDate, today: NaiveDate, days: u32) -> Result<(), ValidationError> {
    let last = today
        .checked_add_signed(TimeDelta::days(i64::from(days)))
        .unwrap_or(NaiveDate::MAX);
    if date < today || date > last {
        return Err(ValidationError::OutsideLookahead { date, today, days });
    }
    Ok(())
}

/// What the user has picked so far. Becomes a [`BookingRequest`] once complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    pub business: BusinessId,
    pub service: ServiceId,
    pub requester: UserId,
    pub duration_minutes: Minutes,
    pub date: Option<NaiveDate>,
    pub time: Option<TimeOfDay>,
    pub notes: Option<String>,
}

impl BookingDraft {
    pub fn new(
        business: BusinessId,
        service: ServiceId,
        requester: UserId,
        duration_minutes: Minutes,
    ) -> Self {
        Self {
            business,
            service,
            requester,
            duration_minutes,
            date: None,
            time: None,
            notes: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn at(mut self, time: TimeOfDay) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn to_request(
        &self,
        today: NaiveDate,
        lookahead_days: u32,
    ) -> Result<BookingRequest, ValidationError> {
        validate_duration(self.duration_minutes)?;
        let date = self.date.ok_or(ValidationError::MissingDate)?;
        validate_date(date, today, lookahead_days)?;
        let time = self.time.ok_or(ValidationError::MissingTime)?;

        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        if notes.is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(ValidationError::NotesTooLong);
        }

        Ok(BookingRequest {
            business_id: self.business.clone(),
            service_id: self.service.clone(),
            requester: self.requester.clone(),
            date,
            time,
            duration_minutes: self.duration_minutes,
            notes: notes.map(str::to_string),
        })
    }
}
