use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Whole minutes. There is no sub-minute precision anywhere.
pub type Minutes = u32;

const MINUTES_PER_DAY: u32 = 24 * 60;

// ── Identifiers ─────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque business identifier issued by the appointment store.
    BusinessId
);
string_id!(ServiceId);
string_id!(UserId);
string_id!(AppointmentId);

/// A business on a calendar date: the unit of booked-set ownership,
/// cache invalidation, and change notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusinessDay {
    pub business: BusinessId,
    pub date: NaiveDate,
}

impl BusinessDay {
    pub fn new(business: BusinessId, date: NaiveDate) -> Self {
        Self { business, date }
    }
}

impl fmt::Display for BusinessDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.business, self.date)
    }
}

// ── TimeOfDay ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time of day: {0:?}")]
pub struct ParseTimeError(pub String);

/// Business-local wall-clock time with minute resolution. External form is `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { minutes: 0 };

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                minutes: (hour * 60 + minute) as u16,
            })
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self {
            minutes: minutes as u16,
        })
    }

    pub fn hour(&self) -> u32 {
        u32::from(self.minutes) / 60
    }

    pub fn minute(&self) -> u32 {
        u32::from(self.minutes) % 60
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        u32::from(self.minutes)
    }

    /// Project onto a calendar date.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + TimeDelta::minutes(i64::from(self.minutes))
    }

    /// Wall-clock time of an instant, seconds truncated.
    pub fn of(instant: NaiveDateTime) -> Self {
        Self {
            minutes: (instant.hour() * 60 + instant.minute()) as u16,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// The single boundary parser. Accepts 24-hour `H:MM`/`HH:MM` and
/// 12-hour `h:MM AM`/`h:MM PM` (case-insensitive, space optional).
impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();

        let (clock, meridiem) = if let Some(rest) = lower.strip_suffix("am") {
            (rest.trim_end(), Some(false))
        } else if let Some(rest) = lower.strip_suffix("pm") {
            (rest.trim_end(), Some(true))
        } else {
            (lower.as_str(), None)
        };

        let (h, m) = clock.split_once(':').ok_or_else(err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(err());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let hour: u32 = h.parse().map_err(|_| err())?;
        let minute: u32 = m.parse().map_err(|_| err())?;

        let hour = match meridiem {
            None => hour,
            Some(_) if !(1..=12).contains(&hour) => return Err(err()),
            Some(false) => hour % 12,
            Some(true) => hour % 12 + 12,
        };
        TimeOfDay::new(hour, minute).ok_or_else(err)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Spans ───────────────────────────────────────────────────────

/// Half-open interval `[start, end)` of business-local instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// A booking or break projected onto a date. Derived, never persisted.
pub type BlockedInterval = Span;

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    /// `[date+start, date+start+duration)`.
    pub fn at(date: NaiveDate, start: TimeOfDay, duration: Minutes) -> Self {
        let start = start.on(date);
        Self::new(start, start + TimeDelta::minutes(i64::from(duration)))
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Widened by `margin` minutes on both sides.
    pub fn expanded(&self, margin: Minutes) -> Span {
        let margin = TimeDelta::minutes(i64::from(margin));
        Span::new(self.start - margin, self.end + margin)
    }

    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Working hours (wire form) ───────────────────────────────────

/// The seven weekday keys used by the appointment store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayKey {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayKey {
    pub const ALL: [DayKey; 7] = [
        DayKey::Mon,
        DayKey::Tue,
        DayKey::Wed,
        DayKey::Thu,
        DayKey::Fri,
        DayKey::Sat,
        DayKey::Sun,
    ];

    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayKey::Mon => "mon",
            DayKey::Tue => "tue",
            DayKey::Wed => "wed",
            DayKey::Thu => "thu",
            DayKey::Fri => "fri",
            DayKey::Sat => "sat",
            DayKey::Sun => "sun",
        }
    }
}

impl From<Weekday> for DayKey {
    fn from(w: Weekday) -> Self {
        match w {
            Weekday::Mon => DayKey::Mon,
            Weekday::Tue => DayKey::Tue,
            Weekday::Wed => DayKey::Wed,
            Weekday::Thu => DayKey::Thu,
            Weekday::Fri => DayKey::Fri,
            Weekday::Sat => DayKey::Sat,
            Weekday::Sun => DayKey::Sun,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Break {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

/// One weekday as published by the store. Missing `open` or `close` means closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    #[serde(default)]
    pub open: Option<TimeOfDay>,
    #[serde(default)]
    pub close: Option<TimeOfDay>,
    #[serde(default)]
    pub breaks: Vec<Break>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkingHours(pub BTreeMap<DayKey, DaySchedule>);

impl WorkingHours {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper: open `day` from `open` to `close` with `breaks`.
    pub fn with_day(
        mut self,
        day: DayKey,
        open: TimeOfDay,
        close: TimeOfDay,
        breaks: Vec<Break>,
    ) -> Self {
        self.0.insert(
            day,
            DaySchedule {
                open: Some(open),
                close: Some(close),
                breaks,
            },
        );
        self
    }

    pub fn get(&self, day: DayKey) -> Option<&DaySchedule> {
        self.0.get(&day)
    }
}

// ── Bookings ────────────────────────────────────────────────────

/// One committed appointment occupying the business on some date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedSlot {
    pub start: TimeOfDay,
    pub duration_minutes: Minutes,
}

impl BookedSlot {
    pub fn new(start: TimeOfDay, duration_minutes: Minutes) -> Self {
        Self { start, duration_minutes }
    }

    pub fn span_on(&self, date: NaiveDate) -> Span {
        Span::at(date, self.start, self.duration_minutes)
    }
}

/// Booked appointment as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedAppointment {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub duration_minutes: Minutes,
}

impl BookedAppointment {
    pub fn slot(&self) -> BookedSlot {
        BookedSlot::new(self.time, self.duration_minutes)
    }
}

/// Payload submitted to the appointment store. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[serde(rename = "business")]
    pub business_id: BusinessId,
    #[serde(rename = "service")]
    pub service_id: ServiceId,
    #[serde(rename = "user")]
    pub requester: UserId,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub duration_minutes: Minutes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn business_day(&self) -> BusinessDay {
        BusinessDay::new(self.business_id.clone(), self.date)
    }

    pub fn slot(&self) -> BookedSlot {
        BookedSlot::new(self.time, self.duration_minutes)
    }
}

/// Appointment record returned by the store after a create or reschedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(alias = "_id")]
    pub id: AppointmentId,
    pub business: BusinessId,
    pub service: ServiceId,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub duration_minutes: Minutes,
}

impl Appointment {
    pub fn business_day(&self) -> BusinessDay {
        BusinessDay::new(self.business.clone(), self.date)
    }

    pub fn slot(&self) -> BookedSlot {
        BookedSlot::new(self.time, self.duration_minutes)
    }
}

// ── Conflicts ───────────────────────────────────────────────────

/// Reasons the store rejects a commit because the slot is no longer valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    TimeConflict,
    RaceCondition,
    DuplicateBooking,
    DurationOverlap,
}

impl ConflictKind {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictKind::TimeConflict => "TIME_CONFLICT",
            ConflictKind::RaceCondition => "RACE_CONDITION",
            ConflictKind::DuplicateBooking => "DUPLICATE_BOOKING",
            ConflictKind::DurationOverlap => "DURATION_OVERLAP",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "TIME_CONFLICT" => Some(ConflictKind::TimeConflict),
            "RACE_CONDITION" => Some(ConflictKind::RaceCondition),
            "DUPLICATE_BOOKING" => Some(ConflictKind::DuplicateBooking),
            "DURATION_OVERLAP" => Some(ConflictKind::DurationOverlap),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Change to the booked set of one business day, as broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookedSetChange {
    Added { slot: BookedSlot },
    Released { slot: BookedSlot },
    /// Replaced wholesale by a fresh fetch from the store.
    Refreshed,
}
