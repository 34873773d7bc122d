use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use tracing::warn;

use crate::limits::{DEFAULT_MAX_SLOT_ITERATIONS, MIN_STEP_MINUTES};
use crate::model::*;

use super::blocked::build_blocked_intervals;
use super::conflict::first_collision;
use super::hours::DayHours;
use super::EngineError;

// ── Slot generation ───────────────────────────────────────────────

/// Per-query knobs of the generator. `duration` and `buffer` are also part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotParams {
    pub duration_minutes: Minutes,
    pub buffer_minutes: Minutes,
    pub max_iterations: usize,
}

impl SlotParams {
    pub fn new(duration_minutes: Minutes, buffer_minutes: Minutes) -> Self {
        Self {
            duration_minutes,
            buffer_minutes,
            max_iterations: DEFAULT_MAX_SLOT_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Distance between consecutive candidates. A zero buffer still advances by a minute.
    pub fn step_minutes(&self) -> Minutes {
        self.buffer_minutes.max(MIN_STEP_MINUTES)
    }
}

/// Earliest start offered today: the first multiple of `step` (counted from
/// midnight) strictly after `now + buffer`.
pub fn same_day_cutoff(now: NaiveDateTime, buffer: Minutes, step: Minutes) -> NaiveDateTime {
    let step = step.max(MIN_STEP_MINUTES);
    let earliest = (now.hour() * 60 + now.minute()).saturating_add(buffer);
    let cutoff = (earliest / step).saturating_add(1).saturating_mul(step);
    now.date()
        .and_time(NaiveTime::MIN)
        .checked_add_signed(TimeDelta::minutes(i64::from(cutoff)))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Compute bookable start times for `date`, chronological and without duplicates.
///
/// A candidate `t` is accepted when `[t, t + duration)` ends by closing time and,
/// widened by the buffer on both sides, touches no booking or break. On today's
/// date nothing earlier than [`same_day_cutoff`] is offered.
pub fn generate_slots(
    date: NaiveDate,
    day: Option<&DayHours>,
    booked: &[BookedSlot],
    params: &SlotParams,
    now: NaiveDateTime,
) -> Result<Vec<TimeOfDay>, EngineError> {
    let Some(day) = day else {
        return Ok(Vec::new());
    };

    let started = std::time::Instant::now();
    let step = params.step_minutes();
    let window = day.window_on(date);

    let mut cursor = window.start;
    if date == now.date() {
        let cutoff = same_day_cutoff(now, params.buffer_minutes, step);
        if cutoff > cursor {
            cursor = cutoff;
        }
    }

    let blocked = build_blocked_intervals(date, day, booked);
    let duration = TimeDelta::minutes(i64::from(params.duration_minutes));
    let step = TimeDelta::minutes(i64::from(step));

    let mut slots = Vec::new();
    let mut iterations = 0usize;
    while cursor + duration <= window.end {
        iterations += 1;
        if iterations > params.max_iterations {
            warn!(
                %date,
                limit = params.max_iterations,
                step_minutes = step.num_minutes(),
                "slot generation hit iteration limit; inputs look malformed"
            );
            return Err(EngineError::IterationLimit {
                date,
                limit: params.max_iterations,
            });
        }

        let candidate = Span::new(cursor, cursor + duration);
        if first_collision(&blocked, &candidate, params.buffer_minutes).is_none() {
            slots.push(TimeOfDay::of(cursor));
        }
        cursor += step;
    }

    metrics::histogram!(crate::observability::SLOT_GENERATION_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    Ok(slots)
}
