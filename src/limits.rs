//! Hard limits and defaults. Runtime-tunable values are only defaults here;
//! see [`crate::config::Config`].

use crate::model::Minutes;

/// Default gap enforced between appointments and between "now" and the first same-day slot.
pub const DEFAULT_BUFFER_MINUTES: Minutes = 15;

/// Configured buffers are clamped to a full day.
pub const MAX_BUFFER_MINUTES: Minutes = 24 * 60;

/// How far ahead a client may book, in days from today (inclusive).
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 30;

/// Configured lookahead is clamped to a leap year.
pub const MAX_LOOKAHEAD_DAYS: u32 = 366;

/// Default bound on cached slot lists before the least recently used one is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Default timeout for a single call to the appointment store.
pub const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 10_000;

/// One candidate per minute over a full day.
pub const DEFAULT_MAX_SLOT_ITERATIONS: usize = 24 * 60;

/// Step used when the buffer is zero.
pub const MIN_STEP_MINUTES: Minutes = 1;

/// Longest service duration accepted by validation (a full day).
pub const MAX_DURATION_MINUTES: Minutes = 24 * 60;

pub const MAX_NOTES_LEN: usize = 2_000;
