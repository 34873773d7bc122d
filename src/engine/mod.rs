mod availability;
mod blocked;
mod cache;
mod conflict;
mod error;
mod hours;
mod store;

pub use availability::{generate_slots, same_day_cutoff, SlotParams};
pub use blocked::build_blocked_intervals;
pub use cache::{booked_signature, CacheStats, SlotCache, SlotKey};
pub use conflict::{collides, first_collision};
pub use error::EngineError;
pub use hours::{DayHours, WorkingHoursModel};
pub use store::BookedSlotStore;
