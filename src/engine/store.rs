use dashmap::DashMap;

use crate::model::*;

/// Locally known booked slots per business day, owned by the coordinator.
/// A day that was never fetched is absent, which differs from a fetched empty day.
pub struct BookedSlotStore {
    days: DashMap<BusinessDay, Vec<BookedSlot>>,
}

impl Default for BookedSlotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookedSlotStore {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
        }
    }

    pub fn contains(&self, day: &BusinessDay) -> bool {
        self.days.contains_key(day)
    }

    /// Snapshot of a day's booked slots, sorted by start.
    pub fn get(&self, day: &BusinessDay) -> Option<Vec<BookedSlot>> {
        self.days.get(day).map(|e| e.value().clone())
    }

    /// Replace a day wholesale with what the appointment store reported.
    pub fn replace(&self, day: BusinessDay, mut slots: Vec<BookedSlot>) {
        slots.sort_by_key(|s| (s.start, s.duration_minutes));
        self.days.insert(day, slots);
    }

    /// Insert into an already-fetched day, maintaining sort order by start.
    /// Unknown days are left for the next fetch; returns whether the slot was recorded.
    pub fn insert(&self, day: &BusinessDay, slot: BookedSlot) -> bool {
        let Some(mut slots) = self.days.get_mut(day) else {
            return false;
        };
        let pos = slots
            .binary_search_by_key(&(slot.start, slot.duration_minutes), |s| {
                (s.start, s.duration_minutes)
            })
            .unwrap_or_else(|e| e);
        slots.insert(pos, slot);
        true
    }

    /// Remove one occurrence of `slot`. Returns whether anything was removed.
    pub fn remove(&self, day: &BusinessDay, slot: &BookedSlot) -> bool {
        let Some(mut slots) = self.days.get_mut(day) else {
            return false;
        };
        if let Some(pos) = slots.iter().position(|s| s == slot) {
            slots.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn forget(&self, day: &BusinessDay) {
        self.days.remove(day);
    }

    pub fn forget_business(&self, business: &BusinessId) {
        self.days.retain(|day, _| &day.business != business);
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }
}
