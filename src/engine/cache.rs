use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDateTime;
use dashmap::DashMap;
use tracing::debug;

use crate::model::*;

use super::availability::SlotParams;

/// Stable CRC32 over the canonical (sorted) `HH:MM+duration` form of a booked set.
pub fn booked_signature(booked: &[BookedSlot]) -> u32 {
    let mut sorted: Vec<&BookedSlot> = booked.iter().collect();
    sorted.sort_by_key(|s| (s.start, s.duration_minutes));
    let mut hasher = crc32fast::Hasher::new();
    for slot in sorted {
        hasher.update(format!("{}+{};", slot.start, slot.duration_minutes).as_bytes());
    }
    hasher.finalize()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub day: BusinessDay,
    pub duration_minutes: Minutes,
    pub buffer_minutes: Minutes,
    pub signature: u32,
    /// Same-day cutoff the list was computed against; `None` for future dates.
    pub not_before: Option<NaiveDateTime>,
}

impl SlotKey {
    pub fn new(day: BusinessDay, params: &SlotParams, booked: &[BookedSlot]) -> Self {
        Self {
            day,
            duration_minutes: params.duration_minutes,
            buffer_minutes: params.buffer_minutes,
            signature: booked_signature(booked),
            not_before: None,
        }
    }

    pub fn not_before(mut self, cutoff: NaiveDateTime) -> Self {
        self.not_before = Some(cutoff);
        self
    }

    fn variant(&self) -> Variant {
        Variant {
            duration_minutes: self.duration_minutes,
            buffer_minutes: self.buffer_minutes,
            signature: self.signature,
            not_before: self.not_before,
        }
    }
}

/// Key suffix below the `(business, date)` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Variant {
    duration_minutes: Minutes,
    buffer_minutes: Minutes,
    signature: u32,
    not_before: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
struct Entry {
    slots: Vec<TimeOfDay>,
    last_used: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoized slot lists, indexed by business day so a booked-set change drops
/// every variant for that day at once. Bounded; least recently used goes first.
pub struct SlotCache {
    days: DashMap<BusinessDay, HashMap<Variant, Entry>>,
    capacity: usize,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SlotCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            days: DashMap::new(),
            capacity: capacity.max(1),
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, key: &SlotKey) -> Option<Vec<TimeOfDay>> {
        let tick = self.next_tick();
        let mut bucket = self.days.get_mut(&key.day)?;
        let entry = bucket.get_mut(&key.variant())?;
        entry.last_used = tick;
        Some(entry.slots.clone())
    }

    /// Serve from cache, or run `compute` and remember its result. Errors are not cached.
    pub fn get_or_compute<E>(
        &self,
        key: &SlotKey,
        compute: impl FnOnce() -> Result<Vec<TimeOfDay>, E>,
    ) -> Result<Vec<TimeOfDay>, E> {
        if let Some(slots) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(crate::observability::SLOT_CACHE_HITS_TOTAL).increment(1);
            return Ok(slots);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(crate::observability::SLOT_CACHE_MISSES_TOTAL).increment(1);

        let slots = compute()?;
        self.insert(key, slots.clone());
        Ok(slots)
    }

    pub fn insert(&self, key: &SlotKey, slots: Vec<TimeOfDay>) {
        let tick = self.next_tick();
        {
            let mut bucket = self.days.entry(key.day.clone()).or_default();
            // A different signature under the same day means the booked set moved on.
            bucket.retain(|v, _| v.signature == key.signature);
            bucket.insert(key.variant(), Entry { slots, last_used: tick });
        }
        self.evict_over_capacity();
        metrics::gauge!(crate::observability::SLOT_CACHE_ENTRIES).set(self.len() as f64);
    }

    /// Drop every entry for `(business, date)`. Returns how many were removed.
    pub fn invalidate(&self, day: &BusinessDay) -> usize {
        let removed = self.days.remove(day).map_or(0, |(_, bucket)| bucket.len());
        if removed > 0 {
            debug!(%day, removed, "slot cache invalidated");
        }
        metrics::gauge!(crate::observability::SLOT_CACHE_ENTRIES).set(self.len() as f64);
        removed
    }

    /// Drop every entry for a business, across all dates.
    pub fn invalidate_business(&self, business: &BusinessId) -> usize {
        let days: Vec<BusinessDay> = self
            .days
            .iter()
            .filter(|e| &e.key().business == business)
            .map(|e| e.key().clone())
            .collect();
        days.iter().map(|d| self.invalidate(d)).sum()
    }

    pub fn len(&self) -> usize {
        self.days.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn evict_over_capacity(&self) {
        while self.len() > self.capacity {
            // Collect first: never hold a shard reference while mutating.
            let oldest = self
                .days
                .iter()
                .flat_map(|e| {
                    let day = e.key().clone();
                    e.value()
                        .iter()
                        .map(|(v, entry)| (entry.last_used, day.clone(), *v))
                        .collect::<Vec<_>>()
                })
                .min_by_key(|(last_used, _, _)| *last_used);
            let Some((_, day, variant)) = oldest else {
                return;
            };
            if let Some(mut bucket) = self.days.get_mut(&day) {
                bucket.remove(&variant);
            }
            self.days.remove_if(&day, |_, bucket| bucket.is_empty());
            debug!(%day, "slot cache evicted least recently used entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::Cell;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn day(business: &str, d: u32) -> BusinessDay {
        BusinessDay::new(business.into(), NaiveDate::from_ymd_opt(2026, 10, d).unwrap())
    }

    fn key(day: BusinessDay, duration: Minutes, booked: &[BookedSlot]) -> SlotKey {
        SlotKey::new(day, &SlotParams::new(duration, 15), booked)
    }

    #[test]
    fn signature_ignores_order() {
        let a = [BookedSlot::new(t("10:00"), 60), BookedSlot::new(t("14:00"), 30)];
        let b = [a[1], a[0]];
        assert_eq!(booked_signature(&a), booked_signature(&b));
        assert_ne!(booked_signature(&a), booked_signature(&a[..1]));
        assert_ne!(
            booked_signature(&[BookedSlot::new(t("10:00"), 60)]),
            booked_signature(&[BookedSlot::new(t("10:00"), 45)])
        );
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let cache = SlotCache::new(16);
        let k = key(day("b1", 19), 60, &[]);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(vec![t("09:00"), t("09:15")])
        };
        let first = cache.get_or_compute(&k, compute).unwrap();
        let second = cache
            .get_or_compute(&k, || {
                calls.set(calls.get() + 1);
                Ok::<_, ()>(vec![])
            })
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = SlotCache::new(16);
        let k = key(day("b1", 19), 60, &[]);
        assert!(cache.get_or_compute(&k, || Err::<Vec<TimeOfDay>, _>("boom")).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_drops_whole_prefix() {
        let cache = SlotCache::new(16);
        let d = day("b1", 19);
        cache.insert(&key(d.clone(), 30, &[]), vec![t("09:00")]);
        cache.insert(&key(d.clone(), 60, &[]), vec![t("09:00")]);
        cache.insert(&key(day("b1", 20), 60, &[]), vec![t("09:00")]);
        cache.insert(&key(day("b2", 19), 60, &[]), vec![t("09:00")]);

        assert_eq!(cache.invalidate(&d), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(d, 30, &[])).is_none());
        assert!(cache.get(&key(day("b2", 19), 60, &[])).is_some());
    }

    #[test]
    fn new_signature_replaces_stale_entries() {
        let cache = SlotCache::new(16);
        let d = day("b1", 19);
        cache.insert(&key(d.clone(), 60, &[]), vec![t("09:00")]);
        let booked = [BookedSlot::new(t("10:00"), 60)];
        cache.insert(&key(d.clone(), 60, &booked), vec![t("11:15")]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(d, 60, &[])).is_none());
    }

    #[test]
    fn cutoff_is_part_of_the_key() {
        let cache = SlotCache::new(16);
        let d = day("b1", 19);
        let noon = t("12:00").on(d.date);
        cache.insert(&key(d.clone(), 60, &[]).not_before(noon), vec![t("12:15")]);
        assert!(cache.get(&key(d.clone(), 60, &[])).is_none());
        assert!(cache.get(&key(d.clone(), 60, &[]).not_before(t("12:15").on(d.date))).is_none());
        assert_eq!(cache.get(&key(d, 60, &[]).not_before(noon)), Some(vec![t("12:15")]));
    }

    #[test]
    fn invalidate_business_spans_dates() {
        let cache = SlotCache::new(16);
        cache.insert(&key(day("b1", 19), 60, &[]), vec![]);
        cache.insert(&key(day("b1", 20), 60, &[]), vec![]);
        cache.insert(&key(day("b2", 20), 60, &[]), vec![]);
        assert_eq!(cache.invalidate_business(&"b1".into()), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = SlotCache::new(2);
        let a = key(day("b1", 19), 60, &[]);
        let b = key(day("b1", 20), 60, &[]);
        let c = key(day("b1", 21), 60, &[]);
        cache.insert(&a, vec![t("09:00")]);
        cache.insert(&b, vec![t("09:00")]);
        // Touch `a` so `b` becomes the oldest.
        assert!(cache.get(&a).is_some());
        cache.insert(&c, vec![t("09:00")]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
    }
}
