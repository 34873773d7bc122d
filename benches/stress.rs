use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};

use bookslot::api::InMemoryAppointmentApi;
use bookslot::booking::{
    AttemptState, BookingAttempt, BookingCoordinator, BookingDraft, CoordinatorSettings,
};
use bookslot::clock::FixedClock;
use bookslot::engine::{generate_slots, SlotParams, WorkingHoursModel};
use bookslot::model::*;

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn sunday_noon() -> NaiveDateTime {
    monday().pred_opt().unwrap().and_hms_opt(12, 0, 0).unwrap()
}

fn t(s: &str) -> TimeOfDay {
    s.parse().unwrap()
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.1}us, p50={:.1}us, p95={:.1}us, p99={:.1}us, max={:.1}us",
        latencies.len(),
        avg.as_secs_f64() * 1e6,
        percentile(latencies, 50.0).as_secs_f64() * 1e6,
        percentile(latencies, 95.0).as_secs_f64() * 1e6,
        percentile(latencies, 99.0).as_secs_f64() * 1e6,
        latencies.last().unwrap().as_secs_f64() * 1e6,
    );
}

fn hours() -> WorkingHours {
    WorkingHours::new().with_day(
        DayKey::Mon,
        t("07:00"),
        t("22:00"),
        vec![Break {
            start: t("12:00"),
            end: t("13:00"),
        }],
    )
}

fn phase1_generation() {
    let model = WorkingHoursModel::new(&hours()).unwrap();
    let day = model.hours_for(monday());
    let booked: Vec<BookedSlot> = (0..20)
        .map(|i| BookedSlot::new(TimeOfDay::from_minutes(7 * 60 + i * 40).unwrap(), 25))
        .collect();
    let now = sunday_noon();

    for (label, buffer) in [("buffer 15, 20 bookings", 15), ("buffer 0, 20 bookings", 0)] {
        let params = SlotParams::new(30, buffer);
        let mut latencies = Vec::with_capacity(2_000);
        for _ in 0..2_000 {
            let start = Instant::now();
            let slots = generate_slots(monday(), day, &booked, &params, now).unwrap();
            latencies.push(start.elapsed());
            std::hint::black_box(slots);
        }
        print_latency(label, &mut latencies);
    }
}

async fn phase2_cached_lookups() {
    let api = Arc::new(InMemoryAppointmentApi::new());
    api.set_hours("b1".into(), hours());
    let clock = Arc::new(FixedClock::new(sunday_noon()));
    let coord = BookingCoordinator::new(api, clock, CoordinatorSettings::default());

    let mut cold = Vec::new();
    let mut warm = Vec::new();
    for duration in [15, 30, 45, 60, 90] {
        let start = Instant::now();
        coord.available_slots(&"b1".into(), monday(), duration).await.unwrap();
        cold.push(start.elapsed());
        for _ in 0..500 {
            let start = Instant::now();
            coord.available_slots(&"b1".into(), monday(), duration).await.unwrap();
            warm.push(start.elapsed());
        }
    }
    print_latency("first lookup", &mut cold);
    print_latency("cached lookup", &mut warm);
    let stats = coord.cache_stats();
    println!("  cache: hits={}, misses={}, entries={}", stats.hits, stats.misses, stats.entries);
}

async fn phase3_racing_clients() {
    let api = Arc::new(InMemoryAppointmentApi::new());
    api.set_hours("b1".into(), hours());
    let n_clients = 50;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_clients {
        let api = api.clone();
        handles.push(tokio::spawn(async move {
            let clock = Arc::new(FixedClock::new(sunday_noon()));
            let coord = BookingCoordinator::new(api, clock, CoordinatorSettings::default());
            let user = UserId::new(format!("u{i}"));
            let draft = BookingDraft::new("b1".into(), "s1".into(), user, 30)
                .on(monday())
                .at(t("09:00"));

            let mut attempt = BookingAttempt::new();
            let mut conflicts = 0;
            loop {
                if coord.submit(&mut attempt, &draft_for(&attempt, &draft)).await.is_err() {
                    return (false, conflicts);
                }
                match attempt.state() {
                    AttemptState::Committed { .. } => return (true, conflicts),
                    AttemptState::AwaitingReselection { .. } => conflicts += 1,
                    _ => return (false, conflicts),
                }
            }
        }));
    }

    let mut committed = 0;
    let mut conflicts = 0;
    for h in handles {
        let (ok, c) = h.await.unwrap();
        committed += usize::from(ok);
        conflicts += c;
    }
    let elapsed = start.elapsed();
    println!(
        "  {n_clients} clients racing for 09:00: {committed} committed, \
         {conflicts} conflicts recovered in {:.2}ms",
        elapsed.as_secs_f64() * 1000.0
    );
}

/// Retarget the draft at the first offered slot after a conflict.
fn draft_for(attempt: &BookingAttempt, draft: &BookingDraft) -> BookingDraft {
    match attempt.offered_slots().and_then(|s| s.first()) {
        Some(slot) => draft.clone().at(*slot),
        None => draft.clone(),
    }
}

#[tokio::main]
async fn main() {
    println!("=== bookslot stress benchmark ===\n");

    println!("[phase 1] slot generation");
    phase1_generation();

    println!("\n[phase 2] coordinator lookups");
    phase2_cached_lookups().await;

    println!("\n[phase 3] racing clients");
    phase3_racing_clients().await;

    println!("\n=== benchmark complete ===");
}
