use std::net::SocketAddr;

use crate::booking::AttemptState;

/// Counter: booking submissions by outcome. Labels: outcome.
pub const BOOKING_ATTEMPTS_TOTAL: &str = "bookslot_booking_attempts_total";

/// Counter: conflicts reported by the appointment store. Labels: kind.
pub const CONFLICTS_TOTAL: &str = "bookslot_conflicts_total";

/// Histogram: round trip to the appointment store in seconds. Labels: call.
pub const API_CALL_DURATION_SECONDS: &str = "bookslot_api_call_duration_seconds";

/// Counter: slot lists served from cache.
pub const SLOT_CACHE_HITS_TOTAL: &str = "bookslot_slot_cache_hits_total";

/// Counter: slot lists computed because the cache had nothing.
pub const SLOT_CACHE_MISSES_TOTAL: &str = "bookslot_slot_cache_misses_total";

/// Gauge: cached slot lists.
pub const SLOT_CACHE_ENTRIES: &str = "bookslot_slot_cache_entries";

/// Histogram: time spent generating one day's slots in seconds.
pub const SLOT_GENERATION_DURATION_SECONDS: &str = "bookslot_slot_generation_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for an attempt's state, for metrics and logs.
pub fn state_label(state: &AttemptState) -> &'static str {
    match state {
        AttemptState::Idle => "idle",
        AttemptState::Submitting { .. } => "submitting",
        AttemptState::Committed { .. } => "committed",
        AttemptState::AwaitingReselection { .. } => "awaiting_reselection",
        AttemptState::AwaitingDateChange { .. } => "awaiting_date_change",
        AttemptState::Failed { .. } => "failed",
    }
}
