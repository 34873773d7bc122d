use std::str::FromStr;
use std::time::Duration;

use crate::limits::*;
use crate::model::Minutes;

/// Runtime settings. Defaults come from [`crate::limits`]; `from_env` overrides
/// them from `BOOKSLOT_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub buffer_minutes: Minutes,
    pub lookahead_days: u32,
    pub cache_capacity: usize,
    pub submit_timeout: Duration,
    pub max_slot_iterations: usize,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".into(),
            api_token: None,
            buffer_minutes: DEFAULT_BUFFER_MINUTES,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            submit_timeout: Duration::from_millis(DEFAULT_SUBMIT_TIMEOUT_MS),
            max_slot_iterations: DEFAULT_MAX_SLOT_ITERATIONS,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparsable values fall back to defaults;
    /// buffer and lookahead are clamped to [`MAX_BUFFER_MINUTES`] and [`MAX_LOOKAHEAD_DAYS`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            api_url: lookup("BOOKSLOT_API_URL").unwrap_or(defaults.api_url),
            api_token: lookup("BOOKSLOT_API_TOKEN").filter(|s| !s.is_empty()),
            buffer_minutes: parse_var(&lookup, "BOOKSLOT_BUFFER_MINUTES")
                .map(|b: Minutes| b.min(MAX_BUFFER_MINUTES))
                .unwrap_or(defaults.buffer_minutes),
            lookahead_days: parse_var(&lookup, "BOOKSLOT_LOOKAHEAD_DAYS")
                .map(|d: u32| d.min(MAX_LOOKAHEAD_DAYS))
                .unwrap_or(defaults.lookahead_days),
            cache_capacity: parse_var(&lookup, "BOOKSLOT_CACHE_CAPACITY")
                .unwrap_or(defaults.cache_capacity),
            submit_timeout: parse_var(&lookup, "BOOKSLOT_SUBMIT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.submit_timeout),
            max_slot_iterations: parse_var(&lookup, "BOOKSLOT_MAX_SLOT_ITERATIONS")
                .unwrap_or(defaults.max_slot_iterations),
            metrics_port: parse_var(&lookup, "BOOKSLOT_METRICS_PORT"),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
