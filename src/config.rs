use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const BUFFER_SIZE_ENV: &str = "EVENT_TRACE_BUFFER_SIZE";
pub const MERGE_PERIOD_ENV: &str = "EVENT_TRACE_MERGE_PERIOD_MS";
pub const WAKEUP_WINDOW_ENV: &str = "EVENT_TRACE_WAKEUP_WINDOW_MS";
pub const DUMP_INDENT_ENV: &str = "EVENT_TRACE_DUMP_INDENT";

/// Tunables for wiring writers, readers and the merge thread together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Capacity of each ring, rounded up to a power of two by the ring.
    pub buffer_size: usize,
    /// How often the merge thread fires while it is active.
    pub merge_period: Duration,
    /// How long the merge thread stays active after a wakeup.
    pub wakeup_window: Duration,
    /// Spaces in front of every dumped line.
    pub dump_indent: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            buffer_size: 16 * 1024,
            merge_period: Duration::from_secs(1),
            wakeup_window: Duration::from_secs(3),
            dump_indent: 0,
        }
    }
}

impl TraceConfig {
    /// Defaults overridden by `EVENT_TRACE_*` environment variables.
    /// Values that do not parse keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`TraceConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            buffer_size: parse_or(&lookup, BUFFER_SIZE_ENV, defaults.buffer_size),
            merge_period: Duration::from_millis(parse_or(
                &lookup,
                MERGE_PERIOD_ENV,
                defaults.merge_period.as_millis() as u64,
            )),
            wakeup_window: Duration::from_millis(parse_or(
                &lookup,
                WAKEUP_WINDOW_ENV,
                defaults.wakeup_window.as_millis() as u64,
            )),
            dump_indent: parse_or(&lookup, DUMP_INDENT_ENV, defaults.dump_indent),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring {}={:?}, using {}", key, raw, default);
                default
            }
        },
    }
}
