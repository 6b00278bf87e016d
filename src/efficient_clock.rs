//! Monotonic clock readings for event timestamps.
//!
//! Timestamps are what the merger orders entries by, so every writer that
//! feeds one merged log must read the same clock. On unix that is
//! `CLOCK_MONOTONIC`, which is shared by all processes on the host. Other
//! platforms fall back to a process-local monotonic base, which is only
//! good enough for single-process use.

use std::fmt;

/// Size of an encoded timestamp: `i64` seconds then `i64` nanoseconds.
pub const TIMESTAMP_SIZE: usize = 16;

/// Older writers packed nanoseconds into an `i32`.
pub const COMPACT_TIMESTAMP_SIZE: usize = 12;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

/// A point on the monotonic clock.
///
/// Ordering is by seconds, then nanoseconds.
///
/// # Examples
///
/// ```
/// # use event_trace::efficient_clock::Timestamp;
/// let ts = Timestamp::new(3, 250_000_000);
/// assert_eq!(ts.to_string(), "[3.250]");
/// assert_eq!(Timestamp::decode(&ts.encode()), Some(ts));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: i64,
}

impl Timestamp {
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// Reads the monotonic clock.
    pub fn now() -> Self {
        monotonic_now()
    }

    pub fn millis(&self) -> i64 {
        self.nsec / NANOS_PER_MILLI
    }

    pub fn encode(&self) -> [u8; TIMESTAMP_SIZE] {
        let mut out = [0u8; TIMESTAMP_SIZE];
        out[..8].copy_from_slice(&self.sec.to_le_bytes());
        out[8..].copy_from_slice(&self.nsec.to_le_bytes());
        out
    }

    /// Decodes a timestamp payload. Accepts the 16-byte layout and the
    /// 12-byte compact one; anything else is `None`.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let sec = i64::from_le_bytes(payload.get(..8)?.try_into().ok()?);
        let nsec = match payload.len() {
            TIMESTAMP_SIZE => i64::from_le_bytes(payload[8..16].try_into().ok()?),
            COMPACT_TIMESTAMP_SIZE => i32::from_le_bytes(payload[8..12].try_into().ok()?) as i64,
            _ => return None,
        };
        Some(Self { sec, nsec })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}.{:03}]", self.sec, self.millis())
    }
}

/// Returns the current reading of the host monotonic clock.
#[cfg(unix)]
pub fn monotonic_now() -> Timestamp {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return fallback_now();
    }
    Timestamp::new(ts.tv_sec as i64, ts.tv_nsec as i64)
}

#[cfg(not(unix))]
pub fn monotonic_now() -> Timestamp {
    fallback_now()
}

fn fallback_now() -> Timestamp {
    use std::time::Instant;

    lazy_static::lazy_static! {
        static ref BASE: Instant = Instant::now();
    }
    let elapsed = BASE.elapsed();
    let nanos = elapsed.as_nanos() as i64;
    Timestamp::new(nanos / NANOS_PER_SEC, nanos % NANOS_PER_SEC)
}
