//! Time source seam for message stamps, so engine tests can pin time.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of publish-cycle timestamps.
pub trait Clock {
    /// Microseconds since the Unix epoch.
    fn now_us(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}
