//! Frame clock for presentation timing.
//!
//! Tracks the last presentation time and refresh interval of a monitor. The pointer
//! core uses it to decide whether skipped cursor frames on a VRR monitor have left
//! the screen stale for longer than the configured minimum refresh rate allows.

use std::num::NonZeroU64;
use std::time::Duration;

use tracing::error;

#[derive(Debug, Clone)]
pub struct FrameClock {
    last_presentation_time: Option<Duration>,
    refresh_interval_ns: Option<NonZeroU64>,
}

impl FrameClock {
    pub fn new(refresh_interval: Option<Duration>) -> Self {
        let refresh_interval_ns = refresh_interval
            .and_then(|interval| NonZeroU64::new(interval.as_nanos().min(u64::MAX as u128) as u64));

        Self {
            last_presentation_time: None,
            refresh_interval_ns,
        }
    }

    /// Clock for a mode refreshing at `refresh_mhz` millihertz.
    pub fn from_refresh_mhz(refresh_mhz: i32) -> Self {
        let interval = (refresh_mhz > 0)
            .then(|| Duration::from_nanos(1_000_000_000_000 / refresh_mhz as u64));
        Self::new(interval)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ns
            .map(|r| Duration::from_nanos(r.get()))
    }

    /// Record that a frame was presented at the given time.
    pub fn presented(&mut self, presentation_time: Duration) {
        if presentation_time.is_zero() {
            return;
        }
        if let Some(last) = self.last_presentation_time {
            if presentation_time < last {
                error!(
                    ?last,
                    ?presentation_time,
                    "presentation time went backwards, ignoring"
                );
                return;
            }
        }
        self.last_presentation_time = Some(presentation_time);
    }

    pub fn last_presentation_time(&self) -> Option<Duration> {
        self.last_presentation_time
    }

    /// Time elapsed since the last presented frame, `None` before the first one.
    pub fn since_last_presentation(&self, now: Duration) -> Option<Duration> {
        self.last_presentation_time
            .map(|last| now.saturating_sub(last))
    }
}
