//! System clock adapter.
//!
//! - **`target_os = "espidf"`**: monotonic time from `esp_timer_get_time()`,
//!   wall clock from `gettimeofday` (SNTP-synced when the IDF is configured
//!   for it).
//! - **other targets**: `std::time::Instant` and the host clock.
//!
//! Wall-clock time is rendered in the node's configured UTC offset.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::app::ports::ClockPort;

pub struct SystemClock {
    offset: FixedOffset,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SystemClock {
    /// `utc_offset_hours` outside -12..=14 is clamped.
    pub fn new(utc_offset_hours: i32) -> Self {
        let secs = utc_offset_hours.clamp(-12, 14) * 3600;
        Self {
            offset: FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix()),
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl ClockPort for SystemClock {
    #[cfg(target_os = "espidf")]
    fn now_ms(&self) -> u64 {
        // SAFETY: reads the monotonic high-resolution timer.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn wall_clock(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}
