//! Task Watchdog Timer (TWDT).
//!
//! Subscribes the calling task and panics the chip if it is not fed
//! within the timeout.  Only the main thread subscribes; the network
//! thread blocks on sockets and backoff sleeps for far longer.

use std::time::Duration;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Watchdog {
    timeout: Duration,
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Watchdog {
    #[cfg(target_os = "espidf")]
    pub fn new(timeout: Duration) -> Self {
        let cfg = esp_task_wdt_config_t {
            timeout_ms: timeout.as_millis() as u32,
            idle_core_mask: 0,
            trigger_panic: true,
        };
        // SAFETY: FFI calls with a valid config; null handle = current task.
        let subscribed = unsafe {
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK {
                log::warn!("Watchdog: reconfigure returned {} (already configured?)", ret);
            }
            esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK
        };
        if subscribed {
            log::info!("Watchdog: subscribed ({:?} timeout, panic on trigger)", timeout);
        } else {
            log::warn!("Watchdog: failed to subscribe");
        }
        Self { timeout, subscribed }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(timeout: Duration) -> Self {
        log::info!("Watchdog(sim): no-op ({:?})", timeout);
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Feed interval that leaves margin under the timeout.
    pub fn feed_interval(&self) -> Duration {
        self.timeout / 4
    }

    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: resets the current task's TWDT entry.
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}
