//! Single-colour status LED as the node's health indicator.
//!
//! | Signal         | LED                                   |
//! |----------------|---------------------------------------|
//! | `Steady`       | on                                    |
//! | `Off`          | off                                   |
//! | `Blink{times}` | `times` on/off pulses, then left off  |
//!
//! Blinks block the calling thread for `times × 2 × half_period`.  Only
//! the network thread signals health, so the edge path never waits on it.

use std::sync::Mutex;
use std::time::Duration;

use log::debug;

use crate::app::ports::{HealthIndicator, HealthSignal};
use crate::drivers::hw_init;

/// Default half period of one blink pulse.
pub const BLINK_HALF_PERIOD: Duration = Duration::from_millis(200);

pub struct StatusLed {
    pin: i32,
    half_period: Duration,
    /// Serialises blink sequences from concurrent callers.
    last: Mutex<Option<HealthSignal>>,
}

impl StatusLed {
    /// Configure `pin` as an output (LED off).
    pub fn new(pin: i32) -> Result<Self, hw_init::HwInitError> {
        hw_init::init_output(pin)?;
        Ok(Self::with_half_period(pin, BLINK_HALF_PERIOD))
    }

    /// Wrap an already-configured pin.
    pub fn with_half_period(pin: i32, half_period: Duration) -> Self {
        Self {
            pin,
            half_period,
            last: Mutex::new(None),
        }
    }

    pub fn is_lit(&self) -> bool {
        hw_init::gpio_read(self.pin)
    }

    pub fn last_signal(&self) -> Option<HealthSignal> {
        self.last.lock().map_or(None, |g| *g)
    }
}

impl HealthIndicator for StatusLed {
    fn signal(&self, signal: HealthSignal) {
        let mut last = match self.last.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *last != Some(signal) {
            debug!("Health: {:?}", signal);
        }
        match signal {
            HealthSignal::Steady => hw_init::gpio_write(self.pin, true),
            HealthSignal::Off => hw_init::gpio_write(self.pin, false),
            HealthSignal::Blink { times } => {
                for _ in 0..times {
                    hw_init::gpio_write(self.pin, true);
                    std::thread::sleep(self.half_period);
                    hw_init::gpio_write(self.pin, false);
                    std::thread::sleep(self.half_period);
                }
            }
        }
        *last = Some(signal);
    }
}
