//! GPIO assignments and limits for the relay node board.
//!
//! Relay and button pins come from the device descriptors in the node
//! configuration; only the fixed on-board peripherals live here.

// ---------------------------------------------------------------------------
// Status LED (single-colour, active HIGH)
// ---------------------------------------------------------------------------

pub const STATUS_LED_GPIO: i32 = 48;

// ---------------------------------------------------------------------------
// Descriptor pin range
// ---------------------------------------------------------------------------

/// Lowest GPIO a descriptor may name.
pub const GPIO_MIN: i64 = 0;
/// Highest GPIO a descriptor may name (ESP32-S3 exposes GPIO0..=GPIO48).
pub const GPIO_MAX: i64 = 48;

/// Pins that descriptors may not claim: strapping pins, USB D-/D+, and
/// the status LED.
pub const RESERVED_GPIOS: [i64; 6] = [0, 3, 19, 20, 45, STATUS_LED_GPIO as i64];

/// Whether `pin` may be used for a relay output or button input.
pub fn is_usable_gpio(pin: i64) -> bool {
    (GPIO_MIN..=GPIO_MAX).contains(&pin) && !RESERVED_GPIOS.contains(&pin)
}
