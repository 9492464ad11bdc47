//! GPIO/ISR initialisation, the edge channel, and on-chip peripherals.

pub mod edge;
pub mod hw_init;
pub mod status_led;
pub mod task_pin;
pub mod watchdog;
