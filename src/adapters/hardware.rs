//! GPIO capability handles for devices.
//!
//! Bridges pins to the [`InputSense`] / [`OutputDrive`] ports the device
//! controller consumes.  Two flavours:
//!
//! - [`GpioInput`] / [`GpioOutput`]: raw pin numbers driven through
//!   [`hw_init`], used by the firmware for config-defined pins.
//! - [`HalInput`] / [`HalOutput`]: any `embedded-hal` 1.0 digital pin, for
//!   boards that hand out typed pin drivers.

use embedded_hal::digital::{InputPin, OutputPin};
use log::warn;

use crate::app::ports::{InputSense, OutputDrive};
use crate::config::DeviceDescriptor;
use crate::drivers::hw_init;
use crate::error::ConfigError;

// ── Raw GPIO ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct GpioInput {
    pin: i32,
}

impl GpioInput {
    /// Configure `pin` as a pulled-down rising-edge input.
    pub fn new(pin: i32) -> Result<Self, hw_init::HwInitError> {
        hw_init::init_button_input(pin)?;
        Ok(Self { pin })
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }
}

impl InputSense for GpioInput {
    fn is_high(&mut self) -> bool {
        hw_init::gpio_read(self.pin)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GpioOutput {
    pin: i32,
}

impl GpioOutput {
    /// Configure `pin` as an output, driven LOW.
    pub fn new(pin: i32) -> Result<Self, hw_init::HwInitError> {
        hw_init::init_output(pin)?;
        Ok(Self { pin })
    }
}

impl OutputDrive for GpioOutput {
    fn drive(&mut self, on: bool) {
        hw_init::gpio_write(self.pin, on);
    }
}

/// Configure both pins of a validated descriptor.
pub fn bind_descriptor(
    descriptor: &DeviceDescriptor,
) -> Result<(Box<dyn InputSense>, Box<dyn OutputDrive>), ConfigError> {
    let input_pin = descriptor.button_pin as i32;
    let output_pin = descriptor.relay_pin as i32;
    let pin_error = |e: hw_init::HwInitError| {
        ConfigError::Malformed(format!("device '{}': {}", descriptor.label, e))
    };
    let input = GpioInput::new(input_pin).map_err(pin_error)?;
    let output = GpioOutput::new(output_pin).map_err(pin_error)?;
    Ok((Box::new(input), Box::new(output)))
}

/// Devices addressable by the edge ISR, whose argument is a `u8` slot.
pub const MAX_EDGE_DEVICES: usize = u8::MAX as usize + 1;

/// Binder for [`DeviceController::from_descriptors`] that also wires each
/// device's button interrupt through `attach`.
///
/// Slots follow successful binds, so the ISR argument always matches the
/// controller's index.  Devices past [`MAX_EDGE_DEVICES`] are refused.
///
/// [`DeviceController::from_descriptors`]: crate::app::controller::DeviceController::from_descriptors
pub fn edge_binder<A>(
    mut attach: A,
) -> impl FnMut(&DeviceDescriptor) -> Result<(Box<dyn InputSense>, Box<dyn OutputDrive>), ConfigError>
where
    A: FnMut(i32, u8) -> Result<(), hw_init::HwInitError>,
{
    let mut next_slot = 0usize;
    move |desc: &DeviceDescriptor| {
        let Ok(slot) = u8::try_from(next_slot) else {
            return Err(ConfigError::Malformed(format!(
                "only {MAX_EDGE_DEVICES} devices can be wired"
            )));
        };
        let handles = bind_descriptor(desc)?;
        if let Err(e) = attach(desc.button_pin as i32, slot) {
            warn!("Relay: '{}' button not wired: {}", desc.label, e);
        }
        next_slot += 1;
        Ok(handles)
    }
}

// ── embedded-hal pins ─────────────────────────────────────────

pub struct HalInput<P> {
    pin: P,
}

impl<P: InputPin> HalInput<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: InputPin + Send> InputSense for HalInput<P> {
    fn is_high(&mut self) -> bool {
        self.pin.is_high().unwrap_or_else(|e| {
            warn!("Relay: input read failed: {:?}", e);
            false
        })
    }
}

pub struct HalOutput<P> {
    pin: P,
}

impl<P: OutputPin> HalOutput<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: OutputPin + Send> OutputDrive for HalOutput<P> {
    fn drive(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!("Relay: output write failed: {:?}", e);
        }
    }
}
