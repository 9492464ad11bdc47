//! One-shot GPIO initialisation and raw level access.
//!
//! Relay outputs, button inputs and the status LED are configured with
//! raw ESP-IDF sys calls.  Button inputs get a pull-down and a rising-edge
//! interrupt whose handler argument is the device index, so the ISR can
//! post `{device, timestamp}` without looking anything up.
//!
//! On host targets the GPIO levels live in an in-memory table that tests
//! can drive with [`sim_set_level`].

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

// ── Error type ────────────────────────────────────────────────

/// Errors during GPIO configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed { pin: i32, rc: i32 },
    IsrInstallFailed(i32),
    IsrAttachFailed { pin: i32, rc: i32 },
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed { pin, rc } => {
                write!(f, "GPIO{} config failed (rc={})", pin, rc)
            }
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrAttachFailed { pin, rc } => {
                write!(f, "GPIO{} ISR attach failed (rc={})", pin, rc)
            }
        }
    }
}

impl std::error::Error for HwInitError {}

// ── Outputs ───────────────────────────────────────────────────

/// Configure `pin` as a push-pull output, driven LOW.
#[cfg(target_os = "espidf")]
pub fn init_output(pin: i32) -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: called from the single-threaded boot path before any task
    // touches this pin.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::GpioConfigFailed { pin, rc: ret });
    }
    gpio_write(pin, false);
    info!("hw_init: GPIO{} output", pin);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_output(pin: i32) -> Result<(), HwInitError> {
    gpio_write(pin, false);
    Ok(())
}

// ── Inputs ────────────────────────────────────────────────────

/// Configure `pin` as a pulled-down input with a rising-edge interrupt
/// (left disabled until [`attach_edge_isr`]).
#[cfg(target_os = "espidf")]
pub fn init_button_input(pin: i32) -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
    };
    // SAFETY: boot path, see init_output().
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::GpioConfigFailed { pin, rc: ret });
    }
    info!("hw_init: GPIO{} button input (pull-down, rising edge)", pin);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_button_input(_pin: i32) -> Result<(), HwInitError> {
    Ok(())
}

// ── Level access ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: register read on a configured pin; ISR-safe.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: register write on a configured output pin.
    unsafe {
        gpio_set_level(pin, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicBool, Ordering};

    use crate::pins::GPIO_MAX;

    const PINS: usize = GPIO_MAX as usize + 1;

    static LEVELS: [AtomicBool; PINS] = [const { AtomicBool::new(false) }; PINS];

    pub fn read(pin: i32) -> bool {
        usize::try_from(pin)
            .ok()
            .and_then(|p| LEVELS.get(p))
            .is_some_and(|l| l.load(Ordering::SeqCst))
    }

    pub fn write(pin: i32, high: bool) {
        if let Some(level) = usize::try_from(pin).ok().and_then(|p| LEVELS.get(p)) {
            level.store(high, Ordering::SeqCst);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(pin: i32) -> bool {
    sim::read(pin)
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(pin: i32, high: bool) {
    sim::write(pin, high);
}

/// Simulation: force an input level.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_level(pin: i32, high: bool) {
    sim::write(pin, high);
}

// ── GPIO ISR service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: esp_timer_get_time is a counter read; safe in ISR context.
    let now_ms = (unsafe { esp_timer_get_time() } / 1_000) as u64;
    crate::drivers::edge::edge_isr_handler(arg as usize as u8, now_ms);
}

/// Install the per-pin GPIO ISR service.  Idempotent.
#[cfg(target_os = "espidf")]
pub fn install_isr_service() -> Result<(), HwInitError> {
    // SAFETY: ESP_ERR_INVALID_STATE means it was already installed.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
        return Err(HwInitError::IsrInstallFailed(ret));
    }
    info!("hw_init: GPIO ISR service installed");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn install_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}

/// Route rising edges on `pin` to the edge channel as `device`.
#[cfg(target_os = "espidf")]
pub fn attach_edge_isr(pin: i32, device: u8) -> Result<(), HwInitError> {
    // SAFETY: the handler only posts into the fixed-capacity edge channel;
    // the argument is a plain integer smuggled through the pointer.
    unsafe {
        let ret = gpio_isr_handler_add(
            pin,
            Some(button_gpio_isr),
            device as usize as *mut core::ffi::c_void,
        );
        if ret != ESP_OK {
            return Err(HwInitError::IsrAttachFailed { pin, rc: ret });
        }
        gpio_intr_enable(pin);
    }
    info!("hw_init: GPIO{} → device #{}", pin, device);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn attach_edge_isr(_pin: i32, _device: u8) -> Result<(), HwInitError> {
    Ok(())
}
