//! Core-pinned thread spawning for the ESP32-S3.
//!
//! ESP-IDF's `std::thread` is built on pthreads over FreeRTOS tasks.
//! `esp_pthread_set_cfg()` sets thread-local options for the *next*
//! `pthread_create()` from the calling thread, so the config → spawn pair
//! must not be interleaved with other spawns on the same thread.
//!
//! The node runs two long-lived threads besides `main`:
//!
//! | Thread      | Core | Job                                       |
//! |-------------|------|-------------------------------------------|
//! | `edge`      | App  | drain ISR edges into the device controller |
//! | `net`       | Pro  | link → discovery → session pipeline       |

use std::io;
use std::thread::JoinHandle;

/// CPU core identifiers for the dual-core Xtensa LX7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0, shared with the WiFi and lwIP tasks.
    Pro = 0,
    /// Core 1.
    App = 1,
}

/// Thread placement and sizing.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
    /// NUL-terminated, e.g. `"net\0"`.
    pub name: &'static str,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

#[cfg(target_os = "espidf")]
pub fn spawn_on_core(task: TaskSpec, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
    // SAFETY: plain FFI calls; `name` is 'static and NUL-terminated.
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = task.core as i32;
        cfg.prio = i32::from(task.priority);
        cfg.stack_size = (task.stack_kb * 1024) as i32;
        cfg.thread_name = task.name.as_ptr().cast();
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK {
            return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
        }
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        task.display_name(),
        task.core,
        task.priority,
        task.stack_kb
    );

    std::thread::Builder::new()
        .name(task.display_name().into())
        .stack_size(task.stack_kb * 1024)
        .spawn(f)
}

/// Simulation: no affinity or priority, stack size only.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(task: TaskSpec, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, stack={}KB)",
        task.display_name(),
        task.stack_kb
    );

    std::thread::Builder::new()
        .name(task.display_name().into())
        .stack_size(task.stack_kb * 1024)
        .spawn(f)
}
