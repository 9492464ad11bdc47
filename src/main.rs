//! RelayNode Firmware: Main Entry Point
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  GPIO ISR ──▶ edge channel ──▶ [edge thread, core 1]             │
//! │                                   DeviceController::on_edge      │
//! │                                          │ push                  │
//! │                                          ▼                       │
//! │                                   Outbound Queue                 │
//! │                                          │ pop                   │
//! │  [net thread, core 0]                    ▼                       │
//! │    Orchestrator: Link ─▶ Discovery ─▶ Session (tx ∥ rx)          │
//! │                                          │ commands              │
//! │                                          ▼                       │
//! │                                   DeviceController::apply        │
//! │                                                                  │
//! │  [main] watchdog feed                                            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use relaynode::adapters::hardware::edge_binder;
use relaynode::adapters::time::SystemClock;
use relaynode::adapters::udp::UdpBinder;
use relaynode::adapters::wifi::WifiLink;
use relaynode::adapters::device_id;
use relaynode::app::controller::DeviceController;
use relaynode::config::NodeConfig;
use relaynode::drivers::edge;
use relaynode::drivers::hw_init;
use relaynode::drivers::status_led::StatusLed;
use relaynode::drivers::task_pin::{Core, TaskSpec, spawn_on_core};
use relaynode::drivers::watchdog::Watchdog;
use relaynode::error::ConfigError;
use relaynode::net::discovery::{Discovery, DiscoverySettings};
use relaynode::net::link::LinkManager;
use relaynode::net::orchestrator::Orchestrator;
use relaynode::net::session::SessionProtocol;
use relaynode::pins;

const NODE_CONFIG: &str = include_str!("../node.json");

const EDGE_TASK: TaskSpec = TaskSpec {
    core: Core::App,
    priority: 10,
    stack_kb: 4,
    name: "edge\0",
};

const NET_TASK: TaskSpec = TaskSpec {
    core: Core::Pro,
    priority: 5,
    stack_kb: 16,
    name: "net\0",
};

/// Ports fail fast; an unreadable document degrades to defaults.
/// Field-level problems are already handled inside `from_json`.
fn load_config() -> Result<NodeConfig> {
    match NodeConfig::from_json(NODE_CONFIG) {
        Ok(cfg) => {
            info!(
                "Config: node '{}', {} device(s), udp={} tcp={}",
                cfg.network.node_id,
                cfg.devices.len(),
                cfg.network.discovery_port,
                cfg.network.session_port
            );
            Ok(cfg)
        }
        Err(e @ ConfigError::InvalidPort { .. }) => Err(e.into()),
        Err(e) => {
            warn!("Config: {}; using defaults", e);
            Ok(NodeConfig::default())
        }
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RelayNode v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = load_config()?;
    let mac = device_id::read_mac();
    let mac_str = device_id::mac_string(&mac);
    info!("Device: MAC {}", mac_str);

    // ── 2. Hardware ───────────────────────────────────────────
    let health = Arc::new(StatusLed::new(pins::STATUS_LED_GPIO)?);
    if let Err(e) = hw_init::install_isr_service() {
        error!("{}; buttons disabled, remote control only", e);
    }
    let watchdog = Watchdog::default();

    let controller = DeviceController::from_descriptors(
        &config.devices,
        Duration::from_millis(config.timing.debounce_ms),
        edge_binder(hw_init::attach_edge_isr),
    );
    controller.setup();

    // ── 3. Radio ──────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()
        .inspect_err(|e| warn!("NVS unavailable ({}), WiFi calibration not cached", e))
        .ok();
    let wifi = WifiLink::new(peripherals.modem, sysloop, nvs)?;

    // ── 4. Threads ────────────────────────────────────────────
    let edge_controller = controller.clone();
    spawn_on_core(EDGE_TASK, move || edge::run_dispatcher(&edge_controller))?;

    let clock = Arc::new(SystemClock::new(config.network.utc_offset_hours));
    let link = LinkManager::new(
        wifi,
        Arc::clone(&health),
        Arc::clone(&clock),
        (&config.network).into(),
        (&config.timing).into(),
    );
    let discovery = Discovery::new(
        UdpBinder,
        Arc::clone(&health),
        Arc::clone(&clock),
        DiscoverySettings::new(&config.network, &config.timing),
        config.network.node_id.clone(),
        mac_str.as_str(),
    );
    let session = SessionProtocol::new(
        controller,
        Arc::clone(&health),
        (&config.timing).into(),
        config.network.node_id.clone(),
    );
    let timing = config.timing.clone();
    spawn_on_core(NET_TASK, move || {
        Orchestrator::new(link, discovery, session, clock, &timing).run_forever()
    })?;

    info!("System ready.");

    // ── 5. Supervise ──────────────────────────────────────────
    loop {
        watchdog.feed();
        std::thread::sleep(watchdog.feed_interval());
    }
}
