//! WiFi station-mode link driver.
//!
//! Implements [`LinkDriver`], the low-level association primitives behind
//! [`LinkManager`](crate::net::link::LinkManager).  Retry policy, health
//! signalling and timeouts live there; this adapter only starts the radio,
//! scans, joins and reports status.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi` in
//!   non-blocking mode, country code set through the raw sys API.
//! - **all other targets**: a scriptable simulated access-point list for
//!   host-side tests.

use std::net::Ipv4Addr;

use log::info;
#[cfg(not(target_os = "espidf"))]
use log::warn;

use crate::app::ports::{LinkDriver, LinkStatus};
use crate::error::LinkError;

/// 802.11 reason code: no AP with the configured SSID.
pub const REASON_NO_AP_FOUND: i32 = 201;
/// 802.11 reason code: 4-way handshake timed out (usually a bad password).
pub const REASON_HANDSHAKE_TIMEOUT: i32 = 15;
/// 802.11 reason code: we left on purpose.  Never a join failure.
pub const REASON_ASSOC_LEAVE: i32 = 8;

/// Status of a station given its association, whether a join is in
/// flight, and the disconnect reason reported since that join began.
fn join_status(up: bool, joining: bool, disconnect: Option<i32>) -> LinkStatus {
    match (up, joining, disconnect) {
        (true, _, _) => LinkStatus::Up,
        (false, true, Some(reason)) => LinkStatus::Failed(reason),
        (false, true, None) => LinkStatus::Connecting,
        (false, false, _) => LinkStatus::Idle,
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF driver
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use core::ffi::c_void;
    use core::ptr;
    use core::sync::atomic::{AtomicI32, Ordering};

    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys::{
        ESP_OK, EspError, WIFI_EVENT, esp, esp_event_base_t, esp_event_handler_register,
        esp_wifi_set_country_code, wifi_event_sta_disconnected_t,
        wifi_event_t_WIFI_EVENT_STA_DISCONNECTED,
    };
    use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
    use log::warn;

    use super::*;

    /// Last STA disconnect reason since the current join began; 0 = none.
    static LAST_DISCONNECT_REASON: AtomicI32 = AtomicI32::new(0);

    /// Runs on the system event loop task.
    unsafe extern "C" fn on_sta_disconnected(
        _arg: *mut c_void,
        _base: esp_event_base_t,
        _id: i32,
        data: *mut c_void,
    ) {
        if data.is_null() {
            return;
        }
        // SAFETY: ESP-IDF passes a wifi_event_sta_disconnected_t for this event id.
        let event = unsafe { &*data.cast::<wifi_event_sta_disconnected_t>() };
        let reason = i32::from(event.reason);
        if reason != REASON_ASSOC_LEAVE {
            LAST_DISCONNECT_REASON.store(reason, Ordering::Release);
        }
    }

    fn take_disconnect_reason() -> Option<i32> {
        let reason = LAST_DISCONNECT_REASON.swap(0, Ordering::AcqRel);
        (reason != 0).then_some(reason)
    }

    pub struct WifiLink {
        wifi: EspWifi<'static>,
        joining: bool,
    }

    impl WifiLink {
        pub fn new(
            modem: Modem,
            sysloop: EspSystemEventLoop,
            nvs: Option<EspDefaultNvsPartition>,
        ) -> Result<Self, EspError> {
            let wifi = EspWifi::new(modem, sysloop, nvs)?;
            // SAFETY: the handler is a 'static fn that only touches an atomic.
            esp!(unsafe {
                esp_event_handler_register(
                    WIFI_EVENT,
                    wifi_event_t_WIFI_EVENT_STA_DISCONNECTED as i32,
                    Some(on_sta_disconnected),
                    ptr::null_mut(),
                )
            })?;
            Ok(Self {
                wifi,
                joining: false,
            })
        }

        fn ensure_started(&mut self) -> Result<(), EspError> {
            if !self.wifi.is_started()? {
                self.wifi
                    .set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
                self.wifi.start()?;
                info!("WiFi: radio started (STA)");
            }
            Ok(())
        }

        fn apply_country(country: &str) {
            let mut cc = [0u8; 3];
            for (dst, src) in cc.iter_mut().zip(country.bytes().take(2)) {
                *dst = src;
            }
            // SAFETY: `cc` is a NUL-terminated two-letter code that outlives the call.
            let ret = unsafe { esp_wifi_set_country_code(cc.as_ptr().cast(), true) };
            if ret != ESP_OK {
                warn!("WiFi: country code '{}' rejected ({})", country, ret);
            }
        }
    }

    impl LinkDriver for WifiLink {
        fn scan(&mut self) -> Result<Vec<String>, LinkError> {
            self.ensure_started().map_err(|_| LinkError::Lost)?;
            let aps = self.wifi.scan().map_err(|_| LinkError::Lost)?;
            Ok(aps.into_iter().map(|ap| ap.ssid.as_str().to_owned()).collect())
        }

        fn begin_join(&mut self, ssid: &str, password: &str, country: &str) -> Result<(), LinkError> {
            let auth_method = if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            };
            let client = ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| LinkError::NoCredentials)?,
                password: password.try_into().map_err(|_| LinkError::NoCredentials)?,
                auth_method,
                ..Default::default()
            };
            let status = |e: EspError| LinkError::AssociationFailed { status: e.code() };

            self.ensure_started().map_err(status)?;
            Self::apply_country(country);
            self.wifi
                .set_configuration(&Configuration::Client(client))
                .map_err(status)?;
            LAST_DISCONNECT_REASON.store(0, Ordering::Release);
            self.wifi.connect().map_err(status)?;
            self.joining = true;
            info!("WiFi: joining '{}' ({})", ssid, country);
            Ok(())
        }

        fn status(&mut self) -> LinkStatus {
            let up = matches!(self.wifi.is_up(), Ok(true));
            let reason = if self.joining && !up {
                take_disconnect_reason()
            } else {
                None
            };
            let status = join_status(up, self.joining, reason);
            if let LinkStatus::Failed(code) = status {
                warn!("WiFi: join failed, reason {}", code);
                self.joining = false;
            }
            status
        }

        fn local_ip(&self) -> Option<Ipv4Addr> {
            let info = self.wifi.sta_netif().get_ip_info().ok()?;
            let ip = Ipv4Addr::from(info.ip.octets());
            (!ip.is_unspecified()).then_some(ip)
        }

        fn disconnect(&mut self) {
            self.joining = false;
            if let Err(e) = self.wifi.disconnect() {
                warn!("WiFi: disconnect failed: {}", e);
            }
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::WifiLink;

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// Simulated station: a fixed set of visible networks, one of which
/// accepts a password.  A join reaches `Up` after `polls_to_up` status
/// polls.
#[cfg(not(target_os = "espidf"))]
pub struct WifiLink {
    visible: Vec<String>,
    password: String,
    address: Ipv4Addr,
    polls_to_up: u32,
    pending: Option<Result<u32, i32>>,
    up: bool,
    joins: u32,
}

#[cfg(not(target_os = "espidf"))]
impl WifiLink {
    pub fn simulated(visible: &[&str], password: &str, address: Ipv4Addr) -> Self {
        Self {
            visible: visible.iter().map(|s| (*s).to_owned()).collect(),
            password: password.to_owned(),
            address,
            polls_to_up: 1,
            pending: None,
            up: false,
            joins: 0,
        }
    }

    pub fn with_polls_to_up(mut self, polls: u32) -> Self {
        self.polls_to_up = polls;
        self
    }

    /// Simulate the AP going away.
    pub fn drop_link(&mut self) {
        warn!("WiFi(sim): link dropped");
        self.up = false;
        self.pending = None;
    }

    pub fn joins(&self) -> u32 {
        self.joins
    }
}

#[cfg(not(target_os = "espidf"))]
impl LinkDriver for WifiLink {
    fn scan(&mut self) -> Result<Vec<String>, LinkError> {
        Ok(self.visible.clone())
    }

    fn begin_join(&mut self, ssid: &str, password: &str, country: &str) -> Result<(), LinkError> {
        self.joins += 1;
        self.up = false;
        self.pending = Some(if !self.visible.iter().any(|s| s == ssid) {
            Err(REASON_NO_AP_FOUND)
        } else if password != self.password {
            Err(REASON_HANDSHAKE_TIMEOUT)
        } else {
            Ok(self.polls_to_up)
        });
        info!("WiFi(sim): joining '{}' ({})", ssid, country);
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        match self.pending {
            Some(Ok(0)) => {
                self.up = true;
                self.pending = None;
            }
            Some(Ok(n)) => self.pending = Some(Ok(n - 1)),
            _ => {}
        }
        join_status(self.up, self.pending.is_some(), self.pending.and_then(Result::err))
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.up.then_some(self.address)
    }

    fn disconnect(&mut self) {
        self.up = false;
        self.pending = None;
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
