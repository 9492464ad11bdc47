//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                   | Connects to                |
//! |-------------|------------------------------|----------------------------|
//! | `wifi`      | LinkDriver                   | ESP-IDF WiFi STA           |
//! | `udp`       | DatagramBinder / Socket      | lwIP UDP (broadcast)       |
//! | `hardware`  | InputSense / OutputDrive     | GPIO, embedded-hal pins    |
//! | `time`      | ClockPort                    | ESP32 system timer, RTC    |
//! | `device_id` | -                            | eFuse base MAC             |
//! | `utils`     | -                            | credential validation      |

pub mod device_id;
pub mod hardware;
pub mod time;
pub mod udp;
pub(crate) mod utils;
pub mod wifi;
