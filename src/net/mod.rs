//! Network pipeline: link → discovery → session, supervised forever.
//!
//! | Module         | Owns                                         |
//! |----------------|----------------------------------------------|
//! | `link`         | WiFi association, `is_up()` watch            |
//! | `discovery`    | UDP announce / ack, broadcast address        |
//! | `session`      | TCP session, sender + receiver loops         |
//! | `orchestrator` | stage sequencing and per-stage backoff       |

pub mod discovery;
pub mod link;
pub mod orchestrator;
pub mod session;
