//! Wire formats.
//!
//! | Module     | Carries                                   | Transport      |
//! |------------|-------------------------------------------|----------------|
//! | `announce` | discovery announce / ack                  | UDP broadcast  |
//! | `frames`   | session frames (`{"type", "data"}`)       | TCP            |
//! | `codec`    | newline framing for the session stream    | TCP            |

pub mod announce;
pub mod codec;
pub mod frames;
