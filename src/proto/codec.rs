//! Newline-delimited frame codec.
//!
//! Wire format:
//! ```text
//! ┌──────────────────────────┬────┐
//! │ JSON payload (N B)       │ \n │
//! └──────────────────────────┴────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields every complete line.
//! A single `read` may return part of a line, or several lines at once.
//! A line longer than [`MAX_LINE`] is reported once as
//! [`LineError::TooLong`] and the rest of it is discarded up to the next
//! newline.

/// Maximum frame size (protects against memory exhaustion).
pub const MAX_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    TooLong,
}

impl core::fmt::Display for LineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooLong => write!(f, "line exceeds {MAX_LINE} bytes"),
        }
    }
}

impl std::error::Error for LineError {}

/// Streaming line decoder.
pub struct LineDecoder {
    buf: heapless::Vec<u8, MAX_LINE>,
    /// Dropping the tail of an oversized line.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            discarding: false,
        }
    }

    /// Feed bytes into the decoder, calling `on_line` for every complete,
    /// non-empty line (without the trailing `\r\n` / `\n`).
    pub fn feed(&mut self, mut data: &[u8], mut on_line: impl FnMut(Result<&[u8], LineError>)) {
        while !data.is_empty() {
            let (chunk, terminated) = match data.iter().position(|&b| b == b'\n') {
                Some(pos) => (&data[..pos], true),
                None => (data, false),
            };
            data = &data[(chunk.len() + usize::from(terminated))..];

            if !self.discarding && self.buf.extend_from_slice(chunk).is_err() {
                self.buf.clear();
                self.discarding = true;
                on_line(Err(LineError::TooLong));
            }

            if terminated {
                if !self.discarding {
                    let line = self.buf.strip_suffix(b"\r").unwrap_or(&self.buf[..]);
                    if !line.is_empty() {
                        on_line(Ok(line));
                    }
                }
                self.buf.clear();
                self.discarding = false;
            }
        }
    }

    /// Drop any partial line (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

/// Append one frame and its terminator to `out`.
pub fn encode_line(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(payload);
    out.push(b'\n');
}
