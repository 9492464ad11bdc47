//! Button edge hand-off from interrupt context to the dispatcher thread.
//!
//! ```text
//!  GPIO ISR ──enqueue──▶ EDGE_CHANNEL (16) ──dequeue──▶ dispatcher
//!                                                              │
//!                                        DeviceController::on_edge
//! ```
//!
//! The channel is a lock-free `heapless` MPMC ring: posting is a CAS loop
//! with no mutex and no critical section, so the ISR never blocks and
//! never touches device state.  When the ring is full the edge is counted
//! and dropped; a held button produces one rising edge, so a dropped
//! bounce is harmless.

use core::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use heapless::mpmc::MpMcQueue;
use log::{debug, warn};

use crate::app::controller::{DeviceController, EdgeOutcome};

/// Capacity of the ISR → dispatcher channel.  Must be a power of two.
pub const EDGE_QUEUE_DEPTH: usize = 16;

/// Dispatcher poll period when the channel is empty.
pub const DISPATCH_IDLE: Duration = Duration::from_millis(2);

/// A rising edge on a device's button input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub device: u8,
    pub at_ms: u64,
}

pub type EdgeChannel = MpMcQueue<EdgeEvent, EDGE_QUEUE_DEPTH>;

static EDGE_CHANNEL: EdgeChannel = MpMcQueue::new();
static DROPPED_EDGES: AtomicU32 = AtomicU32::new(0);

/// ISR entry point.  Lock-free; safe from interrupt context.
pub fn edge_isr_handler(device: u8, at_ms: u64) {
    post_edge(&EDGE_CHANNEL, EdgeEvent { device, at_ms });
}

/// Post into `channel`, counting the edge if the channel is full.
pub fn post_edge(channel: &EdgeChannel, event: EdgeEvent) -> bool {
    if channel.enqueue(event).is_ok() {
        true
    } else {
        DROPPED_EDGES.fetch_add(1, Ordering::Relaxed);
        false
    }
}

/// Edges dropped because the channel was full, since boot.
pub fn dropped_edges() -> u32 {
    DROPPED_EDGES.load(Ordering::Relaxed)
}

/// Feed every queued edge in `channel` to the controller.  Returns how many
/// were handled.
pub fn drain_from(channel: &EdgeChannel, controller: &DeviceController) -> usize {
    let mut handled = 0;
    while let Some(edge) = channel.dequeue() {
        handled += 1;
        match controller.on_edge(usize::from(edge.device), edge.at_ms) {
            EdgeOutcome::Accepted(state) => {
                debug!("Edge: device #{} → {}", edge.device, state);
            }
            EdgeOutcome::UnknownDevice => {
                warn!("Edge: no device #{}", edge.device);
            }
            EdgeOutcome::Debounced | EdgeOutcome::NotPressed => {}
        }
    }
    handled
}

/// Drain the global ISR channel.
pub fn drain_edges(controller: &DeviceController) -> usize {
    drain_from(&EDGE_CHANNEL, controller)
}

/// Dispatcher thread body.
pub fn run_dispatcher(controller: &DeviceController) -> ! {
    let mut reported = 0;
    loop {
        if drain_edges(controller) == 0 {
            std::thread::sleep(DISPATCH_IDLE);
        }
        let dropped = dropped_edges();
        if dropped != reported {
            warn!("Edge: {} edges dropped (queue full)", dropped - reported);
            reported = dropped;
        }
    }
}
