//! Outbound queue and the lock it shares with device state.
//!
//! ```text
//!  edge dispatcher ──┐                          ┌──▶ session sender
//!                    ├─▶ SharedState { T, Q } ──┤
//!  session receiver ─┘   (one critical section) └──  pop_if_any()
//! ```
//!
//! Device state and the queue live behind a single `embassy-sync`
//! critical-section mutex.  A state change and the `status` event that
//! reports it are therefore one atomic step, and the queue order is the
//! lock-acquisition order.  The lock is never held across I/O or sleeps;
//! closures passed to [`SharedState::lock`] must only touch memory and GPIO
//! levels.

use core::cell::RefCell;
use std::collections::VecDeque;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use super::events::OutboundEvent;
use super::ports::OutboundSource;

// ───────────────────────────────────────────────────────────────
// OutboundQueue
// ───────────────────────────────────────────────────────────────

/// Strict FIFO of pending outbound events.  Unbounded and volatile.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    events: VecDeque<OutboundEvent>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: OutboundEvent) {
        self.events.push_back(event);
    }

    pub fn pop_if_any(&mut self) -> Option<OutboundEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// SharedState
// ───────────────────────────────────────────────────────────────

struct Guarded<T> {
    value: T,
    queue: OutboundQueue,
}

/// `T` plus the outbound queue, guarded by one critical section.
pub struct SharedState<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Guarded<T>>>,
}

impl<T> SharedState<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Guarded {
                value,
                queue: OutboundQueue::new(),
            })),
        }
    }

    /// Run `f` with exclusive access to the state and the queue.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T, &mut OutboundQueue) -> R) -> R {
        self.inner.lock(|cell| {
            let mut guard = cell.borrow_mut();
            let Guarded { value, queue } = &mut *guard;
            f(value, queue)
        })
    }

    pub fn push(&self, event: OutboundEvent) {
        self.lock(|_, queue| queue.push(event));
    }

    pub fn pop_if_any(&self) -> Option<OutboundEvent> {
        self.lock(|_, queue| queue.pop_if_any())
    }

    /// Number of events waiting to be sent.
    pub fn pending(&self) -> usize {
        self.lock(|_, queue| queue.len())
    }
}

impl<T: Send> OutboundSource for SharedState<T> {
    fn pop_if_any(&self) -> Option<OutboundEvent> {
        SharedState::pop_if_any(self)
    }
}
