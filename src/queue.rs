//! Bounded handoff queue from interrupt context to the processing task.
//!
//! # Architecture
//!
//! ```text
//! edge ISR ──┐
//!            ├──▶ NotifyQueue ──────▶ processing task
//! tick ISR ──┘    (N identities)      (waits, re-reads state)
//! ```
//!
//! # Rules
//!
//! - `push` never blocks: on a full queue the notification is dropped and counted
//! - A notification carries only an identity; the consumer re-reads current
//!   state, so a dropped or stale notification loses no data
//! - `recv_timeout` waits in `poll_ms` sleeps so the caller can observe a
//!   stop flag at least once per timeout

use core::sync::atomic::{AtomicU32, Ordering};

use crate::lock::IsrLock;
use crate::registry::CaliperId;

struct Ring<const N: usize> {
    ids: [CaliperId; N],
    head: usize,
    len: usize,
}

/// Bounded FIFO of caliper identities.
pub struct NotifyQueue<const N: usize> {
    ring: IsrLock<Ring<N>>,
    dropped: AtomicU32,
}

impl<const N: usize> NotifyQueue<N> {
    /// Create a new empty queue.
    pub const fn new() -> Self {
        assert!(N > 0, "Queue capacity must be non-zero");

        Self {
            ring: IsrLock::new(Ring {
                ids: [CaliperId::from_parts(0, 0); N],
                head: 0,
                len: 0,
            }),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue a notification (ISR-safe, never blocks).
    ///
    /// Returns `true` if queued, `false` if dropped (queue full).
    #[inline]
    pub fn push(&self, id: CaliperId) -> bool {
        let queued = self.ring.lock(|ring| {
            if ring.len == N {
                return false;
            }
            let tail = (ring.head + ring.len) % N;
            ring.ids[tail] = id;
            ring.len += 1;
            true
        });
        if !queued {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Dequeue the oldest notification, if any.
    #[inline]
    pub fn pop(&self) -> Option<CaliperId> {
        self.ring.lock(|ring| {
            if ring.len == 0 {
                return None;
            }
            let id = ring.ids[ring.head];
            ring.head = (ring.head + 1) % N;
            ring.len -= 1;
            Some(id)
        })
    }

    /// Wait up to `timeout_ms` for a notification.
    ///
    /// `sleep` is called with `poll_ms` between empty checks.
    pub fn recv_timeout(&self, timeout_ms: u32, poll_ms: u32, mut sleep: impl FnMut(u32)) -> Option<CaliperId> {
        let poll_ms = poll_ms.max(1);
        let mut waited = 0u32;
        loop {
            if let Some(id) = self.pop() {
                return Some(id);
            }
            if waited >= timeout_ms {
                return None;
            }
            let step = poll_ms.min(timeout_ms - waited);
            sleep(step);
            waited += step;
        }
    }

    /// Discard every pending notification.
    pub fn clear(&self) {
        self.ring.lock(|ring| {
            ring.head = 0;
            ring.len = 0;
        });
    }

    pub fn len(&self) -> usize {
        self.ring.lock(|ring| ring.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifications dropped on a full queue since creation.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for NotifyQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
