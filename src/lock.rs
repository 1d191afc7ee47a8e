//! Module: lock
//!
//! Purpose: Short critical section usable from interrupt and task context.
//!
//! Architecture:
//! - `critical_section::Mutex<RefCell<T>>` entered with `critical_section::with`
//! - ESP-IDF: the `esp-idf-hal` implementation (portMUX spinlock + interrupts
//!   masked on the current core). Safe against preemption by the GPIO and
//!   timer ISRs and against the other core.
//! - Host: the `std` implementation (global reentrant lock). Tests use
//!   threads in place of interrupts.
//!
//! Rules:
//! - Critical sections are O(1): field reads/writes, shifts, increments.
//! - Never allocate, block, log, or call user code while holding the lock.
//! - The same lock is not reentrant. Nesting different locks is allowed in
//!   one fixed order: registry, then caliper, then queue.
//!
//! Safety: Safe. Exclusion comes from the critical section, borrow
//! tracking from `RefCell`.

use core::cell::RefCell;

use critical_section::Mutex;

/// Interrupt-safe mutual exclusion around a value.
pub struct IsrLock<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> IsrLock<T> {
    /// Create a new unlocked value.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    #[inline]
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
