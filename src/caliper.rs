//! Per-device instance record.
//!
//! Immutable identity and configuration, plus the sampler state behind
//! the instance's own short critical section.

use core::ffi::c_void;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::config::{CaliperCallback, CaliperConfig};
use crate::frame::Unit;
use crate::lock::IsrLock;
use crate::queue::NotifyQueue;
use crate::registry::CaliperId;
use crate::sampler::{CaliperStats, EdgeEvent, SamplerSnapshot, SamplerState};

/// One decoded reading, as delivered to callbacks and returned by poll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    pub name: &'static str,
    pub value: f64,
    pub unit: Unit,
    pub power: bool,
}

impl Reading {
    pub fn from_snapshot(name: &'static str, snapshot: SamplerSnapshot) -> Self {
        let m = snapshot.frame.decode();
        Self {
            name,
            value: m.value,
            unit: m.unit,
            power: snapshot.power,
        }
    }
}

impl core::fmt::Display for Reading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: {:.*} {}",
            self.name,
            self.unit.decimals(),
            self.value,
            self.unit
        )?;
        if !self.power {
            f.write_str(" (off)")?;
        }
        Ok(())
    }
}

/// An attached caliper.
pub struct Caliper {
    id: CaliperId,
    name: &'static str,
    clock_pin: i32,
    data_pin: i32,
    invert: bool,
    callback: Option<CaliperCallback>,
    state: IsrLock<SamplerState>,
    /// Interrupt context registered for the clock line (owned by the driver).
    edge_ctx: AtomicPtr<c_void>,
}

impl Caliper {
    pub fn new(id: CaliperId, config: CaliperConfig) -> Self {
        Self {
            id,
            name: config.name,
            clock_pin: config.clock_pin,
            data_pin: config.data_pin,
            invert: config.invert,
            callback: config.callback,
            state: IsrLock::new(SamplerState::new()),
            edge_ctx: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    #[inline]
    pub fn id(&self) -> CaliperId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn clock_pin(&self) -> i32 {
        self.clock_pin
    }

    #[inline]
    pub fn data_pin(&self) -> i32 {
        self.data_pin
    }

    #[inline]
    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    #[inline]
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Edge handler body. Interrupt context: no allocation, no blocking.
    ///
    /// `clock` and `data` are raw line levels; inversion is applied here.
    /// A completed frame is announced on `queue` only for callback
    /// instances, since poll-only instances have no consumer.
    #[inline]
    pub fn sample_edge<const Q: usize>(
        &self,
        clock: bool,
        data: bool,
        now_us: i64,
        resync_gap_us: i64,
        queue: &NotifyQueue<Q>,
    ) -> EdgeEvent {
        let (clock, data) = if self.invert { (!clock, !data) } else { (clock, data) };
        let notify = self.has_callback();

        self.state.lock(|state| {
            let event = state.on_edge(clock, data, now_us, resync_gap_us);
            if event == EdgeEvent::FrameComplete && notify {
                queue.push(self.id);
            }
            event
        })
    }

    /// Idle-scan body. Returns true when power was just lost.
    #[inline]
    pub fn scan_idle<const Q: usize>(&self, now_us: i64, power_loss_us: i64, queue: &NotifyQueue<Q>) -> bool {
        let notify = self.has_callback();

        self.state.lock(|state| {
            let expired = state.expire(now_us, power_loss_us);
            if expired && notify {
                queue.push(self.id);
            }
            expired
        })
    }

    /// Snapshot under the lock, decode outside it.
    pub fn read(&self) -> Reading {
        let snapshot = self.state.lock(|state| state.snapshot());
        Reading::from_snapshot(self.name, snapshot)
    }

    pub fn stats(&self) -> CaliperStats {
        self.state.lock(|state| state.stats())
    }

    /// Read and hand the result to the callback, if any.
    ///
    /// Must run with no lock held: the callback may call back into the driver.
    pub fn deliver(&self) -> bool {
        match &self.callback {
            Some(callback) => {
                let reading = self.read();
                callback(self.id, &reading);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_edge_ctx(&self, ctx: *mut c_void) {
        self.edge_ctx.store(ctx, Ordering::Release);
    }

    pub(crate) fn take_edge_ctx(&self) -> *mut c_void {
        self.edge_ctx.swap(core::ptr::null_mut(), Ordering::AcqRel)
    }
}

impl core::fmt::Debug for Caliper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Caliper")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("clock_pin", &self.clock_pin)
            .field("data_pin", &self.data_pin)
            .field("invert", &self.invert)
            .finish()
    }
}
