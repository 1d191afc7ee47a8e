//! Platform services consumed by the driver.
//!
//! Business logic stays in the driver, the platform is just I/O:
//! GPIO levels and edge interrupts, a microsecond clock, a periodic tick
//! and a task to run the processing loop in. `hal::esp::EspPlatform` is the
//! ESP-IDF implementation; host tests provide a simulated one.

use alloc::boxed::Box;
use core::ffi::c_void;

use crate::config::TaskSpec;
use crate::error::CaliperError;

/// Interrupt entry point plus the opaque context it is registered with.
#[derive(Clone, Copy, Debug)]
pub struct IsrHook {
    pub func: unsafe extern "C" fn(*mut c_void),
    pub ctx: *mut c_void,
}

// SAFETY: The context pointer is only dereferenced by `func`, whose
// registrant guarantees the pointee outlives the registration.
unsafe impl Send for IsrHook {}
unsafe impl Sync for IsrHook {}

impl IsrHook {
    /// Run the hook as the interrupt would.
    ///
    /// # Safety
    ///
    /// The registration must still be live (context not yet released).
    #[inline]
    pub unsafe fn fire(&self) {
        // SAFETY: Forwarded to the caller.
        unsafe { (self.func)(self.ctx) }
    }
}

/// Hardware and OS facilities used by `CaliperDriver`.
pub trait Platform: Send + Sync + 'static {
    /// Monotonic time in microseconds.
    fn now_us(&self) -> i64;

    /// Sleep the calling task.
    fn delay_ms(&self, ms: u32);

    /// Raw level of an input pin.
    fn level(&self, pin: i32) -> bool;

    /// Install the shared GPIO interrupt service. Already installed is success.
    fn install_isr_service(&self) -> Result<(), CaliperError>;

    /// Configure both lines as pulled-up digital inputs.
    fn configure_inputs(&self, clock_pin: i32, data_pin: i32) -> Result<(), CaliperError>;

    /// Call `hook` on every transition of `pin`, from interrupt context.
    ///
    /// # Safety
    ///
    /// `hook.ctx` must stay valid until `disarm_edge(pin)` returns.
    unsafe fn arm_edge(&self, pin: i32, hook: IsrHook) -> Result<(), CaliperError>;

    /// Stop edge interrupts on `pin`.
    ///
    /// When this returns no hook call for `pin` is in flight on any core
    /// and none will start, so the hook context may be freed.
    fn disarm_edge(&self, pin: i32);

    /// Call `hook` every `period_us`, from interrupt or timer-task context.
    ///
    /// # Safety
    ///
    /// `hook.ctx` must stay valid until `stop_tick` returns.
    unsafe fn start_tick(&self, period_us: u64, hook: IsrHook) -> Result<(), CaliperError>;

    /// Stop and release the tick source.
    ///
    /// When this returns no hook call is in flight on any core and none
    /// will start.
    fn stop_tick(&self);

    /// Run `work` to completion in a new task.
    fn spawn(&self, task: &TaskSpec, work: Box<dyn FnOnce() + Send + 'static>) -> Result<(), CaliperError>;
}
