//! Caliper driver: lifecycle, interrupt handlers and the processing task.
//!
//! # Execution contexts
//!
//! ```text
//! clock edge ISR ──▶ Caliper::sample_edge ──┐
//!                                           ├──▶ NotifyQueue ──▶ processing task ──▶ callback
//! tick (10 ms)   ──▶ Caliper::scan_idle  ───┘                    (decode, no lock held)
//!
//! poll() ──▶ Caliper::read   (caller context, bypasses the queue)
//! ```
//!
//! - Edge and tick handlers only touch instance state and push identities
//! - Only the processing task decodes for callbacks and calls user code
//! - Lock order: registry, then caliper, then queue
//!
//! The driver is an explicit context object. Several can coexist as long
//! as they do not share pins; one per process matches the hardware.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::ffi::c_void;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::caliper::{Caliper, Reading};
use crate::config::{CaliperConfig, DriverConfig, MAX_CALIPERS, QUEUE_CAPACITY};
use crate::error::CaliperError;
use crate::log_globals::{ISR_LOG_STREAM, TASK_LOG_STREAM};
use crate::platform::{IsrHook, Platform};
use crate::queue::NotifyQueue;
use crate::registry::{CaliperId, Registry};
use crate::sampler::{CaliperStats, EdgeEvent};
use crate::{rt_debug, rt_error, rt_info, rt_warn};

/// State shared between the API, the interrupt handlers and the task.
struct Shared<P: Platform> {
    platform: P,
    config: DriverConfig,
    registry: Registry<MAX_CALIPERS>,
    queue: NotifyQueue<QUEUE_CAPACITY>,
    /// Set by `initialize`, cleared at the end of `deinitialize`.
    initialized: AtomicBool,
    /// Tick source is registered with `Shared` as context.
    ticking: AtomicBool,
    /// Asks the processing task to exit.
    stop: AtomicBool,
    /// True while the processing task is inside its loop.
    worker_running: AtomicBool,
    /// Queue drop count already reported to the log.
    reported_drops: AtomicU32,
}

/// Context registered with one clock-line interrupt.
struct EdgeBinding<P: Platform> {
    shared: *const Shared<P>,
    caliper: Arc<Caliper>,
}

/// Driver for any number of bit-banged calipers.
///
/// # Example
///
/// ```ignore
/// let driver = CaliperDriver::new(EspPlatform::new(), DriverConfig::default());
/// driver.initialize()?;
/// let x = driver.add(CaliperConfig::new("x", 18, 19).with_callback(|_, r| { /* ... */ }))?;
/// let y = driver.add(CaliperConfig::new("y", 20, 21))?;
/// let reading = driver.poll(y)?;
/// ```
pub struct CaliperDriver<P: Platform> {
    shared: Arc<Shared<P>>,
}

impl<P: Platform> CaliperDriver<P> {
    /// Create an uninitialized driver.
    pub fn new(platform: P, config: DriverConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                platform,
                config,
                registry: Registry::new(),
                queue: NotifyQueue::new(),
                initialized: AtomicBool::new(false),
                ticking: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                worker_running: AtomicBool::new(false),
                reported_drops: AtomicU32::new(0),
            }),
        }
    }

    /// Start the processing task and the idle-scan tick.
    ///
    /// Fails with `AlreadyInitialized` on a running driver without touching it.
    /// On any other failure everything started so far is stopped again.
    pub fn initialize(&self) -> Result<(), CaliperError> {
        let shared = &self.shared;
        shared.config.validate()?;

        if shared
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            rt_error!(TASK_LOG_STREAM, shared.platform.now_us(), "already initialized!");
            return Err(CaliperError::AlreadyInitialized);
        }

        if let Err(e) = self.start() {
            rt_error!(TASK_LOG_STREAM, shared.platform.now_us(), "initialize failed: {}", e);
            self.shutdown();
            return Err(e);
        }

        rt_info!(
            TASK_LOG_STREAM,
            shared.platform.now_us(),
            "caliper driver up (tick {} us, power loss {} us)",
            shared.config.tick_period_us,
            shared.config.power_loss_us
        );
        Ok(())
    }

    fn start(&self) -> Result<(), CaliperError> {
        let shared = &self.shared;
        shared.platform.install_isr_service()?;

        shared.queue.clear();
        shared.stop.store(false, Ordering::Release);
        shared.worker_running.store(true, Ordering::Release);

        let worker = Arc::clone(shared);
        if let Err(e) = shared.platform.spawn(&shared.config.task, Box::new(move || worker.run())) {
            shared.worker_running.store(false, Ordering::Release);
            return Err(e);
        }

        let hook = IsrHook {
            func: on_tick::<P>,
            ctx: Arc::as_ptr(shared) as *mut c_void,
        };
        // SAFETY: `shared` is kept alive by `self` until `shutdown` has
        // called `stop_tick`.
        unsafe { shared.platform.start_tick(shared.config.tick_period_us, hook)? };
        shared.ticking.store(true, Ordering::Release);

        Ok(())
    }

    /// Stop the tick and the processing task, then remove every caliper.
    ///
    /// Waits for the task to exit (bounded by the receive timeout). Safe to
    /// call more than once; must not be called from a caliper callback.
    pub fn deinitialize(&self) {
        if !self.shared.initialized.load(Ordering::Acquire) {
            return;
        }
        self.shutdown();
        rt_info!(TASK_LOG_STREAM, self.shared.platform.now_us(), "caliper driver down");
    }

    fn shutdown(&self) {
        let shared = &self.shared;

        if shared.ticking.swap(false, Ordering::AcqRel) {
            shared.platform.stop_tick();
        }

        shared.stop.store(true, Ordering::Release);
        while shared.worker_running.load(Ordering::Acquire) {
            shared.platform.delay_ms(shared.config.poll_interval_ms);
        }
        shared.queue.clear();

        while let Some(caliper) = shared.registry.pop_any() {
            shared.release(&caliper);
        }

        shared.initialized.store(false, Ordering::Release);
    }

    /// Attach a caliper and arm its clock-line interrupt.
    pub fn add(&self, config: CaliperConfig) -> Result<CaliperId, CaliperError> {
        let shared = &self.shared;
        shared.ensure_initialized()?;

        let id = shared.registry.reserve().inspect_err(|_| {
            rt_error!(TASK_LOG_STREAM, shared.platform.now_us(), "no slot left for caliper {}", config.name);
        })?;

        if let Err(e) = shared.platform.configure_inputs(config.clock_pin, config.data_pin) {
            shared.registry.cancel(id);
            return Err(e);
        }

        let caliper = Arc::new(Caliper::new(id, config));
        shared.registry.fill(Arc::clone(&caliper))?;

        let binding = Box::into_raw(Box::new(EdgeBinding {
            shared: Arc::as_ptr(shared),
            caliper: Arc::clone(&caliper),
        }));
        caliper.set_edge_ctx(binding as *mut c_void);

        let hook = IsrHook {
            func: on_clock_edge::<P>,
            ctx: binding as *mut c_void,
        };
        // SAFETY: `binding` is released only in `Shared::release`, after
        // `disarm_edge` for this pin.
        if let Err(e) = unsafe { shared.platform.arm_edge(caliper.clock_pin(), hook) } {
            if let Some(caliper) = shared.registry.remove(id) {
                shared.release(&caliper);
            }
            return Err(e);
        }

        rt_info!(
            TASK_LOG_STREAM,
            shared.platform.now_us(),
            "caliper {} added as {} (clock {}, data {}{})",
            caliper.name(),
            id,
            caliper.clock_pin(),
            caliper.data_pin(),
            if caliper.is_inverted() { ", inverted" } else { "" }
        );
        Ok(id)
    }

    /// Disarm and detach a caliper. The handle is invalid afterwards.
    ///
    /// May be called from the caliper's own callback.
    pub fn remove(&self, id: CaliperId) -> Result<(), CaliperError> {
        let shared = &self.shared;
        shared.ensure_initialized()?;

        let caliper = shared.registry.remove(id).ok_or(CaliperError::InvalidHandle)?;
        shared.release(&caliper);

        rt_info!(TASK_LOG_STREAM, shared.platform.now_us(), "caliper {} removed", caliper.name());
        Ok(())
    }

    /// Read and decode the latest frame in the caller's context.
    pub fn poll(&self, id: CaliperId) -> Result<Reading, CaliperError> {
        Ok(self.lookup(id)?.read())
    }

    /// Diagnostic counters for one caliper.
    pub fn stats(&self, id: CaliperId) -> Result<CaliperStats, CaliperError> {
        Ok(self.lookup(id)?.stats())
    }

    fn lookup(&self, id: CaliperId) -> Result<Arc<Caliper>, CaliperError> {
        self.shared.ensure_initialized()?;
        self.shared.registry.get(id).ok_or(CaliperError::InvalidHandle)
    }

    /// Notifications lost to a full handoff queue since creation.
    pub fn dropped_notifications(&self) -> u32 {
        self.shared.queue.dropped()
    }

    /// Number of attached calipers.
    pub fn len(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.registry.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    pub fn platform(&self) -> &P {
        &self.shared.platform
    }
}

impl<P: Platform> Drop for CaliperDriver<P> {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

impl<P: Platform> Shared<P> {
    fn ensure_initialized(&self) -> Result<(), CaliperError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CaliperError::NotInitialized)
        }
    }

    /// Disarm the clock interrupt and free its context.
    fn release(&self, caliper: &Caliper) {
        let ctx = caliper.take_edge_ctx();
        if ctx.is_null() {
            return;
        }
        self.platform.disarm_edge(caliper.clock_pin());
        // SAFETY: Created by `Box::into_raw` in `add`; `take_edge_ctx` hands
        // it out once, and after `disarm_edge` no handler still reads it.
        drop(unsafe { Box::from_raw(ctx as *mut EdgeBinding<P>) });
    }

    /// Edge handler. Interrupt context.
    #[inline]
    fn on_edge(&self, caliper: &Caliper) {
        let now = self.platform.now_us();
        let clock = self.platform.level(caliper.clock_pin());
        let data = self.platform.level(caliper.data_pin());

        let event = caliper.sample_edge(clock, data, now, self.config.resync_gap_us, &self.queue);
        if event == EdgeEvent::Resync {
            rt_debug!(ISR_LOG_STREAM, now, "caliper {} resync", caliper.id());
        }
    }

    /// Idle scanner. Tick context.
    fn scan_idle(&self) {
        let now = self.platform.now_us();
        let power_loss_us = self.config.power_loss_us;
        let mut lost = [None; MAX_CALIPERS];
        let mut count = 0;

        self.registry.for_each(|caliper| {
            if caliper.scan_idle(now, power_loss_us, &self.queue) {
                if let Some(entry) = lost.get_mut(count) {
                    *entry = Some(caliper.id());
                    count += 1;
                }
            }
        });

        // Logged after the registry lock is released
        for id in lost.iter().flatten() {
            rt_info!(ISR_LOG_STREAM, now, "caliper {} powered off", id);
        }
    }

    /// Wait for one notification and deliver it. Returns false on timeout.
    fn process_next(&self) -> bool {
        let id = match self.queue.recv_timeout(
            self.config.receive_timeout_ms,
            self.config.poll_interval_ms,
            |ms| self.platform.delay_ms(ms),
        ) {
            Some(id) => id,
            None => return false,
        };

        // Instance may have been removed since the notification was queued
        if let Some(caliper) = self.registry.get(id) {
            caliper.deliver();
        }
        true
    }

    /// Processing loop. Runs in its own task until `stop` is set.
    fn run(&self) {
        rt_debug!(TASK_LOG_STREAM, self.platform.now_us(), "processing task started");

        while !self.stop.load(Ordering::Acquire) {
            self.process_next();
            self.report_drops();
        }

        rt_debug!(TASK_LOG_STREAM, self.platform.now_us(), "processing task stopped");
        self.worker_running.store(false, Ordering::Release);
    }

    fn report_drops(&self) {
        let dropped = self.queue.dropped();
        let reported = self.reported_drops.swap(dropped, Ordering::Relaxed);
        if dropped != reported {
            rt_warn!(
                TASK_LOG_STREAM,
                self.platform.now_us(),
                "handoff queue full, {} notification(s) dropped",
                dropped.wrapping_sub(reported)
            );
        }
    }
}

/// GPIO interrupt entry for one clock line.
unsafe extern "C" fn on_clock_edge<P: Platform>(ctx: *mut c_void) {
    // SAFETY: `ctx` is the `EdgeBinding` registered in `add`, live until
    // the pin is disarmed; `shared` outlives every binding.
    let binding = unsafe { &*(ctx as *const EdgeBinding<P>) };
    let shared = unsafe { &*binding.shared };
    shared.on_edge(&binding.caliper);
}

/// Tick entry for the idle scanner.
unsafe extern "C" fn on_tick<P: Platform>(ctx: *mut c_void) {
    // SAFETY: `ctx` is the `Shared` registered in `start`, live until
    // `stop_tick` returns.
    let shared = unsafe { &*(ctx as *const Shared<P>) };
    shared.scan_idle();
}
