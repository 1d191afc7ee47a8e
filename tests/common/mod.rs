//! Simulated platform for host-side driver tests.
//!
//! Time only moves when a test says so. Edge and tick interrupts are fired
//! explicitly from the test thread; the processing loop runs on a real
//! std thread.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use digital_caliper::{CaliperError, DriverConfig, IsrHook, Platform, TaskSpec};

/// Half period of the simulated caliper clock.
pub const HALF_PERIOD_US: i64 = 10;

/// Error code reported by injected failures.
pub const INJECTED: i32 = -1;

pub struct SimPlatform {
    now: AtomicI64,
    levels: Mutex<HashMap<i32, bool>>,
    edges: Mutex<HashMap<i32, IsrHook>>,
    tick: Mutex<Option<IsrHook>>,
    pub installs: AtomicU32,
    pub spawned: AtomicU32,
    pub fail_spawn: AtomicBool,
    pub fail_tick: AtomicBool,
    pub fail_configure: AtomicBool,
    pub fail_arm: AtomicBool,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            now: AtomicI64::new(1_000_000),
            levels: Mutex::new(HashMap::new()),
            edges: Mutex::new(HashMap::new()),
            tick: Mutex::new(None),
            installs: AtomicU32::new(0),
            spawned: AtomicU32::new(0),
            fail_spawn: AtomicBool::new(false),
            fail_tick: AtomicBool::new(false),
            fail_configure: AtomicBool::new(false),
            fail_arm: AtomicBool::new(false),
        }
    }

    pub fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn advance(&self, us: i64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }

    pub fn set_level(&self, pin: i32, level: bool) {
        self.levels.lock().unwrap().insert(pin, level);
    }

    pub fn is_armed(&self, pin: i32) -> bool {
        self.edges.lock().unwrap().contains_key(&pin)
    }

    pub fn armed_count(&self) -> usize {
        self.edges.lock().unwrap().len()
    }

    pub fn is_ticking(&self) -> bool {
        self.tick.lock().unwrap().is_some()
    }

    /// Fire the edge interrupt of `pin` if armed. Returns whether it ran.
    ///
    /// The map stays locked while the hook runs, so `disarm_edge` waits for
    /// an in-flight handler like the real interrupt service does.
    pub fn fire_edge(&self, pin: i32) -> bool {
        let edges = self.edges.lock().unwrap();
        match edges.get(&pin) {
            Some(hook) => {
                unsafe { hook.fire() };
                true
            }
            None => false,
        }
    }

    pub fn fire_tick(&self) -> bool {
        let tick = self.tick.lock().unwrap();
        match tick.as_ref() {
            Some(hook) => {
                unsafe { hook.fire() };
                true
            }
            None => false,
        }
    }

    /// Drive one clock transition with `data` already on the data line.
    pub fn drive(&self, clock_pin: i32, data_pin: i32, clock: bool, data: bool) {
        self.set_level(data_pin, data);
        self.set_level(clock_pin, clock);
        self.fire_edge(clock_pin);
        self.advance(HALF_PERIOD_US);
    }

    /// Clock `count` bits of `frame`, first bit first.
    ///
    /// `invert` models an inverting level shifter between caliper and pins.
    pub fn clock_bits(&self, clock_pin: i32, data_pin: i32, frame: u32, count: u32, invert: bool) {
        for i in 0..count {
            let bit = (frame >> i) & 1 == 1;
            self.drive(clock_pin, data_pin, !invert, bit != invert);
            self.drive(clock_pin, data_pin, invert, bit != invert);
        }
    }

    /// Clock a full 24-bit frame.
    pub fn clock_frame(&self, clock_pin: i32, data_pin: i32, frame: u32) {
        self.clock_bits(clock_pin, data_pin, frame, 24, false);
    }

    fn check(flag: &AtomicBool) -> Result<(), CaliperError> {
        if flag.load(Ordering::SeqCst) {
            Err(CaliperError::Platform(INJECTED))
        } else {
            Ok(())
        }
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimPlatform {
    fn now_us(&self) -> i64 {
        self.now()
    }

    fn delay_ms(&self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }

    fn level(&self, pin: i32) -> bool {
        // Pulled up when nothing drives it
        self.levels.lock().unwrap().get(&pin).copied().unwrap_or(true)
    }

    fn install_isr_service(&self) -> Result<(), CaliperError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn configure_inputs(&self, _clock_pin: i32, _data_pin: i32) -> Result<(), CaliperError> {
        Self::check(&self.fail_configure)
    }

    unsafe fn arm_edge(&self, pin: i32, hook: IsrHook) -> Result<(), CaliperError> {
        Self::check(&self.fail_arm)?;
        self.edges.lock().unwrap().insert(pin, hook);
        Ok(())
    }

    fn disarm_edge(&self, pin: i32) {
        self.edges.lock().unwrap().remove(&pin);
    }

    unsafe fn start_tick(&self, _period_us: u64, hook: IsrHook) -> Result<(), CaliperError> {
        Self::check(&self.fail_tick)?;
        *self.tick.lock().unwrap() = Some(hook);
        Ok(())
    }

    fn stop_tick(&self) {
        *self.tick.lock().unwrap() = None;
    }

    fn spawn(&self, task: &TaskSpec, work: Box<dyn FnOnce() + Send + 'static>) -> Result<(), CaliperError> {
        Self::check(&self.fail_spawn)?;
        let name = task.name.to_string_lossy().into_owned();
        thread::Builder::new()
            .name(name)
            .spawn(work)
            .map_err(|_| CaliperError::Platform(INJECTED))?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Driver config with short waits so tests finish quickly.
pub fn fast_config() -> DriverConfig {
    DriverConfig {
        receive_timeout_ms: 20,
        poll_interval_ms: 1,
        ..DriverConfig::default()
    }
}

/// Generous bound for waiting on the processing thread.
pub const WAIT: Duration = Duration::from_secs(2);
