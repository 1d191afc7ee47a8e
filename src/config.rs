//! Module: config
//!
//! Purpose: Driver-wide timing/task parameters and per-caliper setup.
//!
//! Architecture:
//! - `DriverConfig`: fixed for the lifetime of an initialized driver
//! - `CaliperConfig`: fixed for the lifetime of one instance
//! - Capacities are compile-time constants (static storage, no growth)

use alloc::boxed::Box;
use core::ffi::CStr;

use crate::caliper::Reading;
use crate::error::CaliperError;
use crate::registry::CaliperId;

/// Pending notifications the handoff queue can hold.
pub const QUEUE_CAPACITY: usize = 5;

/// Calipers a driver can track at once.
pub const MAX_CALIPERS: usize = 16;

/// Delivery callback, invoked from the processing task with no lock held.
pub type CaliperCallback = Box<dyn Fn(CaliperId, &Reading) + Send + Sync + 'static>;

/// Driver timing and task parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Inactive edge after this much silence discards a partial frame (µs).
    pub resync_gap_us: i64,
    /// Silence after which a caliper is reported as powered off (µs).
    pub power_loss_us: i64,
    /// Period of the idle-scan tick (µs).
    pub tick_period_us: u64,
    /// Longest the processing task waits for a notification before
    /// re-checking the stop flag (ms).
    pub receive_timeout_ms: u32,
    /// Sleep between queue checks while the processing task is idle (ms).
    pub poll_interval_ms: u32,
    /// Processing task parameters.
    pub task: TaskSpec,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            resync_gap_us: 1_000,
            power_loss_us: 200_000,
            tick_period_us: 10_000,
            receive_timeout_ms: 100,
            poll_interval_ms: 10,
            task: TaskSpec::default(),
        }
    }
}

impl DriverConfig {
    /// Check the parameters can work together.
    ///
    /// The tick must run at least twice per power-loss window so that
    /// detection latency stays bounded.
    pub fn validate(&self) -> Result<(), CaliperError> {
        if self.resync_gap_us <= 0
            || self.power_loss_us <= 0
            || self.tick_period_us == 0
            || self.receive_timeout_ms == 0
            || self.poll_interval_ms == 0
            || self.task.stack_size == 0
        {
            return Err(CaliperError::InvalidConfig);
        }
        if self.tick_period_us.saturating_mul(2) > self.power_loss_us as u64 {
            return Err(CaliperError::InvalidConfig);
        }
        Ok(())
    }
}

/// Execution unit for the processing loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: &'static CStr,
    pub stack_size: usize,
    pub priority: u8,
}

impl Default for TaskSpec {
    fn default() -> Self {
        Self {
            name: c"caliper_task",
            stack_size: 4096,
            priority: 2,
        }
    }
}

/// Per-caliper configuration.
///
/// # Example
///
/// ```ignore
/// let cfg = CaliperConfig::new("x-axis", 18, 19)
///     .inverted()
///     .with_callback(|id, reading| { /* ... */ });
/// ```
pub struct CaliperConfig {
    /// Label reported with every reading.
    pub name: &'static str,
    pub clock_pin: i32,
    pub data_pin: i32,
    /// Complement both line levels before interpretation.
    pub invert: bool,
    /// Asynchronous delivery; `None` means poll-only.
    pub callback: Option<CaliperCallback>,
}

impl CaliperConfig {
    pub fn new(name: &'static str, clock_pin: i32, data_pin: i32) -> Self {
        Self {
            name,
            clock_pin,
            data_pin,
            invert: false,
            callback: None,
        }
    }

    /// Lines are driven through an inverting level shifter.
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(CaliperId, &Reading) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl core::fmt::Debug for CaliperConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CaliperConfig")
            .field("name", &self.name)
            .field("clock_pin", &self.clock_pin)
            .field("data_pin", &self.data_pin)
            .field("invert", &self.invert)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
