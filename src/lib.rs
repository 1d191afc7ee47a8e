//! # DigitalCaliper
//!
//! Interrupt-driven driver for cheap digital calipers that stream a 24-bit
//! synchronous frame on a clock/data line pair.
//!
//! ## Architecture
//!
//! Three execution contexts share per-instance state under a short
//! interrupt-safe lock:
//! - Clock edge ISR samples one bit and publishes complete frames
//! - Periodic tick marks silent devices as powered off
//! - Processing task decodes and invokes user callbacks
//!
//! Hardware sits behind [`Platform`]; everything else runs and tests on host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod caliper;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod hal;
pub mod lock;
pub mod log_drain;
pub mod log_globals;
pub mod logging;
pub mod platform;
pub mod queue;
pub mod registry;
pub mod sampler;

pub use caliper::Reading;
pub use config::{CaliperCallback, CaliperConfig, DriverConfig, TaskSpec};
pub use driver::CaliperDriver;
pub use error::CaliperError;
pub use frame::{decode, Measurement, RawFrame, Unit};
pub use log_globals::{ISR_LOG_STREAM, TASK_LOG_STREAM};
pub use platform::{IsrHook, Platform};
pub use registry::CaliperId;
pub use sampler::CaliperStats;

#[cfg(target_os = "espidf")]
pub use hal::EspPlatform;
