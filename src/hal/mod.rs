//! Hardware Abstraction Layer for DigitalCaliper.
//!
//! Thin wrappers around ESP-IDF peripherals.
//! Business logic stays in core modules, HAL is just I/O.

#[cfg(target_os = "espidf")]
pub mod esp;

#[cfg(target_os = "espidf")]
pub use esp::EspPlatform;
