//! Global log stream instances.
//!
//! Interrupt-side and task-side logs are kept apart so a burst from one
//! cannot starve the other.

use crate::logging::LogStream;

/// Log stream for interrupt-equivalent contexts (edge and tick handlers).
///
/// Never pushed to while a caliper or registry lock is held.
pub static ISR_LOG_STREAM: LogStream = LogStream::new();

/// Log stream for task context (processing loop and driver API callers).
pub static TASK_LOG_STREAM: LogStream = LogStream::new();
