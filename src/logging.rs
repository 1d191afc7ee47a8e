//! RT-safe logging for DigitalCaliper.
//!
//! # Architecture
//!
//! ```text
//! ISR / task             LogStream            drain task
//! ──────────             ─────────            ──────────
//!
//! rt_log!() ──────────▶ [L0][L1][L2] ──────▶ UART / stdout
//! format to stack         short critical       blocking ok
//! never blocks            section copy
//! ```
//!
//! # Rules
//!
//! - Interrupt and tick paths never call blocking log functions
//! - Never log while holding a caliper or registry lock
//! - Log messages may be dropped if the ring is full (counted)

use crate::lock::IsrLock;

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 120;

/// Log buffer size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 64;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// A single log entry.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct LogEntry {
    /// Timestamp in microseconds.
    pub timestamp_us: i64,
    /// Log level.
    pub level: LogLevel,
    /// Message length.
    pub len: u8,
    /// Message bytes (not null-terminated).
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    const EMPTY: Self = Self {
        timestamp_us: 0,
        level: LogLevel::Info,
        len: 0,
        msg: [0; MAX_MSG_LEN],
    };

    /// Message text, cut back to the last whole character.
    ///
    /// Truncation in `push` can split a multi-byte character at the end.
    pub fn text(&self) -> &str {
        let bytes = &self.msg[..self.len as usize];
        match core::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

struct LogRing<const N: usize> {
    entries: [LogEntry; N],
    head: usize,
    len: usize,
}

/// Bounded log ring: many producers, one drain.
///
/// - Producers from ISR or task context; push copies under a short critical section
/// - Push never blocks (drops message if full)
/// - Drain runs in a separate task at leisure
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    ring: IsrLock<LogRing<N>>,
    dropped: core::sync::atomic::AtomicU32,
}

impl<const N: usize> LogStream<N> {
    /// Create a new empty log stream.
    pub const fn new() -> Self {
        assert!(N > 0, "Log buffer size must be non-zero");

        Self {
            ring: IsrLock::new(LogRing {
                entries: [LogEntry::EMPTY; N],
                head: 0,
                len: 0,
            }),
            dropped: core::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Push a log entry (ISR-safe, never blocks).
    ///
    /// Returns `true` if message was queued, `false` if dropped (ring full).
    #[inline]
    pub fn push(&self, timestamp_us: i64, level: LogLevel, msg: &[u8]) -> bool {
        let len = msg.len().min(MAX_MSG_LEN);
        let queued = self.ring.lock(|ring| {
            if ring.len == N {
                return false;
            }
            let entry = &mut ring.entries[(ring.head + ring.len) % N];
            entry.timestamp_us = timestamp_us;
            entry.level = level;
            entry.len = len as u8;
            entry.msg[..len].copy_from_slice(&msg[..len]);
            ring.len += 1;
            true
        });
        if !queued {
            self.dropped.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        }
        queued
    }

    /// Drain next log entry (for the output task).
    ///
    /// Returns `None` if no entries available.
    #[inline]
    pub fn drain(&self) -> Option<LogEntry> {
        self.ring.lock(|ring| {
            if ring.len == 0 {
                return None;
            }
            let entry = ring.entries[ring.head];
            ring.head = (ring.head + 1) % N;
            ring.len -= 1;
            Some(entry)
        })
    }

    /// Get count of dropped messages.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(core::sync::atomic::Ordering::Relaxed)
    }

    /// Reset dropped counter (e.g., after reporting).
    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, core::sync::atomic::Ordering::Relaxed);
    }

    /// Check if there are entries to drain.
    #[inline]
    pub fn has_entries(&self) -> bool {
        self.pending() != 0
    }

    /// Get number of entries waiting to be drained.
    #[inline]
    pub fn pending(&self) -> usize {
        self.ring.lock(|ring| ring.len)
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a message into a buffer.
///
/// Returns the number of bytes written; output past the end is cut.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// `fmt::Write` into a fixed byte slice, truncating on overflow.
pub(crate) struct BufWriter<'a> {
    pub(crate) buf: &'a mut [u8],
    pub(crate) pos: usize,
}

impl core::fmt::Write for BufWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len() - self.pos;
        let to_write = bytes.len().min(remaining);
        self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
        self.pos += to_write;
        Ok(())
    }
}

/// RT-safe log macro.
///
/// Formats on the stack, then pushes; safe in ISR context.
///
/// # Example
///
/// ```ignore
/// rt_log!(LogLevel::Info, TASK_LOG_STREAM, now_us, "caliper {} added", name);
/// ```
#[macro_export]
macro_rules! rt_log {
    ($level:expr, $stream:expr, $timestamp:expr, $($arg:tt)*) => {{
        let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
        let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
        $stream.push($timestamp, $level, &buf[..len]);
    }};
}

/// RT-safe info log.
#[macro_export]
macro_rules! rt_info {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Info, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe warning log.
#[macro_export]
macro_rules! rt_warn {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Warn, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe error log.
#[macro_export]
macro_rules! rt_error {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Error, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe debug log.
#[macro_export]
macro_rules! rt_debug {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Debug, $stream, $timestamp, $($arg)*)
    };
}

/// RT-safe trace log (maximum verbosity).
#[macro_export]
macro_rules! rt_trace {
    ($stream:expr, $timestamp:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Trace, $stream, $timestamp, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_stream_basic() {
        let stream = LogStream::<16>::new();

        assert!(stream.push(1000, LogLevel::Info, b"test message"));
        assert!(stream.has_entries());
        assert_eq!(stream.pending(), 1);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.timestamp_us, 1000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.text(), "test message");

        assert!(!stream.has_entries());
    }

    #[test]
    fn test_log_stream_full() {
        let stream = LogStream::<4>::new();

        assert!(stream.push(1, LogLevel::Info, b"1"));
        assert!(stream.push(2, LogLevel::Info, b"2"));
        assert!(stream.push(3, LogLevel::Info, b"3"));
        assert!(stream.push(4, LogLevel::Info, b"4"));

        // Should drop
        assert!(!stream.push(5, LogLevel::Info, b"5"));
        assert_eq!(stream.dropped(), 1);

        // Drain one, should be able to push again
        assert_eq!(stream.drain().unwrap().timestamp_us, 1);
        assert!(stream.push(6, LogLevel::Info, b"6"));

        let order: std::vec::Vec<i64> = core::iter::from_fn(|| stream.drain()).map(|e| e.timestamp_us).collect();
        assert_eq!(order, [2, 3, 4, 6]);
    }

    #[test]
    fn test_long_message_truncated() {
        let stream = LogStream::<4>::new();
        let long = [b'x'; 200];
        stream.push(0, LogLevel::Warn, &long);
        assert_eq!(stream.drain().unwrap().len as usize, MAX_MSG_LEN);
    }

    #[test]
    fn test_format_to_buffer() {
        let mut buf = [0u8; 32];
        let len = format_to_buffer(&mut buf, format_args!("Hello {}", 42));
        assert_eq!(&buf[..len], b"Hello 42");

        let mut small = [0u8; 4];
        let len = format_to_buffer(&mut small, format_args!("Hello {}", 42));
        assert_eq!(&small[..len], b"Hell");
    }

    #[test]
    fn test_rt_macros_push() {
        let stream = LogStream::<8>::new();
        crate::rt_warn!(stream, 77, "caliper {} lost power", "x");
        let entry = stream.drain().unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.text(), "caliper x lost power");
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_multiple_producers() {
        use std::sync::Arc;
        use std::thread;

        let stream = Arc::new(LogStream::<64>::new());
        let mut handles = vec![];

        for i in 0..4 {
            let stream = Arc::clone(&stream);
            handles.push(thread::spawn(move || {
                for j in 0..10 {
                    let msg = std::format!("Thread {} msg {}", i, j);
                    stream.push(j as i64, LogLevel::Info, msg.as_bytes());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while stream.drain().is_some() {
            count += 1;
        }
        assert_eq!(count, 40, "All messages should be present");
    }

    #[test]
    fn test_truncation_keeps_whole_characters() {
        let stream = LogStream::<2>::new();
        let mut msg = std::string::String::new();
        for _ in 0..MAX_MSG_LEN - 1 {
            msg.push('a');
        }
        // Two-byte character straddles the length limit
        msg.push_str("\u{e9} tail");
        crate::rt_info!(stream, 0, "{}", msg);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.text().len(), MAX_MSG_LEN - 1);
        assert!(entry.text().bytes().all(|b| b == b'a'));
    }
}
