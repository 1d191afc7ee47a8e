//! RT logging tests: macros, truncation and the drain path.

use digital_caliper::log_drain::{drain_logs, drain_stream};
use digital_caliper::logging::{LogLevel, LogStream, MAX_MSG_LEN};
use digital_caliper::{rt_debug, rt_error, rt_info, rt_trace, rt_warn, ISR_LOG_STREAM, TASK_LOG_STREAM};

#[test]
fn test_macros_set_level() {
    let stream = LogStream::<8>::new();
    rt_error!(stream, 1, "e");
    rt_warn!(stream, 2, "w");
    rt_info!(stream, 3, "i {}", 42);
    rt_debug!(stream, 4, "d");
    rt_trace!(stream, 5, "t");

    let levels: Vec<LogLevel> = std::iter::from_fn(|| stream.drain()).map(|e| e.level).collect();
    assert_eq!(
        levels,
        [LogLevel::Error, LogLevel::Warn, LogLevel::Info, LogLevel::Debug, LogLevel::Trace]
    );
}

#[test]
fn test_long_message_is_truncated() {
    let stream = LogStream::<2>::new();
    let long = "x".repeat(MAX_MSG_LEN * 2);
    rt_info!(stream, 0, "{}", long);

    let entry = stream.drain().unwrap();
    assert_eq!(entry.text().len(), MAX_MSG_LEN);
}

#[test]
fn test_overflow_is_counted_not_blocking() {
    let stream = LogStream::<2>::new();
    for i in 0..5 {
        rt_info!(stream, i, "msg {}", i);
    }
    assert_eq!(stream.pending(), 2);
    assert_eq!(stream.dropped(), 3);

    let mut out = String::new();
    assert_eq!(drain_stream(&stream, &mut out), 2);
    // Oldest entries survive
    assert!(out.contains("msg 0"));
    assert!(out.contains("msg 1"));
    assert!(!out.contains("msg 4"));
}

#[test]
fn test_drain_logs_reports_both_streams() {
    // Only test in this binary touching the global streams
    rt_info!(ISR_LOG_STREAM, 10, "from isr");
    rt_warn!(TASK_LOG_STREAM, 20, "from task");

    let mut out = String::new();
    assert_eq!(drain_logs(&mut out), 2);
    assert!(out.contains("[        10] INFO: from isr\n"));
    assert!(out.contains("[        20] WARN: from task\n"));
    assert!(out.find("from isr").unwrap() < out.find("from task").unwrap());
    assert!(!out.contains("Dropped"));

    // Overflow the task stream and check the drop report
    for i in 0..200 {
        rt_debug!(TASK_LOG_STREAM, i, "spam");
    }
    let mut out = String::new();
    drain_logs(&mut out);
    assert!(out.contains("[WARN] Dropped: ISR=0, TASK="));
    assert_eq!(TASK_LOG_STREAM.dropped(), 0);
}
