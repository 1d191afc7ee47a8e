//! Log output: drains the log streams into a text sink.
//!
//! Runs in task context only. On ESP-IDF the sink is a UART TX driver
//! (requires an external USB-UART adapter on the chosen pin); any
//! `core::fmt::Write` works, which is how the host tests read logs back.
//!
//! ```text
//! ISR_LOG_STREAM ──┐
//!                  ├──▶ drain_logs() ──▶ "[timestamp] LEVEL: message\n"
//! TASK_LOG_STREAM ─┘
//! ```

use core::fmt::Write;

use crate::log_globals::{ISR_LOG_STREAM, TASK_LOG_STREAM};
use crate::logging::{BufWriter, LogEntry, LogStream};

#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::gpio;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::peripheral::Peripheral;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::uart::{self, UartTxDriver};

/// UART configuration for logging.
pub struct UartLoggerConfig {
    pub baud_rate: u32,
}

impl Default for UartLoggerConfig {
    fn default() -> Self {
        Self { baud_rate: 115200 }
    }
}

/// Format log entry to string.
///
/// Format: `[timestamp_us] LEVEL: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    let mut writer = BufWriter { buf, pos: 0 };
    let _ = write!(
        writer,
        "[{:10}] {}: {}\n",
        entry.timestamp_us,
        entry.level.as_str(),
        entry.text()
    );
    writer.pos
}

/// Drain one stream into `out`. Returns the number of entries written.
pub fn drain_stream<const N: usize, W: Write>(stream: &LogStream<N>, out: &mut W) -> usize {
    let mut format_buf = [0u8; 192];
    let mut count = 0;

    while let Some(entry) = stream.drain() {
        let len = format_log_entry(&entry, &mut format_buf);
        // Formatted from valid UTF-8 pieces; a cut can only split the last char
        let text = match core::str::from_utf8(&format_buf[..len]) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&format_buf[..e.valid_up_to()]).unwrap_or(""),
        };
        let _ = out.write_str(text);
        count += 1;
    }

    count
}

/// Drain both global streams, interrupt side first, and report drops.
pub fn drain_logs<W: Write>(out: &mut W) -> usize {
    let mut count = drain_stream(&ISR_LOG_STREAM, out);
    count += drain_stream(&TASK_LOG_STREAM, out);

    let isr_dropped = ISR_LOG_STREAM.dropped();
    let task_dropped = TASK_LOG_STREAM.dropped();
    if isr_dropped > 0 || task_dropped > 0 {
        let _ = write!(out, "[WARN] Dropped: ISR={}, TASK={}\n", isr_dropped, task_dropped);
        ISR_LOG_STREAM.reset_dropped();
        TASK_LOG_STREAM.reset_dropped();
    }

    count
}

/// `fmt::Write` adapter over a UART TX driver.
#[cfg(target_os = "espidf")]
pub struct UartSink<'d>(pub UartTxDriver<'d>);

#[cfg(target_os = "espidf")]
impl Write for UartSink<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write(s.as_bytes()).map(|_| ()).map_err(|_| core::fmt::Error)
    }
}

/// Initialize a TX-only UART for logging output.
#[cfg(target_os = "espidf")]
pub fn init_uart_logger<'d>(
    uart: impl Peripheral<P = impl uart::Uart> + 'd,
    tx_pin: impl Peripheral<P = impl gpio::OutputPin> + 'd,
    config: &UartLoggerConfig,
) -> Result<UartSink<'d>, esp_idf_svc::sys::EspError> {
    let uart_config = uart::config::Config::default()
        .baudrate(esp_idf_svc::hal::units::Hertz(config.baud_rate));

    let driver = UartTxDriver::new(
        uart,
        tx_pin,
        Option::<gpio::AnyIOPin>::None, // CTS
        Option::<gpio::AnyIOPin>::None, // RTS
        &uart_config,
    )?;
    Ok(UartSink(driver))
}
