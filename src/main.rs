//! DigitalCaliper demo firmware.
//!
//! Two calipers: X axis reports through a callback, Y axis is polled from
//! the main loop. Both paths log into the RT streams, which the main loop
//! drains to a UART.

#[cfg(target_os = "espidf")]
use digital_caliper::{
    log_drain::{drain_logs, init_uart_logger, UartLoggerConfig},
    rt_info, rt_warn, CaliperConfig, CaliperDriver, CaliperError, DriverConfig, EspPlatform,
    Platform, TASK_LOG_STREAM,
};

#[cfg(target_os = "espidf")]
const X_CLOCK_PIN: i32 = 18;
#[cfg(target_os = "espidf")]
const X_DATA_PIN: i32 = 19;
#[cfg(target_os = "espidf")]
const Y_CLOCK_PIN: i32 = 4;
#[cfg(target_os = "espidf")]
const Y_DATA_PIN: i32 = 5;

/// Main loop period.
#[cfg(target_os = "espidf")]
const POLL_PERIOD_MS: u32 = 500;

#[cfg(target_os = "espidf")]
fn main() -> Result<(), CaliperError> {
    use esp_idf_svc::hal::peripherals::Peripherals;

    esp_idf_svc::sys::link_patches();

    let peripherals = Peripherals::take()?;
    let mut log_out = init_uart_logger(
        peripherals.uart1,
        peripherals.pins.gpio17,
        &UartLoggerConfig::default(),
    )?;

    let driver = CaliperDriver::new(EspPlatform::new(), DriverConfig::default());
    driver.initialize()?;

    driver.add(
        CaliperConfig::new("x", X_CLOCK_PIN, X_DATA_PIN).with_callback(|id, reading| {
            // Callbacks run in the processing task, not in the ISR
            rt_info!(TASK_LOG_STREAM, unsafe { esp_idf_svc::sys::esp_timer_get_time() }, "{} {}", id, reading);
        }),
    )?;
    let y = driver.add(CaliperConfig::new("y", Y_CLOCK_PIN, Y_DATA_PIN))?;

    loop {
        let now = driver.platform().now_us();
        match driver.poll(y) {
            Ok(reading) => {
                rt_info!(TASK_LOG_STREAM, now, "{}", reading);
            }
            Err(e) => {
                rt_warn!(TASK_LOG_STREAM, now, "poll failed: {}", e);
            }
        }

        drain_logs(&mut log_out);
        driver.platform().delay_ms(POLL_PERIOD_MS);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    println!(
        "{}: this firmware requires an ESP-IDF target (e.g. --target xtensa-esp32s3-espidf)",
        env!("VERSION_STRING")
    );
}
