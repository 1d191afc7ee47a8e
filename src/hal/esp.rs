//! ESP-IDF platform: GPIO ISR service, GPTimer tick, FreeRTOS task.

use alloc::boxed::Box;
use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::task;
use esp_idf_svc::sys::{self, esp, EspError};

use crate::config::TaskSpec;
use crate::error::CaliperError;
use crate::platform::{IsrHook, Platform};

/// GPTimer counts at 1 MHz so alarm counts are microseconds.
const TIMER_RESOLUTION_HZ: u32 = 1_000_000;

/// Platform backed by ESP-IDF drivers.
///
/// The GPIO ISR service is installed without `ESP_INTR_FLAG_IRAM`: Rust
/// handlers live in flash, so edges are not serviced while the flash
/// cache is disabled.
pub struct EspPlatform {
    timer: AtomicPtr<sys::gptimer_t>,
    tick_hook: AtomicPtr<IsrHook>,
}

impl EspPlatform {
    pub const fn new() -> Self {
        Self {
            timer: AtomicPtr::new(ptr::null_mut()),
            tick_hook: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl Default for EspPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// GPTimer alarm callback: forwards to the registered hook.
unsafe extern "C" fn on_alarm(
    _timer: sys::gptimer_handle_t,
    _edata: *const sys::gptimer_alarm_event_data_t,
    user_ctx: *mut c_void,
) -> bool {
    // SAFETY: `user_ctx` is the boxed hook owned by `EspPlatform`, freed
    // only after the timer is deleted.
    unsafe { (*(user_ctx as *const IsrHook)).fire() };
    false // no higher-priority task woken
}

/// Runs in the IPC task of one core; only the round trip matters.
#[cfg(not(esp_idf_freertos_unicore))]
unsafe extern "C" fn ipc_barrier(_arg: *mut c_void) {}

/// Wait until no interrupt handler that started before this call is still
/// running on any core.
///
/// Handler tables are read by the dispatcher without a lock, so removing a
/// handler does not wait for a call already under way on the other core.
/// An IPC call runs in task context on the target core, which it can only
/// reach once every interrupt in progress there has returned.
fn sync_interrupts() {
    #[cfg(not(esp_idf_freertos_unicore))]
    for cpu in 0..sys::SOC_CPU_CORES_NUM {
        // SAFETY: `ipc_barrier` touches nothing; the call blocks until it ran
        unsafe {
            sys::esp_ipc_call_blocking(cpu, Some(ipc_barrier), ptr::null_mut());
        }
    }
    // Single core: the caller runs as a task, so no handler is mid-flight
}

/// FreeRTOS task entry: runs the boxed closure once, then deletes itself.
extern "C" fn task_entry(arg: *mut c_void) {
    // SAFETY: `arg` comes from `Box::into_raw` in `spawn` and is consumed once.
    let work = unsafe { Box::from_raw(arg as *mut Box<dyn FnOnce() + Send + 'static>) };
    work();
    // SAFETY: NULL deletes the calling task; nothing runs after this.
    unsafe { sys::vTaskDelete(ptr::null_mut()) };
}

impl Platform for EspPlatform {
    #[inline]
    fn now_us(&self) -> i64 {
        // SAFETY: esp_timer is started by the IDF before app_main
        unsafe { sys::esp_timer_get_time() }
    }

    fn delay_ms(&self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }

    #[inline]
    fn level(&self, pin: i32) -> bool {
        // SAFETY: ISR-safe register read
        unsafe { sys::gpio_get_level(pin) != 0 }
    }

    fn install_isr_service(&self) -> Result<(), CaliperError> {
        // SAFETY: plain FFI call
        let err = unsafe { sys::gpio_install_isr_service(0) };
        if err == sys::ESP_ERR_INVALID_STATE as sys::esp_err_t {
            // Already installed by someone else
            return Ok(());
        }
        esp!(err)?;
        Ok(())
    }

    fn configure_inputs(&self, clock_pin: i32, data_pin: i32) -> Result<(), CaliperError> {
        let config = sys::gpio_config_t {
            pin_bit_mask: (1u64 << clock_pin) | (1u64 << data_pin),
            mode: sys::gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: sys::gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: sys::gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: sys::gpio_int_type_t_GPIO_INTR_DISABLE,
            ..Default::default()
        };
        // SAFETY: config outlives the call
        esp!(unsafe { sys::gpio_config(&config) })?;
        Ok(())
    }

    unsafe fn arm_edge(&self, pin: i32, hook: IsrHook) -> Result<(), CaliperError> {
        // SAFETY: the caller keeps `hook.ctx` alive until `disarm_edge`
        unsafe {
            esp!(sys::gpio_set_intr_type(pin, sys::gpio_int_type_t_GPIO_INTR_ANYEDGE))?;
            esp!(sys::gpio_isr_handler_add(pin, Some(hook.func), hook.ctx))?;
        }
        Ok(())
    }

    fn disarm_edge(&self, pin: i32) {
        // SAFETY: removing an unregistered handler is a no-op error
        unsafe {
            sys::gpio_set_intr_type(pin, sys::gpio_int_type_t_GPIO_INTR_DISABLE);
            sys::gpio_isr_handler_remove(pin);
        }
        sync_interrupts();
    }

    unsafe fn start_tick(&self, period_us: u64, hook: IsrHook) -> Result<(), CaliperError> {
        let hook = Box::into_raw(Box::new(hook));
        let mut timer: sys::gptimer_handle_t = ptr::null_mut();

        let result = (|| -> Result<(), EspError> {
            let timer_config = sys::gptimer_config_t {
                clk_src: sys::soc_periph_gptimer_clk_src_t_GPTIMER_CLK_SRC_DEFAULT,
                direction: sys::gptimer_count_direction_t_GPTIMER_COUNT_UP,
                resolution_hz: TIMER_RESOLUTION_HZ,
                ..Default::default()
            };
            let mut alarm_config = sys::gptimer_alarm_config_t {
                reload_count: 0,
                alarm_count: period_us,
                ..Default::default()
            };
            alarm_config.flags.set_auto_reload_on_alarm(1);
            let callbacks = sys::gptimer_event_callbacks_t {
                on_alarm: Some(on_alarm),
            };

            // SAFETY: configs outlive the calls; `hook` stays allocated
            // until `stop_tick` has deleted the timer.
            unsafe {
                esp!(sys::gptimer_new_timer(&timer_config, &mut timer))?;
                esp!(sys::gptimer_set_alarm_action(timer, &alarm_config))?;
                esp!(sys::gptimer_register_event_callbacks(timer, &callbacks, hook as *mut c_void))?;
                esp!(sys::gptimer_enable(timer))?;
                esp!(sys::gptimer_start(timer))?;
            }
            Ok(())
        })();

        if let Err(e) = result {
            if !timer.is_null() {
                // SAFETY: handle created above; disable may fail if never enabled
                unsafe {
                    sys::gptimer_disable(timer);
                    sys::gptimer_del_timer(timer);
                }
            }
            // SAFETY: no timer references `hook` any more
            drop(unsafe { Box::from_raw(hook) });
            return Err(e.into());
        }

        self.timer.store(timer, Ordering::Release);
        self.tick_hook.store(hook, Ordering::Release);
        Ok(())
    }

    fn stop_tick(&self) {
        let timer = self.timer.swap(ptr::null_mut(), Ordering::AcqRel);
        if !timer.is_null() {
            // SAFETY: handle created in `start_tick`, released exactly once
            unsafe {
                sys::gptimer_stop(timer);
                sys::gptimer_disable(timer);
                sys::gptimer_del_timer(timer);
            }
            sync_interrupts();
        }
        let hook = self.tick_hook.swap(ptr::null_mut(), Ordering::AcqRel);
        if !hook.is_null() {
            // SAFETY: the timer that referenced it is deleted and its last
            // alarm callback has returned
            drop(unsafe { Box::from_raw(hook) });
        }
    }

    fn spawn(&self, task: &TaskSpec, work: Box<dyn FnOnce() + Send + 'static>) -> Result<(), CaliperError> {
        let arg = Box::into_raw(Box::new(work));
        // SAFETY: `task_entry` takes ownership of `arg`
        let created = unsafe {
            task::create(
                task_entry,
                task.name,
                task.stack_size,
                arg as *mut c_void,
                task.priority,
                None,
            )
        };
        if let Err(e) = created {
            // SAFETY: the task was not created, `arg` is still ours
            drop(unsafe { Box::from_raw(arg) });
            return Err(e.into());
        }
        Ok(())
    }
}
