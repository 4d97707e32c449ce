//! GPIO interrupt line implementation
//!
//! The peer signals "I have data" by driving a GPIO high. This module
//! requests that line through the GPIO character device with rising-edge
//! detection and runs a watcher thread that reports assertions to the
//! bridge's [`IrqHandler`].
//!
//! The bridge expects level-triggered, one-shot semantics: while the line
//! stays high the peer keeps asking to be polled. The watcher therefore
//! fires on every rising edge and again on every wake-up that finds the
//! line still active; the handler folds repeats into the pending poll.

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{EdgeDetection, Offset, Value};
use gpiocdev::request::{Config, Request};

use spitty_core::irq::{InterruptSource, IrqHandler};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default interval at which the watcher re-checks the line level
const DEFAULT_WATCH_PERIOD_MS: u64 = 50;

/// Consumer label shown by `gpioinfo`
const CONSUMER: &str = "spitty";

/// Configuration for the interrupt line
#[derive(Debug, Clone)]
pub struct LinuxGpioIrqConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Line offset on the chip
    pub line: Offset,
    /// Treat a low level as asserted
    pub active_low: bool,
    /// Level re-check interval
    pub watch_period: Duration,
}

impl Default for LinuxGpioIrqConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            line: 0,
            active_low: false,
            watch_period: Duration::from_millis(DEFAULT_WATCH_PERIOD_MS),
        }
    }
}

impl LinuxGpioIrqConfig {
    /// Create a new configuration for `line` on `device`
    pub fn new(device: impl Into<String>, line: Offset) -> Self {
        Self {
            device: device.into(),
            line,
            ..Default::default()
        }
    }

    /// Treat a low level as asserted
    pub fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    /// Set the level re-check interval
    pub fn with_watch_period(mut self, period: Duration) -> Self {
        self.watch_period = period;
        self
    }
}

/// GPIO line that signals pending peer data
pub struct LinuxGpioIrq {
    config: LinuxGpioIrqConfig,
    /// Held here while detached, moved into the watcher while attached
    request: Option<Request>,
    stop: Arc<AtomicBool>,
    watcher: Option<JoinHandle<Request>>,
}

impl LinuxGpioIrq {
    /// Request the interrupt line
    pub fn open(config: &LinuxGpioIrqConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }

        log::debug!(
            "linux_gpio: Requesting line {} on {}",
            config.line,
            config.device
        );

        let mut req_config = Config::default();
        req_config
            .with_line(config.line)
            .as_input()
            .with_edge_detection(EdgeDetection::RisingEdge);
        if config.active_low {
            req_config.as_active_low();
        }

        let request = Request::from_config(req_config)
            .on_chip(&config.device)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|e| LinuxGpioError::LineRequestFailed {
                path: config.device.clone(),
                line: config.line,
                source: e,
            })?;

        log::info!(
            "linux_gpio: Opened {} line {} (trigger: level {})",
            config.device,
            config.line,
            if config.active_low { "low" } else { "high" }
        );

        Ok(Self {
            config: config.clone(),
            request: Some(request),
            stop: Arc::new(AtomicBool::new(false)),
            watcher: None,
        })
    }

    /// Whether the line is currently asserted
    ///
    /// Only available while no handler is attached.
    pub fn is_asserted(&self) -> Result<bool> {
        let request = self
            .request
            .as_ref()
            .ok_or(LinuxGpioError::AlreadyAttached)?;
        let value = request
            .value(self.config.line)
            .map_err(LinuxGpioError::GetValueFailed)?;
        Ok(value == Value::Active)
    }

    fn start(&mut self, handler: IrqHandler) -> Result<()> {
        let request = self.request.take().ok_or(LinuxGpioError::AlreadyAttached)?;
        self.stop.store(false, Ordering::Release);

        let stop = Arc::clone(&self.stop);
        let line = self.config.line;
        let period = self.config.watch_period;
        let watcher = thread::Builder::new()
            .name(format!("spitty-gpio{}", line))
            .spawn(move || watch(request, line, period, &handler, &stop))
            .map_err(LinuxGpioError::SpawnFailed)?;

        self.watcher = Some(watcher);
        Ok(())
    }
}

fn watch(
    request: Request,
    line: Offset,
    period: Duration,
    handler: &IrqHandler,
    stop: &AtomicBool,
) -> Request {
    while !stop.load(Ordering::Acquire) {
        match request.value(line) {
            Ok(Value::Active) => {
                handler.fire();
            }
            Ok(Value::Inactive) => {}
            Err(e) => log::error!("linux_gpio: Failed to read line {}: {}", line, e),
        }

        match request.wait_edge_event(period) {
            Ok(true) => {
                // The event itself carries nothing we need; consume it so
                // the next wait blocks again.
                if let Err(e) = request.read_edge_event() {
                    log::error!("linux_gpio: Failed to read edge event: {}", e);
                }
                handler.fire();
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("linux_gpio: Waiting on line {} failed: {}", line, e);
                break;
            }
        }
    }
    log::debug!("linux_gpio: Watcher for line {} exiting", line);
    request
}

impl InterruptSource for LinuxGpioIrq {
    fn attach(&mut self, handler: IrqHandler) -> spitty_core::Result<()> {
        self.start(handler)?;
        log::debug!("linux_gpio: Watching line {}", self.config.line);
        Ok(())
    }

    fn detach(&mut self) {
        let Some(watcher) = self.watcher.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        match watcher.join() {
            Ok(request) => self.request = Some(request),
            Err(_) => log::error!("linux_gpio: Watcher thread panicked"),
        }
    }
}

impl Drop for LinuxGpioIrq {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Parse interrupt line options from a list of key-value pairs
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxGpioIrqConfig, String> {
    let mut config = LinuxGpioIrqConfig::default();
    let mut have_line = false;
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "gpiochip" => {
                gpiochip = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid gpiochip value: {}", value))?,
                );
            }
            "line" | "gpio" => {
                config.line = value
                    .parse()
                    .map_err(|_| format!("Invalid line value: {}", value))?;
                have_line = true;
            }
            "active_low" => {
                config.active_low = match *value {
                    "1" | "true" | "yes" => true,
                    "0" | "false" | "no" => false,
                    _ => return Err(format!("Invalid active_low value: {}", value)),
                };
            }
            "period" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| format!("Invalid period value: {}", value))?;
                if ms == 0 {
                    return Err("period must be at least 1 ms".to_string());
                }
                config.watch_period = Duration::from_millis(ms);
            }
            _ => {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        if let Some(n) = gpiochip {
            config.device = format!("/dev/gpiochip{}", n);
        } else {
            return Err("Either 'dev' or 'gpiochip' must be specified.\n\
                 e.g. linux_gpio:dev=/dev/gpiochip0,line=17"
                .to_string());
        }
    }

    if !have_line {
        return Err("Missing required 'line' option".to_string());
    }

    Ok(config)
}
