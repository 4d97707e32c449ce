//! spitty-linux-gpio - GPIO interrupt line support
//!
//! The peer raises a GPIO when it has data for the host. This crate
//! watches that line through the Linux GPIO character device (gpiocdev)
//! and turns assertions into enquiry polls.
//!
//! # Example
//!
//! ```no_run
//! use spitty_linux_gpio::{LinuxGpioIrq, LinuxGpioIrqConfig};
//!
//! let config = LinuxGpioIrqConfig::new("/dev/gpiochip0", 17);
//! let irq = LinuxGpioIrq::open(&config)?;
//! println!("asserted: {}", irq.is_asserted()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the spitty CLI
//!
//! ```bash
//! spitty run -t linux_spi:dev=/dev/spidev0.0 -i linux_gpio:dev=/dev/gpiochip0,line=17
//! spitty run -t linux_spi:dev=/dev/spidev0.0 -i linux_gpio:gpiochip=0,line=17,active_low=1
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel 5.10+ with GPIO character device support
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod device;
pub mod error;

// Re-exports
pub use device::{parse_options, LinuxGpioIrq, LinuxGpioIrqConfig};
pub use error::{LinuxGpioError, Result};

/// Open a GPIO interrupt line and return a boxed InterruptSource
///
/// # Example Options
///
/// - `dev=/dev/gpiochip0` - GPIO chip device path (or use gpiochip=N)
/// - `gpiochip=0` - GPIO chip number (alternative to dev)
/// - `line=17` - line offset of the peer's signal (required)
/// - `active_low=1` - treat low as asserted (optional)
/// - `period=50` - level re-check interval in ms (optional)
pub fn open_linux_gpio_irq(
    options: &[(&str, &str)],
) -> std::result::Result<Box<dyn spitty_core::InterruptSource>, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let irq = LinuxGpioIrq::open(&config)?;
    Ok(Box::new(irq))
}
