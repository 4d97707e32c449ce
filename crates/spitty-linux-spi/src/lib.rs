//! spitty-linux-spi - Linux spidev transport
//!
//! This crate provides the SPI link to the peer through the
//! `/dev/spidevX.Y` device interface.
//!
//! # Example
//!
//! ```no_run
//! use spitty_linux_spi::{LinuxSpi, LinuxSpiConfig};
//! use spitty_core::{Transfer, Transport};
//!
//! let config = LinuxSpiConfig::new("/dev/spidev0.0").with_mode(0);
//! let mut spi = LinuxSpi::open(&config)?;
//!
//! let tx = [0x05u8; 4];
//! let mut rx = [0u8; 4];
//! let mut xfer = Transfer {
//!     tx_buf: &tx,
//!     rx_buf: &mut rx,
//!     speed_hz: 9_600,
//!     delay_us: 25,
//! };
//! spi.transact(&mut xfer)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the spitty CLI
//!
//! ```bash
//! spitty run -t linux_spi:dev=/dev/spidev0.0 -i linux_gpio:gpiochip=0,line=17
//! spitty run -t linux_spi:dev=/dev/spidev0.0,mode=3 -i none --poll-interval-ms 200
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - The spidev buffer (`bufsiz` module parameter) must hold a whole frame

pub mod device;
pub mod error;

// Re-exports
pub use device::{mode, parse_options, LinuxSpi, LinuxSpiConfig};
pub use error::{LinuxSpiError, Result};

/// Open a Linux SPI device and return a boxed Transport
///
/// This is a convenience function for use in the CLI transport dispatch.
///
/// # Example Options
///
/// - `dev=/dev/spidev0.0` - Required: device path
/// - `mode=0` - Optional: SPI mode 0-3 (default: 0)
pub fn open_linux_spi(
    options: &[(&str, &str)],
) -> std::result::Result<Box<dyn spitty_core::Transport>, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let spi = LinuxSpi::open(&config)?;
    Ok(Box::new(spi))
}
