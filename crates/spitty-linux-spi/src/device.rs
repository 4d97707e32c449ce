//! Linux SPI device implementation
//!
//! This module provides the `LinuxSpi` struct that implements the bridge's
//! `Transport` trait using Linux's spidev interface. Each bridge transfer
//! maps to a single `spi_ioc_transfer`, carrying its own clock rate and
//! post-transfer delay, so writes and polls can run at different speeds
//! without reconfiguring the device.

use crate::error::{LinuxSpiError, Result};

use spitty_core::protocol::{SPEED_HZ_RX, SPEED_HZ_TX};
use spitty_core::transport::{Transfer, Transport};

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// SPI mode constants
pub mod mode {
    /// SPI mode 0: CPOL=0, CPHA=0
    pub const MODE_0: u8 = 0;
    /// SPI mode 1: CPOL=0, CPHA=1
    pub const MODE_1: u8 = 1;
    /// SPI mode 2: CPOL=1, CPHA=0
    pub const MODE_2: u8 = 2;
    /// SPI mode 3: CPOL=1, CPHA=1
    pub const MODE_3: u8 = 3;
}

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    pub const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of struct spi_ioc_transfer
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    ///
    /// `_IOW(SPI_IOC_MAGIC, 0, char[n * sizeof(struct spi_ioc_transfer)])`
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

/// Configuration for opening a Linux SPI device
#[derive(Debug, Clone)]
pub struct LinuxSpiConfig {
    /// Device path (e.g., "/dev/spidev0.0")
    pub device: String,
    /// SPI mode (0-3, default: 0)
    pub mode: u8,
}

impl Default for LinuxSpiConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            mode: mode::MODE_0,
        }
    }
}

impl LinuxSpiConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the SPI mode (0-3)
    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }
}

/// spidev-backed link to the peer
pub struct LinuxSpi {
    /// File handle for spidev device
    file: File,
    /// Maximum kernel buffer size
    max_kernel_buf_size: usize,
}

impl LinuxSpi {
    /// Open a Linux SPI device with the given configuration
    pub fn open(config: &LinuxSpiConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxSpiError::NoDevice);
        }
        if config.mode > mode::MODE_3 {
            return Err(LinuxSpiError::InvalidParameter(format!(
                "SPI mode {} (must be 0-3)",
                config.mode
            )));
        }

        log::debug!("linux_spi: Opening device {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;

        let fd = file.as_raw_fd();

        let mode = config.mode;
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxSpiError::SetModeFailed {
                mode,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        let bits: u8 = 8;
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxSpiError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        // Per-transfer speeds may not exceed the device maximum, so raise it
        // to the faster of the two rates.
        let speed = SPEED_HZ_TX.max(SPEED_HZ_RX);
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed).map_err(|e| {
                LinuxSpiError::SetSpeedFailed {
                    speed,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        let max_kernel_buf_size = get_max_kernel_buf_size();

        log::info!(
            "linux_spi: Opened {} (mode={}, max speed={} Hz, bufsiz={})",
            config.device,
            mode,
            speed,
            max_kernel_buf_size
        );

        Ok(Self {
            file,
            max_kernel_buf_size,
        })
    }

    /// Open a device with default settings
    pub fn open_device(device: &str) -> Result<Self> {
        Self::open(&LinuxSpiConfig::new(device))
    }

    /// Run one full-duplex SPI_IOC_MESSAGE(1)
    fn spi_transfer(&mut self, xfer: &mut Transfer<'_>) -> Result<()> {
        let len = xfer.len();
        if xfer.rx_buf.len() != len {
            return Err(LinuxSpiError::InvalidParameter(format!(
                "rx buffer of {} bytes for {} byte transfer",
                xfer.rx_buf.len(),
                len
            )));
        }
        if len > self.max_kernel_buf_size {
            return Err(LinuxSpiError::TransferTooLarge {
                len,
                max: self.max_kernel_buf_size,
            });
        }

        let transfer = SpiIocTransfer {
            tx_buf: xfer.tx_buf.as_ptr() as u64,
            rx_buf: xfer.rx_buf.as_mut_ptr() as u64,
            len: len as u32,
            speed_hz: xfer.speed_hz,
            delay_usecs: xfer.delay_us,
            bits_per_word: 8,
            ..Default::default()
        };

        let fd = self.file.as_raw_fd();
        let ret = unsafe {
            libc::ioctl(
                fd,
                ioctl::spi_ioc_message(1),
                &transfer as *const SpiIocTransfer,
            )
        };

        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }

        Ok(())
    }
}

impl Transport for LinuxSpi {
    fn transact(&mut self, xfer: &mut Transfer<'_>) -> spitty_core::Result<()> {
        self.spi_transfer(xfer).map_err(Into::into)
    }
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
fn get_max_kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                log::debug!("linux_spi: Using buffer size {} from sysfs", size);
                return size;
            }
        }
        log::warn!("linux_spi: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("linux_spi: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    log::debug!("linux_spi: Using page size {} as buffer size", page_size);
    page_size
}

/// Parse transport options from a list of key-value pairs
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxSpiConfig, String> {
    let mut config = LinuxSpiConfig::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "mode" => {
                let mode: u8 = value
                    .parse()
                    .map_err(|_| format!("Invalid mode value: {}", value))?;
                if mode > 3 {
                    return Err(format!("Invalid SPI mode: {} (must be 0-3)", mode));
                }
                config.mode = mode;
            }
            _ => {
                log::warn!("linux_spi: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        return Err("No device specified. Use dev=/dev/spidevX.Y".to_string());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_struct_size() {
        assert_eq!(
            std::mem::size_of::<SpiIocTransfer>(),
            ioctl::SPI_IOC_TRANSFER_SIZE
        );
    }

    #[test]
    fn test_spi_ioc_message_number() {
        // SPI_IOC_MESSAGE(1) == 0x40206b00
        assert_eq!(ioctl::spi_ioc_message(1), 0x4020_6b00);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("dev", "/dev/spidev1.0"), ("mode", "3")]).unwrap();
        assert_eq!(config.device, "/dev/spidev1.0");
        assert_eq!(config.mode, 3);
    }

    #[test]
    fn test_parse_options_requires_dev() {
        assert!(parse_options(&[("mode", "0")]).is_err());
    }

    #[test]
    fn test_parse_options_bad_mode() {
        assert!(parse_options(&[("dev", "/dev/spidev0.0"), ("mode", "4")]).is_err());
        assert!(parse_options(&[("dev", "/dev/spidev0.0"), ("mode", "x")]).is_err());
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            LinuxSpi::open(&LinuxSpiConfig::default()),
            Err(LinuxSpiError::NoDevice)
        ));
        assert!(matches!(
            LinuxSpi::open_device("/nonexistent/spidev9.9"),
            Err(LinuxSpiError::OpenFailed { .. })
        ));
    }
}
