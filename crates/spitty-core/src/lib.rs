//! spitty-core - Core library for the SPI-to-tty bridge
//!
//! This crate bridges a byte-stream line (what client programs read and
//! write) to a fixed-frame SPI link with a microcontroller peer. Every
//! write becomes one SPI transfer; when the peer raises its interrupt line
//! the bridge sends an enquiry frame and forwards the answer to the line.
//!
//! # Architecture
//!
//! - [`transport::Transport`] - the physical link, one blocking exchange per call
//! - [`bridge::Bridge`] - builds transfers and serializes them behind one mutex
//! - [`feeder`] - filters poll responses onto the line
//! - [`line::LinePort`] - single-opener line sessions with flush-on-close
//! - [`poller::EnquiryPoller`] - worker thread turning interrupts into polls
//! - [`manager::DeviceManager`] - probe/remove and minor-index bookkeeping
//!
//! The hardware collaborators (`Transport`, `InterruptSource`,
//! `LineInterface`) are traits; Linux implementations live in the
//! `spitty-linux-spi` and `spitty-linux-gpio` crates.
//!
//! # Example
//!
//! ```ignore
//! use spitty_core::{BridgeConfig, BufferedLine, DeviceManager, NoInterrupt, Peer};
//! use std::sync::Arc;
//!
//! let mgr = DeviceManager::new(BridgeConfig::default())?;
//! let dev = mgr.probe(Peer::new("atmega32u4", Box::new(spi), Box::new(NoInterrupt)))?;
//!
//! let line = Arc::new(BufferedLine::new());
//! let handle = dev.open(line.clone())?;
//! handle.write(b"hello\n")?;
//! dev.poll()?;
//! println!("{:?}", line.take());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod buffer;
pub mod device;
pub mod error;
pub mod feeder;
pub mod irq;
pub mod line;
pub mod manager;
pub mod poller;
pub mod protocol;
pub mod transport;

pub use bridge::{Bridge, Completion};
pub use buffer::BufferedLine;
pub use device::{Device, DeviceState};
pub use error::{Error, Result};
pub use irq::{InterruptSource, IrqHandler, NoInterrupt};
pub use line::{LineBindings, LineHandle, LineInterface, LinePort};
pub use manager::{BridgeConfig, DeviceManager, Peer};
pub use protocol::Direction;
pub use transport::{Transfer, Transport};
