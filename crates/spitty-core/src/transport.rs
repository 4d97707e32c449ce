//! Transport trait and transfer descriptor

use crate::error::Result;

/// A single full-duplex SPI exchange
///
/// Designed to avoid ownership of the buffers: the descriptor only
/// borrows them for the duration of one [`Transport::transact`] call.
#[derive(Debug)]
pub struct Transfer<'a> {
    /// Bytes clocked out
    pub tx_buf: &'a [u8],
    /// Bytes clocked in; same length as `tx_buf`
    pub rx_buf: &'a mut [u8],
    /// Clock rate for this transfer
    pub speed_hz: u32,
    /// Delay after the transfer, in microseconds
    pub delay_us: u16,
}

impl<'a> Transfer<'a> {
    /// Number of bytes exchanged
    pub fn len(&self) -> usize {
        self.tx_buf.len()
    }

    /// Whether the transfer carries no bytes
    pub fn is_empty(&self) -> bool {
        self.tx_buf.is_empty()
    }
}

/// Physical link to the peer
///
/// Implementations block until the exchange completes or fails. They hold
/// no state beyond the link handle; serialization is the bridge's job.
pub trait Transport: Send {
    /// Perform one exchange, filling `xfer.rx_buf`
    fn transact(&mut self, xfer: &mut Transfer<'_>) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transact(&mut self, xfer: &mut Transfer<'_>) -> Result<()> {
        (**self).transact(xfer)
    }
}
