//! Line feeder: moves poll responses onto the line
//!
//! Slot 0 of a poll response is the peer's echo of the first ENQ byte and
//! is never payload. NUL bytes are filler the peer clocks out when it has
//! nothing to say, so they are dropped. A consequence is that the peer
//! cannot send a literal NUL over this link.
//!
//! The slot-0 echo is an assumption about the peer firmware, not something
//! the peer advertises.

use crate::line::LineInterface;

/// Extract the payload bytes of a poll response
pub fn payload(rx_buf: &[u8]) -> Vec<u8> {
    rx_buf.iter().skip(1).copied().filter(|&b| b != 0).collect()
}

/// Forward the payload of `rx_buf` to `line`
///
/// Returns the number of bytes delivered.
pub fn forward(rx_buf: &[u8], line: &dyn LineInterface) -> usize {
    let bytes = payload(rx_buf);
    if !bytes.is_empty() {
        line.deliver_bytes(&bytes);
    }
    bytes.len()
}
