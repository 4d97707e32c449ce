//! Transfer builder and bridge mutex domain
//!
//! Every exchange on the link goes through [`Bridge::execute`]. The
//! bridge mutex owns the transport handle: it is taken before the handle
//! is touched and held until the response has been handed to the line, so
//! writes and polls never interleave on the wire and teardown cannot pull
//! the handle out from under a transfer.

use crate::error::{Error, Result};
use crate::feeder;
use crate::line::LineBindings;
use crate::protocol::{enquiry_frame, Direction, DELAY_US, MSG_LEN};
use crate::transport::{Transfer, Transport};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Outcome of a transfer that was attempted
///
/// A failing exchange is not an `Err`: the call still reports how many
/// bytes it clocked, and the cause is carried alongside for callers that
/// care. [`Completion::len`] gives the plain best-effort count.
#[derive(Debug)]
pub enum Completion {
    /// The exchange completed
    Done(usize),
    /// The transport reported a failure; response bytes may be garbage
    Degraded {
        /// Bytes attempted
        len: usize,
        /// What the transport reported
        cause: Error,
    },
}

impl Completion {
    /// Bytes attempted, regardless of outcome
    pub fn len(&self) -> usize {
        match self {
            Completion::Done(len) | Completion::Degraded { len, .. } => *len,
        }
    }

    /// Whether nothing was sent
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the transport reported a failure
    pub fn is_degraded(&self) -> bool {
        matches!(self, Completion::Degraded { .. })
    }

    /// Turn a degraded completion into an error
    pub fn into_result(self) -> Result<usize> {
        match self {
            Completion::Done(len) => Ok(len),
            Completion::Degraded { cause, .. } => Err(cause),
        }
    }
}

/// Serialized access to one peer's transport
pub struct Bridge {
    minor: u32,
    enquiry: [u8; MSG_LEN],
    /// `None` once the device has been torn down
    transport: Mutex<Option<Box<dyn Transport>>>,
    lines: LineBindings,
}

impl Bridge {
    /// Create a bridge owning `transport`, delivering to the line bound at `minor`
    pub fn new(transport: Box<dyn Transport>, minor: u32, lines: LineBindings) -> Self {
        Self {
            minor,
            enquiry: enquiry_frame(),
            transport: Mutex::new(Some(transport)),
            lines,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Minor index this bridge delivers to
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Whether the transport handle is still held
    pub fn is_live(&self) -> bool {
        self.lock().is_some()
    }

    /// Run one transfer of `payload`
    ///
    /// An empty payload is a no-op returning `Done(0)`. Writes are capped at
    /// [`MSG_LEN`] bytes and their response is dropped; polls clock the
    /// whole payload and feed the response to the bound line.
    pub fn execute(&self, payload: &[u8], direction: Direction) -> Result<Completion> {
        if payload.is_empty() {
            return Ok(Completion::Done(0));
        }

        let mut guard = self.lock();
        let transport = guard.as_mut().ok_or(Error::Removed)?;

        let len = direction.transfer_len(payload.len());
        let mut rx_buf = alloc_rx_buf(len)?;

        let mut xfer = Transfer {
            tx_buf: &payload[..len],
            rx_buf: &mut rx_buf,
            speed_hz: direction.speed_hz(),
            delay_us: DELAY_US,
        };
        let result = transport.transact(&mut xfer);

        if let Err(e) = &result {
            log::debug!(
                "bridge: {:?} of {} bytes on minor {} failed: {}",
                direction,
                len,
                self.minor,
                e
            );
        }

        if !direction.discards_response() {
            if let Some(line) = self.lines.get(self.minor) {
                let n = feeder::forward(&rx_buf, line.as_ref());
                log::trace!("bridge: delivered {} bytes to minor {}", n, self.minor);
            }
        }

        Ok(match result {
            Ok(()) => Completion::Done(len),
            Err(cause) => Completion::Degraded { len, cause },
        })
    }

    /// Write user data to the peer
    pub fn write(&self, bytes: &[u8]) -> Result<Completion> {
        self.execute(bytes, Direction::Write)
    }

    /// Send the enquiry frame and forward whatever the peer answers
    pub fn poll(&self) -> Result<Completion> {
        self.execute(&self.enquiry, Direction::Poll)
    }

    /// Wait for any in-flight transfer to finish
    pub fn quiesce(&self) {
        drop(self.lock());
    }

    /// Take the transport out, after any in-flight transfer
    ///
    /// Later calls to [`Bridge::execute`] fail with [`Error::Removed`].
    pub fn drain(&self) -> Option<Box<dyn Transport>> {
        self.lock().take()
    }
}

fn alloc_rx_buf(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory { len })?;
    buf.resize(len, 0);
    Ok(buf)
}
