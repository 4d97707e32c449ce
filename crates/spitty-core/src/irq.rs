//! Interrupt boundary
//!
//! The peer raises a signal line when it has data. An [`InterruptSource`]
//! watches that line and calls [`IrqHandler::fire`] from its own context.
//! Firing never blocks: it only queues a poll request for the device's
//! poll worker, and while one request is pending further assertions fold
//! into it, as a one-shot interrupt stays masked until its handler ran.

use crate::error::Result;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Messages consumed by the poll worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollEvent {
    /// The peer asserted its signal line
    Assert,
    /// Stop the worker
    Shutdown,
}

/// Callback handed to an [`InterruptSource`]
#[derive(Debug, Clone)]
pub struct IrqHandler {
    tx: Sender<PollEvent>,
    pending: Arc<AtomicBool>,
}

impl IrqHandler {
    pub(crate) fn new(tx: Sender<PollEvent>, pending: Arc<AtomicBool>) -> Self {
        Self { tx, pending }
    }

    /// Signal that the peer has data
    ///
    /// Returns `true` if a new poll was queued, `false` if one was already
    /// pending or the worker is gone.
    pub fn fire(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.tx.send(PollEvent::Assert).is_err() {
            self.pending.store(false, Ordering::Release);
            return false;
        }
        true
    }
}

/// Something that reports "peer has data"
pub trait InterruptSource: Send {
    /// Start delivering assertions to `handler`
    fn attach(&mut self, handler: IrqHandler) -> Result<()>;

    /// Stop delivering assertions; must not return while a call to
    /// [`IrqHandler::fire`] from this source is still running
    fn detach(&mut self);
}

impl<T: InterruptSource + ?Sized> InterruptSource for Box<T> {
    fn attach(&mut self, handler: IrqHandler) -> Result<()> {
        (**self).attach(handler)
    }

    fn detach(&mut self) {
        (**self).detach()
    }
}

/// Interrupt source for peers without a signal line
///
/// Polling then relies on the periodic enquiry timer alone.
#[derive(Debug, Default)]
pub struct NoInterrupt;

impl InterruptSource for NoInterrupt {
    fn attach(&mut self, _handler: IrqHandler) -> Result<()> {
        log::debug!("irq: no interrupt line, relying on periodic enquiry");
        Ok(())
    }

    fn detach(&mut self) {}
}
