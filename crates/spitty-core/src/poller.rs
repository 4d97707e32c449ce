//! Enquiry poller
//!
//! Interrupt assertions are turned into poll requests on a channel; a
//! dedicated worker thread performs the blocking enquiry transfer, so the
//! interrupt context never waits on the bridge mutex. With a poll
//! interval set, the worker also polls whenever the line stays quiet for
//! that long.

use crate::bridge::{Bridge, Completion};
use crate::error::{Error, Result};
use crate::irq::{IrqHandler, PollEvent};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll worker of one device
pub struct EnquiryPoller {
    tx: Sender<PollEvent>,
    pending: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl EnquiryPoller {
    /// Start the worker for `bridge`
    pub fn spawn(bridge: Arc<Bridge>, interval: Option<Duration>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let pending = Arc::new(AtomicBool::new(false));
        let worker_pending = Arc::clone(&pending);
        let name = format!("spitty-poll{}", bridge.minor());

        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || run(&bridge, &rx, &worker_pending, interval))
            .map_err(|e| Error::Registration(format!("cannot spawn poll worker: {}", e)))?;

        Ok(Self {
            tx,
            pending,
            worker: Some(worker),
        })
    }

    /// Handler to register with the interrupt source
    pub fn handler(&self) -> IrqHandler {
        IrqHandler::new(self.tx.clone(), Arc::clone(&self.pending))
    }

    /// Stop the worker and wait for it to exit
    ///
    /// A poll already in progress runs to completion first.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(PollEvent::Shutdown);
            if worker.join().is_err() {
                log::error!("poller: worker thread panicked");
            }
        }
    }
}

impl Drop for EnquiryPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    bridge: &Bridge,
    rx: &Receiver<PollEvent>,
    pending: &AtomicBool,
    interval: Option<Duration>,
) {
    log::debug!("poller: worker started for minor {}", bridge.minor());
    loop {
        let event = match interval {
            Some(interval) => match rx.recv_timeout(interval) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => PollEvent::Assert,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        if event == PollEvent::Shutdown {
            break;
        }

        // Re-arm before polling so an assertion during the transfer queues
        // another poll.
        pending.store(false, Ordering::Release);
        match bridge.poll() {
            Ok(Completion::Done(_)) => {}
            Ok(Completion::Degraded { cause, .. }) => {
                log::debug!("poller: enquiry on minor {}: {}", bridge.minor(), cause);
            }
            Err(Error::Removed) => break,
            Err(e) => log::warn!("poller: enquiry on minor {} failed: {}", bridge.minor(), e),
        }
    }
    log::debug!("poller: worker for minor {} exiting", bridge.minor());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LineBindings;
    use crate::transport::{Transfer, Transport};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct Counting(Arc<AtomicUsize>);

    impl Transport for Counting {
        fn transact(&mut self, _xfer: &mut Transfer<'_>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wait_for(count: &AtomicUsize, n: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_fire_triggers_poll() {
        let count = Arc::new(AtomicUsize::new(0));
        let bridge = Arc::new(Bridge::new(
            Box::new(Counting(count.clone())),
            0,
            LineBindings::new(),
        ));
        let mut poller = EnquiryPoller::spawn(bridge, None).unwrap();
        assert!(poller.handler().fire());
        assert!(wait_for(&count, 1));
        poller.stop();
    }

    #[test]
    fn test_interval_polls_without_interrupt() {
        let count = Arc::new(AtomicUsize::new(0));
        let bridge = Arc::new(Bridge::new(
            Box::new(Counting(count.clone())),
            0,
            LineBindings::new(),
        ));
        let poller = EnquiryPoller::spawn(bridge, Some(Duration::from_millis(5))).unwrap();
        assert!(wait_for(&count, 3));
        drop(poller);
    }

    #[test]
    fn test_worker_exits_when_drained() {
        let count = Arc::new(AtomicUsize::new(0));
        let bridge = Arc::new(Bridge::new(
            Box::new(Counting(count.clone())),
            0,
            LineBindings::new(),
        ));
        let mut poller = EnquiryPoller::spawn(Arc::clone(&bridge), None).unwrap();
        bridge.drain();
        poller.handler().fire();
        poller.stop();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
