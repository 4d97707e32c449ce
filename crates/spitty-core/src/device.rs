//! Device instance

use crate::bridge::{Bridge, Completion};
use crate::error::Result;
use crate::irq::InterruptSource;
use crate::line::{LineHandle, LineInterface, LinePort};
use crate::poller::EnquiryPoller;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle state of a device instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// Not yet probed
    #[default]
    Uninitialized,
    /// Being set up; not reachable by line opens
    Probing,
    /// Serving writes and polls
    Active,
    /// Being torn down
    Removing,
    /// Torn down; every transfer fails with `Removed`
    Destroyed,
}

/// One managed peer
///
/// Owns the bridge (and through it the transport handle), the line port,
/// the poll worker and the interrupt source feeding it.
pub struct Device {
    minor: u32,
    name: String,
    model: String,
    bridge: Arc<Bridge>,
    port: Arc<LinePort>,
    state: Mutex<DeviceState>,
    irq: Mutex<Option<Box<dyn InterruptSource>>>,
    poller: Mutex<Option<EnquiryPoller>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Device {
    pub(crate) fn new(
        minor: u32,
        name: String,
        model: String,
        bridge: Arc<Bridge>,
        port: Arc<LinePort>,
    ) -> Self {
        Self {
            minor,
            name,
            model,
            bridge,
            port,
            state: Mutex::new(DeviceState::Probing),
            irq: Mutex::new(None),
            poller: Mutex::new(None),
        }
    }

    pub(crate) fn activate(&self, irq: Box<dyn InterruptSource>, poller: EnquiryPoller) {
        *lock(&self.irq) = Some(irq);
        *lock(&self.poller) = Some(poller);
        self.set_state(DeviceState::Active);
    }

    fn set_state(&self, state: DeviceState) {
        let mut cur = lock(&self.state);
        log::trace!("device {}: {:?} -> {:?}", self.name, *cur, state);
        *cur = state;
    }

    /// Minor index
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Endpoint name (`ttySPI<minor>`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Peer model string the device was probed with
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Current lifecycle state
    pub fn state(&self) -> DeviceState {
        *lock(&self.state)
    }

    /// The bridge serializing this device's transfers
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Open the line port
    pub fn open(&self, line: Arc<dyn LineInterface>) -> Result<LineHandle> {
        self.port.open(line)
    }

    /// Open the line port, waiting up to `timeout` for it to be released
    pub fn open_wait(&self, line: Arc<dyn LineInterface>, timeout: Duration) -> Result<LineHandle> {
        self.port.open_wait(line, timeout)
    }

    /// Whether a client holds the line port
    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Poll the peer once, outside of any interrupt
    pub fn poll(&self) -> Result<Completion> {
        self.bridge.poll()
    }

    /// Write to the peer without going through the line port
    pub fn write(&self, bytes: &[u8]) -> Result<Completion> {
        self.bridge.write(bytes)
    }

    /// Tear the device down
    ///
    /// Order matters: new opens are refused first, then interrupt
    /// delivery and the poll worker are stopped, and finally the bridge is
    /// drained, which waits for any transfer still holding the mutex.
    pub(crate) fn teardown(&self) {
        self.set_state(DeviceState::Removing);
        self.port.shut_down();

        if let Some(mut irq) = lock(&self.irq).take() {
            irq.detach();
            log::debug!("device {}: interrupt detached", self.name);
        }
        if let Some(mut poller) = lock(&self.poller).take() {
            poller.stop();
        }

        drop(self.bridge.drain());
        self.set_state(DeviceState::Destroyed);
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("minor", &self.minor)
            .field("name", &self.name)
            .field("model", &self.model)
            .field("state", &self.state())
            .finish()
    }
}
