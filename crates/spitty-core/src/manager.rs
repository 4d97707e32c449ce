//! Device lifecycle manager
//!
//! Tracks live instances in a minor-indexed slot table sized to the
//! configured capacity. A slot is `Reserved` while its device is being
//! probed or torn down, so its minor is neither reachable by opens nor
//! handed to another probe until the transition finishes.

use crate::bridge::Bridge;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::irq::InterruptSource;
use crate::line::{LineBindings, LineHandle, LineInterface, LinePort};
use crate::poller::EnquiryPoller;
use crate::protocol::{endpoint_name, DRIVER_NAME, SUPPORTED_MODELS};
use crate::transport::Transport;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default number of concurrent peers
pub const DEFAULT_CAPACITY: usize = 1;

/// Configuration of the bridge driver
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum number of live devices
    pub capacity: usize,
    /// Poll this often when no interrupt arrives; `None` disables the timer
    pub poll_interval: Option<Duration>,
    /// Peer models accepted at probe
    pub models: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            poll_interval: None,
            models: SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the periodic enquiry interval
    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Whether `model` is in the id table
    pub fn supports(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// A peer reported by the bus
pub struct Peer {
    /// Device-model string used for matching
    pub model: String,
    /// Link to the peer
    pub transport: Box<dyn Transport>,
    /// The peer's "has data" line
    pub irq: Box<dyn InterruptSource>,
}

impl Peer {
    /// Describe a peer
    pub fn new(
        model: impl Into<String>,
        transport: Box<dyn Transport>,
        irq: Box<dyn InterruptSource>,
    ) -> Self {
        Self {
            model: model.into(),
            transport,
            irq,
        }
    }
}

enum Slot {
    Free,
    Reserved,
    Live(Arc<Device>),
}

/// Owner of all device instances
pub struct DeviceManager {
    config: BridgeConfig,
    slots: Mutex<Vec<Slot>>,
    lines: LineBindings,
}

impl DeviceManager {
    /// Create a manager
    pub fn new(config: BridgeConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(Error::InvalidParameter("capacity must be at least 1".into()));
        }
        let slots = (0..config.capacity).map(|_| Slot::Free).collect();
        log::debug!(
            "{}: driver ready, capacity {}",
            DRIVER_NAME,
            config.capacity
        );
        Ok(Self {
            config,
            slots: Mutex::new(slots),
            lines: LineBindings::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration in use
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Maximum number of live devices
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of live devices
    pub fn count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|s| matches!(s, Slot::Live(_)))
            .count()
    }

    /// Live devices, by minor
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.lock()
            .iter()
            .filter_map(|s| match s {
                Slot::Live(dev) => Some(Arc::clone(dev)),
                _ => None,
            })
            .collect()
    }

    /// Live device at `minor`
    pub fn get(&self, minor: u32) -> Result<Arc<Device>> {
        match self.lock().get(minor as usize) {
            Some(Slot::Live(dev)) => Ok(Arc::clone(dev)),
            _ => Err(Error::NoSuchDevice(minor)),
        }
    }

    /// Open the line of the device at `minor`
    pub fn open(&self, minor: u32, line: Arc<dyn LineInterface>) -> Result<LineHandle> {
        self.get(minor)?.open(line)
    }

    /// Bring up a device for `peer`
    ///
    /// Fails with [`Error::Busy`] when every slot is taken. Any failure
    /// after the slot is reserved releases it again; the device never
    /// becomes reachable half set up.
    pub fn probe(&self, peer: Peer) -> Result<Arc<Device>> {
        if !self.config.supports(&peer.model) {
            log::warn!("{}: no match for peer '{}'", DRIVER_NAME, peer.model);
            return Err(Error::UnsupportedPeer(peer.model));
        }

        let minor = {
            let mut slots = self.lock();
            let Some(idx) = slots.iter().position(|s| matches!(s, Slot::Free)) else {
                log::warn!(
                    "{}: rejecting '{}', all {} slots in use",
                    DRIVER_NAME,
                    peer.model,
                    self.config.capacity
                );
                return Err(Error::Busy("device capacity reached"));
            };
            slots[idx] = Slot::Reserved;
            idx as u32
        };

        log::info!("{}: probing '{}' at minor {}", DRIVER_NAME, peer.model, minor);

        match self.bring_up(minor, peer) {
            Ok(dev) => {
                self.lock()[minor as usize] = Slot::Live(Arc::clone(&dev));
                log::info!("{}: registered {}", DRIVER_NAME, dev.name());
                Ok(dev)
            }
            Err(e) => {
                self.lock()[minor as usize] = Slot::Free;
                log::warn!("{}: probe at minor {} failed: {}", DRIVER_NAME, minor, e);
                Err(e)
            }
        }
    }

    fn bring_up(&self, minor: u32, peer: Peer) -> Result<Arc<Device>> {
        let Peer {
            model,
            transport,
            mut irq,
        } = peer;

        let bridge = Arc::new(Bridge::new(transport, minor, self.lines.clone()));
        let port = Arc::new(LinePort::new(minor, Arc::clone(&bridge), self.lines.clone()));
        let dev = Arc::new(Device::new(
            minor,
            endpoint_name(minor),
            model,
            Arc::clone(&bridge),
            port,
        ));

        let poller = EnquiryPoller::spawn(bridge, self.config.poll_interval)?;
        irq.attach(poller.handler()).map_err(|e| match e {
            Error::Registration(_) => e,
            other => Error::Registration(other.to_string()),
        })?;
        log::debug!("device {}: interrupt attached", dev.name());

        dev.activate(irq, poller);
        Ok(dev)
    }

    /// Tear down the device at `minor`
    ///
    /// Waits for any in-flight transfer before releasing the transport.
    pub fn remove(&self, minor: u32) -> Result<()> {
        let dev = {
            let mut slots = self.lock();
            let slot = slots
                .get_mut(minor as usize)
                .ok_or(Error::NoSuchDevice(minor))?;
            match std::mem::replace(slot, Slot::Reserved) {
                Slot::Live(dev) => dev,
                other => {
                    *slot = other;
                    return Err(Error::NoSuchDevice(minor));
                }
            }
        };

        log::info!("{}: removing {}", DRIVER_NAME, dev.name());
        dev.teardown();

        self.lock()[minor as usize] = Slot::Free;
        Ok(())
    }

    /// Tear down every live device
    pub fn remove_all(&self) {
        for dev in self.devices() {
            if let Err(e) = self.remove(dev.minor()) {
                log::debug!("{}: {}", DRIVER_NAME, e);
            }
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferedLine;
    use crate::device::DeviceState;
    use crate::irq::{IrqHandler, NoInterrupt};
    use crate::transport::Transfer;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Answers polls with "\x05hi" and succeeds on everything
    struct Echo;

    impl Transport for Echo {
        fn transact(&mut self, xfer: &mut Transfer<'_>) -> Result<()> {
            if xfer.rx_buf.len() >= 3 && xfer.tx_buf[0] == crate::protocol::ENQUIRY {
                xfer.rx_buf[..3].copy_from_slice(b"\x05hi");
            }
            Ok(())
        }
    }

    /// Stores the handler so tests can fire it
    #[derive(Clone, Default)]
    struct Manual {
        handler: Arc<Mutex<Option<IrqHandler>>>,
        detached: Arc<AtomicBool>,
    }

    impl InterruptSource for Manual {
        fn attach(&mut self, handler: IrqHandler) -> Result<()> {
            *self.handler.lock().unwrap() = Some(handler);
            Ok(())
        }

        fn detach(&mut self) {
            self.handler.lock().unwrap().take();
            self.detached.store(true, Ordering::SeqCst);
        }
    }

    struct Refuse;

    impl InterruptSource for Refuse {
        fn attach(&mut self, _handler: IrqHandler) -> Result<()> {
            Err(Error::InvalidParameter("no such line".into()))
        }

        fn detach(&mut self) {}
    }

    fn peer() -> Peer {
        Peer::new("atmega32u4", Box::new(Echo), Box::new(NoInterrupt))
    }

    #[test]
    fn test_probe_assigns_minor_zero() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let dev = mgr.probe(peer()).unwrap();
        assert_eq!(dev.minor(), 0);
        assert_eq!(dev.name(), "ttySPI0");
        assert_eq!(dev.state(), DeviceState::Active);
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn test_second_probe_busy() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let _dev = mgr.probe(peer()).unwrap();
        assert!(matches!(mgr.probe(peer()), Err(Error::Busy(_))));
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn test_unsupported_model() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let p = Peer::new("stm32", Box::new(Echo), Box::new(NoInterrupt));
        assert!(matches!(mgr.probe(p), Err(Error::UnsupportedPeer(_))));
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = BridgeConfig::default().with_capacity(0);
        assert!(matches!(
            DeviceManager::new(config),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_irq_failure_unwinds() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let p = Peer::new("atmega32u4", Box::new(Echo), Box::new(Refuse));
        assert!(matches!(mgr.probe(p), Err(Error::Registration(_))));
        assert_eq!(mgr.count(), 0);
        assert!(matches!(mgr.get(0), Err(Error::NoSuchDevice(0))));

        // The slot is usable again.
        assert_eq!(mgr.probe(peer()).unwrap().minor(), 0);
    }

    #[test]
    fn test_remove_then_reprobe() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let dev = mgr.probe(peer()).unwrap();
        mgr.remove(0).unwrap();
        assert_eq!(mgr.count(), 0);
        assert_eq!(dev.state(), DeviceState::Destroyed);
        assert!(matches!(mgr.remove(0), Err(Error::NoSuchDevice(0))));
        assert!(mgr.probe(peer()).is_ok());
    }

    #[test]
    fn test_removed_device_fails_fast() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let dev = mgr.probe(peer()).unwrap();
        mgr.remove(0).unwrap();
        assert!(matches!(dev.poll(), Err(Error::Removed)));
        assert!(matches!(dev.write(b"x"), Err(Error::Removed)));
        assert!(matches!(
            dev.open(Arc::new(BufferedLine::new())),
            Err(Error::Removed)
        ));
    }

    #[test]
    fn test_remove_detaches_interrupt() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let irq = Manual::default();
        let p = Peer::new("atmega32u4", Box::new(Echo), Box::new(irq.clone()));
        mgr.probe(p).unwrap();
        assert!(irq.handler.lock().unwrap().is_some());
        mgr.remove(0).unwrap();
        assert!(irq.detached.load(Ordering::SeqCst));
        assert!(irq.handler.lock().unwrap().is_none());
    }

    #[test]
    fn test_capacity_two_uses_lowest_free_minor() {
        let mgr = DeviceManager::new(BridgeConfig::default().with_capacity(2)).unwrap();
        assert_eq!(mgr.probe(peer()).unwrap().minor(), 0);
        assert_eq!(mgr.probe(peer()).unwrap().minor(), 1);
        assert!(matches!(mgr.probe(peer()), Err(Error::Busy(_))));

        // Removing in either order keeps the count right.
        mgr.remove(0).unwrap();
        assert_eq!(mgr.count(), 1);
        assert_eq!(mgr.probe(peer()).unwrap().minor(), 0);
        mgr.remove(1).unwrap();
        mgr.remove(0).unwrap();
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn test_open_busy_and_reopen() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        mgr.probe(peer()).unwrap();

        let line = Arc::new(BufferedLine::new());
        let handle = mgr.open(0, line.clone()).unwrap();
        assert!(matches!(
            mgr.open(0, Arc::new(BufferedLine::new())),
            Err(Error::Busy(_))
        ));
        handle.close();
        assert!(mgr.open(0, line).is_ok());
    }

    #[test]
    fn test_reopen_sees_no_stale_bytes() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let dev = mgr.probe(peer()).unwrap();
        let line = Arc::new(BufferedLine::new());

        for _ in 0..3 {
            let handle = dev.open(line.clone()).unwrap();
            assert!(line.is_empty());
            dev.poll().unwrap();
            assert_eq!(line.len(), 2);
            handle.close();
            assert!(line.is_empty());
        }

        // Polls while closed go nowhere.
        dev.poll().unwrap();
        let _handle = dev.open(line.clone()).unwrap();
        assert!(line.is_empty());
    }

    #[test]
    fn test_open_wait_woken_by_close() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let dev = mgr.probe(peer()).unwrap();
        let handle = dev.open(Arc::new(BufferedLine::new())).unwrap();

        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.close();
        });
        let reopened = dev.open_wait(Arc::new(BufferedLine::new()), Duration::from_secs(5));
        assert!(reopened.is_ok());
        closer.join().unwrap();
    }

    #[test]
    fn test_open_wait_times_out() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let dev = mgr.probe(peer()).unwrap();
        let _handle = dev.open(Arc::new(BufferedLine::new())).unwrap();
        assert!(matches!(
            dev.open_wait(Arc::new(BufferedLine::new()), Duration::from_millis(10)),
            Err(Error::Busy(_))
        ));
    }

    #[test]
    fn test_interrupt_delivers_to_line() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        let irq = Manual::default();
        let p = Peer::new("atmega32u4", Box::new(Echo), Box::new(irq.clone()));
        let dev = mgr.probe(p).unwrap();
        let line = Arc::new(BufferedLine::new());
        let _handle = dev.open(line.clone()).unwrap();

        irq.handler.lock().unwrap().as_ref().unwrap().fire();
        let mut buf = [0u8; 2];
        assert_eq!(line.read(&mut buf, Duration::from_secs(5)), 2);
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn test_interval_polls_peer_without_irq() {
        let config = BridgeConfig::default().with_poll_interval(Some(Duration::from_millis(10)));
        let mgr = DeviceManager::new(config).unwrap();
        let dev = mgr.probe(peer()).unwrap();
        let line = Arc::new(BufferedLine::new());
        let _handle = dev.open(line.clone()).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(line.read(&mut buf, Duration::from_secs(5)), 2);
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn test_handle_write() {
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        mgr.probe(peer()).unwrap();
        let handle = mgr.open(0, Arc::new(BufferedLine::new())).unwrap();
        assert_eq!(handle.write_room(), 64);
        assert_eq!(handle.write(b"abc").unwrap(), 3);
        assert_eq!(handle.write(&[b'x'; 100]).unwrap(), 64);
        assert_eq!(handle.write(&[]).unwrap(), 0);
    }
}
