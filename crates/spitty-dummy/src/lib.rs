//! spitty-dummy - Emulated microcontroller peer for testing
//!
//! This crate provides a peer that lives in memory: a [`DummyPeer`]
//! transport that answers enquiry polls from an outbox and records what it
//! receives, and a [`DummyIrq`] signal line asserted from code. It's useful
//! for testing and for running the bridge without real hardware.
//!
//! The emulated firmware follows the enquiry protocol: slot 0 of a poll
//! response echoes the ENQ byte, the following slots carry queued bytes,
//! and unused slots are NUL filler. While the outbox is non-empty after a
//! poll, the peer keeps its signal line asserted.

use spitty_core::error::{Error, Result};
use spitty_core::irq::{InterruptSource, IrqHandler};
use spitty_core::protocol::{ENQUIRY, SPEED_HZ_RX};
use spitty_core::transport::{Transfer, Transport};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for the dummy peer
#[derive(Debug, Clone, Default)]
pub struct DummyConfig {
    /// Queue every received byte for sending back
    pub loopback: bool,
}

/// One transfer as seen by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Bytes the host clocked out
    pub tx: Vec<u8>,
    /// Clock rate of the transfer
    pub speed_hz: u32,
    /// Post-transfer delay
    pub delay_us: u16,
}

impl TransferRecord {
    /// Whether this was an enquiry poll
    pub fn is_poll(&self) -> bool {
        self.speed_hz == SPEED_HZ_RX
    }
}

#[derive(Debug, Default)]
struct PeerState {
    outbox: VecDeque<u8>,
    received: Vec<u8>,
    transfers: Vec<TransferRecord>,
    failures: usize,
}

/// Emulated peer
///
/// Cloning yields another handle to the same peer, so a test can keep one
/// while the bridge owns another as its transport.
#[derive(Clone, Default)]
pub struct DummyPeer {
    config: DummyConfig,
    state: Arc<Mutex<PeerState>>,
    irq: Option<DummyIrq>,
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl DummyPeer {
    /// Create a peer with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Create a peer with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Drive `irq` whenever the peer has data
    pub fn with_irq(mut self, irq: DummyIrq) -> Self {
        self.irq = Some(irq);
        self
    }

    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes for the host and raise the signal line
    pub fn send(&self, bytes: &[u8]) {
        self.lock().outbox.extend(bytes.iter().copied());
        self.raise();
    }

    fn raise(&self) {
        if let Some(irq) = &self.irq {
            irq.assert();
        }
    }

    /// Bytes still waiting for a poll
    pub fn pending(&self) -> usize {
        self.lock().outbox.len()
    }

    /// Bytes received from host writes so far
    pub fn received(&self) -> Vec<u8> {
        self.lock().received.clone()
    }

    /// Every transfer seen so far
    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.lock().transfers.clone()
    }

    /// Make the next `n` transfers report a failure
    pub fn fail_next(&self, n: usize) {
        self.lock().failures = n;
    }

    /// Number of times two transfers were in progress at once
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn exchange(&self, xfer: &mut Transfer<'_>) -> Result<()> {
        let mut state = self.lock();
        state.transfers.push(TransferRecord {
            tx: xfer.tx_buf.to_vec(),
            speed_hz: xfer.speed_hz,
            delay_us: xfer.delay_us,
        });

        let failed = state.failures > 0;
        if failed {
            state.failures -= 1;
        }

        if xfer.speed_hz == SPEED_HZ_RX {
            if let Some((echo, rest)) = xfer.rx_buf.split_first_mut() {
                *echo = ENQUIRY;
                for slot in rest {
                    match state.outbox.pop_front() {
                        Some(byte) => *slot = byte,
                        None => break,
                    }
                }
            }
        } else {
            state.received.extend_from_slice(xfer.tx_buf);
            if self.config.loopback {
                state.outbox.extend(xfer.tx_buf.iter().copied());
            }
        }

        let more = !state.outbox.is_empty();
        drop(state);
        if more {
            self.raise();
        }

        if failed {
            return Err(Error::Transport("dummy: injected failure".into()));
        }
        Ok(())
    }
}

impl Transport for DummyPeer {
    fn transact(&mut self, xfer: &mut Transfer<'_>) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let result = self.exchange(xfer);
        self.busy.store(false, Ordering::SeqCst);
        result
    }
}

/// Signal line asserted from code
#[derive(Clone, Default)]
pub struct DummyIrq {
    handler: Arc<Mutex<Option<IrqHandler>>>,
}

impl DummyIrq {
    /// Create a detached line
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert the line; returns whether a new poll was queued
    pub fn assert(&self) -> bool {
        let handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        handler.as_ref().is_some_and(IrqHandler::fire)
    }

    /// Whether a handler is attached
    pub fn is_attached(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl InterruptSource for DummyIrq {
    fn attach(&mut self, handler: IrqHandler) -> Result<()> {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::Registration("dummy irq already attached".into()));
        }
        *slot = Some(handler);
        Ok(())
    }

    fn detach(&mut self) {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Parse dummy transport options
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<DummyConfig, String> {
    let mut config = DummyConfig::default();
    for (key, value) in options {
        match *key {
            "loopback" => {
                config.loopback = match *value {
                    "1" | "true" | "yes" => true,
                    "0" | "false" | "no" => false,
                    _ => return Err(format!("Invalid loopback value: {}", value)),
                };
            }
            _ => log::warn!("dummy: Unknown option: {}={}", key, value),
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spitty_core::protocol::{MSG_LEN, SPEED_HZ_TX};
    use spitty_core::{
        BridgeConfig, BufferedLine, Completion, DeviceManager, DeviceState, Peer,
    };
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn setup(config: DummyConfig) -> (DeviceManager, DummyPeer, DummyIrq) {
        let irq = DummyIrq::new();
        let peer = DummyPeer::new(config).with_irq(irq.clone());
        let mgr = DeviceManager::new(BridgeConfig::default()).unwrap();
        mgr.probe(Peer::new(
            "atmega32u4",
            Box::new(peer.clone()),
            Box::new(irq.clone()),
        ))
        .unwrap();
        (mgr, peer, irq)
    }

    fn read_exact(line: &BufferedLine, n: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        while out.len() < n {
            let got = line.read(&mut buf, TIMEOUT);
            assert!(got > 0, "timed out after {} of {} bytes", out.len(), n);
            out.extend_from_slice(&buf[..got]);
        }
        out
    }

    #[test]
    fn test_peer_data_reaches_line() {
        let (mgr, peer, _irq) = setup(DummyConfig::default());
        let line = Arc::new(BufferedLine::new());
        let _handle = mgr.open(0, line.clone()).unwrap();

        peer.send(b"hello");
        assert_eq!(read_exact(&line, 5), b"hello".to_vec());

        let polls: Vec<_> = peer.transfers().into_iter().filter(|t| t.is_poll()).collect();
        assert!(!polls.is_empty());
        let mut frame = vec![ENQUIRY; MSG_LEN - 1];
        frame.push(0x00);
        assert!(polls.iter().all(|t| t.tx == frame));
    }

    #[test]
    fn test_long_message_spans_polls() {
        let (mgr, peer, _irq) = setup(DummyConfig::default());
        let line = Arc::new(BufferedLine::new());
        let _handle = mgr.open(0, line.clone()).unwrap();

        let msg: Vec<u8> = (0..200u32).map(|i| b'a' + (i % 26) as u8).collect();
        peer.send(&msg);
        assert_eq!(read_exact(&line, msg.len()), msg);
        assert_eq!(peer.pending(), 0);

        // 63 payload slots per poll
        let polls = peer.transfers().iter().filter(|t| t.is_poll()).count();
        assert!(polls >= 4);
    }

    #[test]
    fn test_write_reaches_peer() {
        let (mgr, peer, _irq) = setup(DummyConfig::default());
        let handle = mgr.open(0, Arc::new(BufferedLine::new())).unwrap();

        assert_eq!(handle.write(b"AT\r\n").unwrap(), 4);
        assert_eq!(peer.received(), b"AT\r\n".to_vec());

        let t = &peer.transfers()[0];
        assert_eq!(t.speed_hz, SPEED_HZ_TX);
        assert_eq!(t.delay_us, 25);
    }

    #[test]
    fn test_loopback_round_trip() {
        let (mgr, _peer, _irq) = setup(DummyConfig { loopback: true });
        let line = Arc::new(BufferedLine::new());
        let handle = mgr.open(0, line.clone()).unwrap();

        handle.write(b"ping").unwrap();
        assert_eq!(read_exact(&line, 4), b"ping".to_vec());
    }

    #[test]
    fn test_failed_transfer_is_soft() {
        let (mgr, peer, _irq) = setup(DummyConfig::default());
        let dev = mgr.get(0).unwrap();
        peer.fail_next(1);

        let c = dev.write(b"abc").unwrap();
        assert!(matches!(c, Completion::Degraded { len: 3, .. }));
        assert!(!dev.write(b"abc").unwrap().is_degraded());
    }

    #[test]
    fn test_no_overlap_under_load() {
        let (mgr, peer, irq) = setup(DummyConfig::default());
        let dev = mgr.get(0).unwrap();
        let line = Arc::new(BufferedLine::new());
        let _handle = dev.open(line.clone()).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let dev = Arc::clone(&dev);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        dev.write(b"0123456789").unwrap();
                    }
                })
            })
            .collect();
        for _ in 0..50 {
            peer.send(b"x");
            irq.assert();
        }
        for w in writers {
            w.join().unwrap();
        }

        assert_eq!(read_exact(&line, 50), vec![b'x'; 50]);
        assert_eq!(peer.received().len(), 1000);
        assert_eq!(peer.overlaps(), 0);
    }

    #[test]
    fn test_remove_while_busy() {
        let (mgr, peer, irq) = setup(DummyConfig::default());
        let dev = mgr.get(0).unwrap();
        let writer = {
            let dev = Arc::clone(&dev);
            std::thread::spawn(move || {
                let mut removed = false;
                for _ in 0..1000 {
                    match dev.write(b"data") {
                        Ok(_) => {}
                        Err(Error::Removed) => {
                            removed = true;
                            break;
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                removed
            })
        };
        peer.send(b"zzz");

        mgr.remove(0).unwrap();
        assert_eq!(dev.state(), DeviceState::Destroyed);
        assert!(!irq.is_attached());
        assert!(matches!(dev.poll(), Err(Error::Removed)));
        let _ = writer.join().unwrap();
        assert_eq!(peer.overlaps(), 0);
    }

    #[test]
    fn test_irq_without_device_is_ignored() {
        let irq = DummyIrq::new();
        assert!(!irq.assert());
    }

    #[test]
    fn test_parse_options() {
        assert!(parse_options(&[("loopback", "1")]).unwrap().loopback);
        assert!(!parse_options(&[]).unwrap().loopback);
        assert!(parse_options(&[("loopback", "maybe")]).is_err());
    }
}
