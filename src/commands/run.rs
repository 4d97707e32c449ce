//! Bridge daemon

use super::probe;
use crate::backends::{find_backend, parse_backend_string, BackendKind};
use crate::cli::PeerArgs;
use crate::pty::{self, PtyLine, PtyLink};
use nix::sys::signal::{SigSet, Signal};
use spitty_core::protocol::DEFAULT_ENQUIRY_INTERVAL_MS;
use spitty_core::BridgeConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Run the bridge until SIGINT or SIGTERM
pub fn run_bridge(
    peer: &PeerArgs,
    irq: &str,
    poll_interval_ms: Option<u64>,
    link: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let interval = poll_interval(irq, poll_interval_ms)?;

    // Block before any worker thread exists so they all inherit the mask.
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals.thread_block()?;

    let config = BridgeConfig::new().with_poll_interval(interval);
    let (manager, device) = probe(config, &peer.model, &peer.transport, irq)?;

    let line = Arc::new(PtyLine::open()?);
    let handle = device.open(line.clone())?;
    handle.dtr_rts(true);

    let _link = link
        .map(|path| PtyLink::create(path, line.path()))
        .transpose()?;

    println!("{} on {}", device.name(), line.path().display());

    let pump_line = line.clone();
    std::thread::Builder::new()
        .name("spitty-pty".into())
        .spawn(move || {
            if let Err(e) = pty::pump(&pump_line, &handle) {
                log::error!("pty: {}", e);
            }
        })?;

    let signal = signals.wait()?;
    log::info!("Received {:?}, shutting down", signal);

    manager.remove_all();
    Ok(())
}

/// Enquiry timer period for the daemon
///
/// Without an interrupt line the timer is the only thing that polls, so it
/// defaults to [`DEFAULT_ENQUIRY_INTERVAL_MS`] there and cannot be disabled.
fn poll_interval(irq: &str, requested_ms: Option<u64>) -> Result<Option<Duration>, String> {
    let (name, _) = parse_backend_string(irq);
    let polled_only = find_backend(name, BackendKind::Interrupt) == Some("none");

    match requested_ms {
        Some(0) if polled_only => {
            Err("-i none needs a non-zero --poll-interval-ms to reach the peer".to_string())
        }
        Some(0) => Ok(None),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
        None if polled_only => Ok(Some(Duration::from_millis(DEFAULT_ENQUIRY_INTERVAL_MS))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_irq_defaults_to_enquiry_interval() {
        assert_eq!(
            poll_interval("none", None).unwrap(),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            poll_interval("none", Some(50)).unwrap(),
            Some(Duration::from_millis(50))
        );
        assert!(poll_interval("none", Some(0)).is_err());
    }

    #[cfg(feature = "linux-gpio")]
    #[test]
    fn test_irq_line_leaves_timer_off() {
        assert_eq!(poll_interval("linux_gpio:gpiochip=0,line=4", None).unwrap(), None);
        assert_eq!(poll_interval("gpio:line=4", Some(0)).unwrap(), None);
        assert_eq!(
            poll_interval("linux_gpio:line=4", Some(10)).unwrap(),
            Some(Duration::from_millis(10))
        );
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_default_run_config_reaches_peer_without_irq() {
        use spitty_core::{BufferedLine, DeviceManager, NoInterrupt, Peer};

        let peer = spitty_dummy::DummyPeer::new_default();
        let interval = poll_interval("none", None).unwrap();
        let manager = DeviceManager::new(BridgeConfig::new().with_poll_interval(interval)).unwrap();
        let device = manager
            .probe(Peer::new(
                "atmega32u4",
                Box::new(peer.clone()),
                Box::new(NoInterrupt),
            ))
            .unwrap();
        let line = Arc::new(BufferedLine::new());
        let _handle = device.open(line.clone()).unwrap();

        peer.send(b"hi");
        let mut buf = [0u8; 2];
        assert_eq!(line.read(&mut buf, Duration::from_secs(5)), 2);
        assert_eq!(&buf, b"hi");
    }
}
