//! CLI command implementations
//!
//! `run` is the long-lived bridge daemon. `poll` and `send` open the peer
//! for a single exchange and are meant for bring-up and debugging.

mod list;
mod oneshot;
mod run;

pub use list::list_backends;
pub use oneshot::{parse_hex, run_poll, run_send};
pub use run::run_bridge;

use spitty_core::{BridgeConfig, Device, DeviceManager};
use std::sync::Arc;

/// Probe a single peer from CLI arguments
fn probe(
    config: BridgeConfig,
    model: &str,
    transport: &str,
    irq: &str,
) -> Result<(DeviceManager, Arc<Device>), Box<dyn std::error::Error>> {
    let manager = DeviceManager::new(config)?;
    let peer = crate::backends::open_peer(model, transport, irq)?;
    let device = manager.probe(peer)?;
    log::info!("{} ({}) ready", device.name(), device.model());
    Ok((manager, device))
}
