//! Single-exchange commands: poll and send

use super::probe;
use crate::cli::PeerArgs;
use spitty_core::{BridgeConfig, BufferedLine, Completion};
use std::sync::Arc;

/// Poll the peer `count` times and print whatever it returns
pub fn run_poll(peer: &PeerArgs, count: u32) -> Result<(), Box<dyn std::error::Error>> {
    let (_manager, device) = probe(BridgeConfig::new(), &peer.model, &peer.transport, "none")?;
    let line = Arc::new(BufferedLine::new());
    let _handle = device.open(line.clone())?;

    let mut total = 0;
    for i in 0..count {
        if let Completion::Degraded { cause, .. } = device.poll()? {
            log::warn!("Poll {}: transport error: {}", i, cause);
        }
        let data = line.take();
        total += data.len();
        if !data.is_empty() {
            println!("{}", format_bytes(&data));
        }
    }

    log::info!("Received {} bytes in {} polls", total, count);
    Ok(())
}

/// Send `data` to the peer
pub fn run_send(peer: &PeerArgs, data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let (_manager, device) = probe(BridgeConfig::new(), &peer.model, &peer.transport, "none")?;
    let line = Arc::new(BufferedLine::new());
    let handle = device.open(line)?;

    let mut pending = data;
    while !pending.is_empty() {
        let sent = handle.write(pending)?;
        if sent == 0 {
            break;
        }
        pending = &pending[sent..];
    }

    println!("Sent {} bytes", data.len() - pending.len());
    handle.close();
    Ok(())
}

/// Parse whitespace-separated hex bytes, e.g. "48 65 0a"
pub fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    s.split_whitespace()
        .map(|tok| {
            let tok = tok.trim_start_matches("0x");
            u8::from_str_radix(tok, 16).map_err(|_| format!("Invalid hex byte: {}", tok))
        })
        .collect()
}

fn format_bytes(data: &[u8]) -> String {
    let hex: Vec<String> = data.iter().map(|b| format!("{:02x}", b)).collect();
    let text: String = data
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    format!("{}  |{}|", hex.join(" "), text)
}
