//! spitty - SPI-to-tty bridge
//!
//! Exposes a microcontroller peer on an SPI bus as a terminal. The peer
//! signals pending data on an interrupt line; the bridge answers with an
//! enquiry frame and forwards whatever comes back to the terminal.
//! Terminal writes go out as plain SPI frames.
//!
//! # Architecture
//!
//! - `spitty-core` owns the protocol, the serialized transfer path and the
//!   device lifecycle
//! - transports (`linux_spi`, `dummy`) move the bytes
//! - interrupt sources (`linux_gpio`, `dummy`, `none`) trigger polls
//! - the daemon binds a pseudo-terminal as the line interface

mod backends;
mod cli;
mod commands;
mod pty;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    logger(cli.verbose).init();

    let result = match cli.command {
        Commands::Run {
            peer,
            irq,
            poll_interval_ms,
            link,
        } => commands::run_bridge(&peer, &irq, poll_interval_ms, link.as_deref()),
        Commands::Poll { peer, count } => commands::run_poll(&peer, count),
        Commands::Send { peer, hex, data } => {
            let bytes = if hex {
                commands::parse_hex(&data)?
            } else {
                data.into_bytes()
            };
            commands::run_send(&peer, &bytes)
        }
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
    };

    result
}

/// Logger honouring RUST_LOG, with -v/-vv overriding it
fn logger(verbose: u8) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    match verbose {
        0 => {} // default (info)
        1 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    builder
}
