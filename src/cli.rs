//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const TRANSPORT_HELP: &str =
    "Transport to the peer, e.g. linux_spi:dev=/dev/spidev0.0 or dummy:loopback=1";

const IRQ_HELP: &str =
    "Peer interrupt line, e.g. linux_gpio:gpiochip=0,line=17, dummy, or none";

#[derive(Parser)]
#[command(name = "spitty")]
#[command(author, version, about = "SPI-to-tty bridge for microcontroller peers", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options identifying the peer
#[derive(clap::Args, Debug, Clone)]
pub struct PeerArgs {
    #[arg(short, long, help = TRANSPORT_HELP)]
    pub transport: String,

    /// Peer device model (must be in the id table)
    #[arg(short, long, default_value = "atmega32u4")]
    pub model: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge, exposing the peer as a pseudo-terminal
    Run {
        #[command(flatten)]
        peer: PeerArgs,

        #[arg(short, long, default_value = "none", help = IRQ_HELP)]
        irq: String,

        /// Poll the peer this often when no interrupt arrives (0 = never).
        /// Defaults to 200 with `-i none`, off otherwise.
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Create a symlink to the terminal at this path
        #[arg(short, long)]
        link: Option<PathBuf>,
    },

    /// Send enquiry polls and print what the peer returns
    Poll {
        #[command(flatten)]
        peer: PeerArgs,

        /// Number of polls
        #[arg(short, long, default_value = "1")]
        count: u32,
    },

    /// Write data to the peer
    Send {
        #[command(flatten)]
        peer: PeerArgs,

        /// Treat DATA as hex bytes (e.g. "48 65 0a")
        #[arg(long)]
        hex: bool,

        /// Data to send
        data: String,
    },

    /// List available transports and interrupt sources
    ListBackends,
}
