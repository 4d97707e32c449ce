//! Transport and interrupt-source registration and dispatch
//!
//! Backends are selected with a `name:key=value,key=value` string. Which
//! names are available depends on the features enabled at compile time.

use spitty_core::{InterruptSource, NoInterrupt, Peer, Transport};

/// What a backend provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Carries transfers to the peer
    Transport,
    /// Watches the peer's "has data" line
    Interrupt,
}

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// What the backend provides
    pub kind: BackendKind,
    /// Short description
    pub description: &'static str,
}

impl BackendInfo {
    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        kind: BackendKind::Transport,
        description: "In-memory peer for testing (loopback=<0|1>)",
    });

    #[cfg(feature = "linux-spi")]
    backends.push(BackendInfo {
        name: "linux_spi",
        aliases: &["linux-spi", "spidev"],
        kind: BackendKind::Transport,
        description: "Linux spidev interface (dev=/dev/spidevX.Y,mode=<0-3>)",
    });

    backends.push(BackendInfo {
        name: "none",
        aliases: &[],
        kind: BackendKind::Interrupt,
        description: "No interrupt line; rely on --poll-interval-ms",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        kind: BackendKind::Interrupt,
        description: "Line driven by the dummy transport",
    });

    #[cfg(feature = "linux-gpio")]
    backends.push(BackendInfo {
        name: "linux_gpio",
        aliases: &["linux-gpio", "gpio"],
        kind: BackendKind::Interrupt,
        description: "GPIO character device (dev=<path>|gpiochip=<N>,line=<N>,active_low=<0|1>)",
    });

    backends
}

/// Generate help text listing backends and supported peer models
pub fn backend_help() -> String {
    let backends = available_backends();
    let mut help = String::new();

    for (kind, title) in [
        (BackendKind::Transport, "Transports"),
        (BackendKind::Interrupt, "Interrupt sources"),
    ] {
        help.push_str(&format!("{}:\n", title));
        for b in backends.iter().filter(|b| b.kind == kind) {
            help.push_str(&format!("  {:12} - {}", b.name, b.description));
            if !b.aliases.is_empty() {
                help.push_str(&format!(" (aliases: {})", b.aliases.join(", ")));
            }
            help.push('\n');
        }
        help.push('\n');
    }

    help.push_str("Supported peer models:\n");
    for model in spitty_core::protocol::SUPPORTED_MODELS {
        help.push_str(&format!("  {}\n", model));
    }
    help
}

/// Canonical name of an available backend of the given kind
pub fn find_backend(name: &str, kind: BackendKind) -> Option<&'static str> {
    available_backends()
        .into_iter()
        .find(|b| b.kind == kind && b.matches(name))
        .map(|b| b.name)
}

/// Parse a backend string into name and options
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_backend_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, params)) = s.split_once(':') {
        let options: Vec<(&str, &str)> = params
            .split(',')
            .filter_map(|kv| kv.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Error for an unknown or disabled backend
fn unknown_backend_error(name: &str, kind: BackendKind) -> Box<dyn std::error::Error> {
    let names: Vec<&str> = available_backends()
        .iter()
        .filter(|b| b.kind == kind)
        .map(|b| b.name)
        .collect();
    let what = match kind {
        BackendKind::Transport => "transport",
        BackendKind::Interrupt => "interrupt source",
    };
    format!(
        "Unknown {} '{}'. Available: {}",
        what,
        name,
        if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        }
    )
    .into()
}

/// Open a transport from its backend string
///
/// The `dummy` transport drives its own interrupt line; it is returned
/// alongside so that `-i dummy` can pick it up.
#[allow(unused_variables)]
fn open_transport(
    spec: &str,
) -> Result<(Box<dyn Transport>, Option<Box<dyn InterruptSource>>), Box<dyn std::error::Error>> {
    let (name, options) = parse_backend_string(spec);
    let canonical = find_backend(name, BackendKind::Transport)
        .ok_or_else(|| unknown_backend_error(name, BackendKind::Transport))?;

    log::debug!("Opening transport {} with {:?}", canonical, options);

    match canonical {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let config = spitty_dummy::parse_options(&options)?;
            let irq = spitty_dummy::DummyIrq::new();
            let peer = spitty_dummy::DummyPeer::new(config).with_irq(irq.clone());
            Ok((Box::new(peer), Some(Box::new(irq))))
        }
        #[cfg(feature = "linux-spi")]
        "linux_spi" => Ok((spitty_linux_spi::open_linux_spi(&options)?, None)),
        _ => Err(unknown_backend_error(name, BackendKind::Transport)),
    }
}

/// Open an interrupt source from its backend string
#[allow(unused_variables)]
fn open_irq(
    spec: &str,
    paired: Option<Box<dyn InterruptSource>>,
) -> Result<Box<dyn InterruptSource>, Box<dyn std::error::Error>> {
    let (name, options) = parse_backend_string(spec);
    let canonical = find_backend(name, BackendKind::Interrupt)
        .ok_or_else(|| unknown_backend_error(name, BackendKind::Interrupt))?;

    match canonical {
        "none" => Ok(Box::new(NoInterrupt)),
        #[cfg(feature = "dummy")]
        "dummy" => paired.ok_or_else(|| "the dummy interrupt needs the dummy transport".into()),
        #[cfg(feature = "linux-gpio")]
        "linux_gpio" => spitty_linux_gpio::open_linux_gpio_irq(&options),
        _ => Err(unknown_backend_error(name, BackendKind::Interrupt)),
    }
}

/// Assemble a peer from transport and interrupt backend strings
pub fn open_peer(
    model: &str,
    transport: &str,
    irq: &str,
) -> Result<Peer, Box<dyn std::error::Error>> {
    let (transport, paired) = open_transport(transport)?;
    let irq = open_irq(irq, paired)?;
    Ok(Peer::new(model, transport, irq))
}
