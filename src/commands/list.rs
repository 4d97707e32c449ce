//! List commands implementation

use crate::backends::backend_help;

/// List all transports, interrupt sources and peer models built into this binary
pub fn list_backends() {
    print!("{}", backend_help());
}
