//! Error types for the GPIO interrupt line

use thiserror::Error;

/// Linux GPIO specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// Failed to request the interrupt line
    #[error("Failed to request GPIO line {line} on '{path}': {source}")]
    LineRequestFailed {
        path: String,
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to read the line value
    #[error("Failed to read GPIO line value: {0}")]
    GetValueFailed(#[source] gpiocdev::Error),

    /// Failed to start the watcher thread
    #[error("Failed to start GPIO watcher: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// A handler is already attached
    #[error("GPIO interrupt already attached")]
    AlreadyAttached,

    /// GPIO chip or device not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,
}

impl From<LinuxGpioError> for spitty_core::Error {
    fn from(e: LinuxGpioError) -> Self {
        spitty_core::Error::Registration(e.to_string())
    }
}

/// Result type for Linux GPIO operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
