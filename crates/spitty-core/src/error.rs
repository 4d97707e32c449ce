//! Error types for spitty-core
//!
//! One taxonomy covers the whole bridge. Transport failures show up here
//! as [`Error::Transport`], but the transfer path only ever reports them
//! inside [`Completion::Degraded`](crate::bridge::Completion), never as `Err`.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// A buffer for the transfer could not be allocated
    #[error("out of memory allocating {len} byte transfer buffer")]
    OutOfMemory {
        /// Requested buffer length
        len: usize,
    },

    /// Capacity exceeded at probe time, or the line is already open
    #[error("busy: {0}")]
    Busy(&'static str),

    /// The physical exchange reported a failure
    #[error("SPI transfer failed: {0}")]
    Transport(String),

    /// Interrupt binding or endpoint registration failed during probe
    #[error("registration failed: {0}")]
    Registration(String),

    /// The instance has been torn down
    #[error("device has been removed")]
    Removed,

    /// No live device at the given minor index
    #[error("no device registered at minor {0}")]
    NoSuchDevice(u32),

    /// Peer model is not in the id table
    #[error("unsupported peer model '{0}'")]
    UnsupportedPeer(String),

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
