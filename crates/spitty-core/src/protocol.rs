//! Enquiry protocol constants
//!
//! The peer is polled with a fixed frame of ASCII ENQ bytes whenever it
//! raises its interrupt line. Writes and polls run at different clock
//! rates: the peer samples user data at the fast rate and answers polls at
//! the slow one.

/// ASCII "enquiry", sent to ask the peer for pending data
pub const ENQUIRY: u8 = 0x05;

/// Last byte of the enquiry frame
pub const ENQUIRY_TERMINATOR: u8 = 0x00;

/// Fixed frame length, and the cap on a single write transfer
pub const MSG_LEN: usize = 64;

/// Clock for user writes (response discarded)
pub const SPEED_HZ_TX: u32 = 115_200;

/// Clock for enquiry polls (response forwarded)
pub const SPEED_HZ_RX: u32 = 9_600;

/// Delay after each transfer word, in microseconds
pub const DELAY_US: u16 = 25;

/// Period of the fallback enquiry timer
pub const DEFAULT_ENQUIRY_INTERVAL_MS: u64 = 200;

/// Driver name reported in logs
pub const DRIVER_NAME: &str = "spiserialplain";

/// Prefix of the per-minor endpoint name (`ttySPI0`, ...)
pub const TTY_NAME: &str = "ttySPI";

/// Peer models this bridge binds to
pub const SUPPORTED_MODELS: &[&str] = &["atmega32u4"];

/// Build the enquiry frame: `MSG_LEN - 1` ENQ bytes and a terminator
pub fn enquiry_frame() -> [u8; MSG_LEN] {
    let mut frame = [ENQUIRY; MSG_LEN];
    frame[MSG_LEN - 1] = ENQUIRY_TERMINATOR;
    frame
}

/// Endpoint name for a minor index
pub fn endpoint_name(minor: u32) -> String {
    format!("{}{}", TTY_NAME, minor)
}

/// Direction intent of a transfer
///
/// Selects the clock rate, the receive buffer size, and whether the
/// response reaches the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// User write. Capped at [`MSG_LEN`], response discarded.
    Write,
    /// Enquiry poll. Full length, response forwarded to the line.
    Poll,
}

impl Direction {
    /// Clock rate for this direction
    pub fn speed_hz(self) -> u32 {
        match self {
            Direction::Write => SPEED_HZ_TX,
            Direction::Poll => SPEED_HZ_RX,
        }
    }

    /// Whether the response bytes are thrown away
    pub fn discards_response(self) -> bool {
        matches!(self, Direction::Write)
    }

    /// Number of bytes actually clocked for a payload of `len` bytes
    pub fn transfer_len(self, len: usize) -> usize {
        match self {
            Direction::Write => len.min(MSG_LEN),
            Direction::Poll => len,
        }
    }
}
