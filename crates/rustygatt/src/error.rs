//! Error types shared across the library.

use thiserror::Error;

/// Errors from the HCI transport layer.
#[derive(Error, Debug)]
pub enum HciError {
    #[error("failed to open HCI socket: {0}")]
    Socket(std::io::Error),

    #[error("failed to bind to HCI device: {0}")]
    Bind(std::io::Error),

    #[error("failed to send HCI command: {0}")]
    Send(std::io::Error),

    #[error("failed to receive from HCI socket: {0}")]
    Receive(std::io::Error),

    #[error("malformed HCI packet")]
    InvalidPacket,

    #[error("HCI command 0x{0:04x} failed with status 0x{1:02x}")]
    CommandFailed(u16, u8),

    #[error("controller did not answer within the deadline")]
    ControllerTimeout,

    #[error("device is closed")]
    Closed,
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HCI error: {0}")]
    Hci(#[from] HciError),

    #[error("ATT error: {0}")]
    Att(#[from] crate::att::AttError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("advertising payload exceeds 31 bytes ({0})")]
    AdvertisementTooLong(usize),

    #[error("not connected")]
    NotConnected,
}

pub type HciResult<T> = Result<T, HciError>;
