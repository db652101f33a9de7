//! Protocol error types

use thiserror::Error;

use crate::protocol::ResponseStatus;

/// Errors that can occur during protocol operations
///
/// A device that answers "busy" is retried inside the transport and never
/// surfaces here.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Device reported that the addressed (sub-)device is not connected
    #[error("Device unreachable")]
    DeviceUnreachable,

    /// Device rejected the request (failure or unsupported parameter)
    #[error("Request rejected by device: {status}")]
    Rejected { status: ResponseStatus },

    /// Response could not be trusted or decoded
    #[error("Corrupted response: {0}")]
    Corrupted(#[from] Corruption),

    /// BLE response did not arrive before the deadline
    #[error("Operation timed out")]
    Timeout,

    /// Caller aborted the operation
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not supported by this transport: {0}")]
    NotSupported(&'static str),

    /// Transport was closed
    #[error("Transport closed")]
    Closed,

    /// A wait state is already armed for another request
    #[error("Another request is already in flight")]
    InFlight,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HID error: {0}")]
    Hid(String),
}

/// Reasons a response is classified as corrupted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("unsupported status byte 0x{0:02X}")]
    UnexpectedStatus(u8),

    #[error(
        "response header mismatch: expected {expected_id:02X}/{expected_feature:02X}/{expected_function:02X}, \
         got {actual_id:02X}/{actual_feature:02X}/{actual_function:02X}"
    )]
    HeaderMismatch {
        expected_id: u8,
        expected_feature: u8,
        expected_function: u8,
        actual_id: u8,
        actual_feature: u8,
        actual_function: u8,
    },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl ProtocolError {
    /// Shorthand for a payload decode failure
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        ProtocolError::Corrupted(Corruption::InvalidPayload(msg.into()))
    }

    /// Device should be treated as offline by the owning driver
    pub fn is_offline(&self) -> bool {
        matches!(self, ProtocolError::DeviceUnreachable | ProtocolError::Timeout)
    }

    /// Response was malformed, possibly indicating a wire-level desync
    pub fn is_corruption(&self) -> bool {
        matches!(self, ProtocolError::Corrupted(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProtocolError::Cancelled)
    }
}

impl From<hidapi::HidError> for ProtocolError {
    fn from(e: hidapi::HidError) -> Self {
        match e {
            hidapi::HidError::IoError { error } => ProtocolError::Io(error),
            other => ProtocolError::Hid(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
