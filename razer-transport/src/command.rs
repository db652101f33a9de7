//! Command codec for the feature-report channel
//!
//! A command is addressed by (communication ID, feature, function), carries a
//! declared data length and a payload, and is sealed by an XOR checksum over
//! bytes `3..len-2`.
//!
//! ```text
//! [0] report id  [1] status  [2] comm id  [3..6] reserved  [6] data length
//! [7] feature    [8] function  [9..89] payload  [89] checksum  [90] reserved
//! ```

use tracing::warn;

use crate::error::{Corruption, ProtocolError, Result};
use crate::protocol::{offset, Feature, ResponseStatus, MAX_PAYLOAD_SIZE, REPORT_SIZE};

/// Triple used to correlate a response to its request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub communication_id: u8,
    pub feature: Feature,
    pub function: u8,
}

impl CommandHeader {
    pub const fn new(communication_id: u8, feature: Feature, function: u8) -> Self {
        Self {
            communication_id,
            feature,
            function,
        }
    }
}

/// One outbound request. Built per call and consumed by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub header: CommandHeader,
    /// Value written at offset 6. Often larger than the payload: for reads it
    /// announces the size of the expected response.
    pub data_length: u8,
    /// Bytes written from offset 9
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(communication_id: u8, feature: Feature, function: u8, data_length: u8) -> Self {
        Self {
            header: CommandHeader::new(communication_id, feature, function),
            data_length,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// XOR of every byte from offset 3 up to (excluding) the checksum byte
pub fn compute_checksum(buffer: &[u8]) -> u8 {
    if buffer.len() < offset::CHECKSUM_START + 2 {
        return 0;
    }
    buffer[offset::CHECKSUM_START..buffer.len() - 2]
        .iter()
        .fold(0, |acc, b| acc ^ b)
}

/// Recompute and store the checksum byte
pub fn update_checksum(buffer: &mut [u8]) {
    if buffer.len() < offset::CHECKSUM_START + 2 {
        return;
    }
    let checksum = compute_checksum(buffer);
    let index = buffer.len() - 2;
    buffer[index] = checksum;
}

/// Whether the stored checksum matches the buffer contents
pub fn validate_checksum(buffer: &[u8]) -> bool {
    verify_checksum(buffer).is_ok()
}

pub fn verify_checksum(buffer: &[u8]) -> std::result::Result<(), Corruption> {
    if buffer.len() < offset::CHECKSUM_START + 2 {
        return Err(Corruption::InvalidPayload(format!(
            "buffer of {} bytes cannot hold a checksum",
            buffer.len()
        )));
    }
    let expected = compute_checksum(buffer);
    let actual = buffer[buffer.len() - 2];
    if expected == actual {
        Ok(())
    } else {
        Err(Corruption::ChecksumMismatch { expected, actual })
    }
}

/// Serialize a command into a fresh feature report
pub fn build_command(command: &Command) -> Result<[u8; REPORT_SIZE]> {
    let mut buffer = CommandBuffer::new();
    buffer.write_command(command)?;
    Ok(buffer.bytes)
}

/// Outcome of inspecting one Get-Feature response
///
/// `Success` is only produced after the checksum has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseState {
    Success,
    MustRetry,
    Failure,
    DeviceNotConnected,
    UnsupportedParameter,
    Corrupted(Corruption),
}

/// Classify a response against the header of the request it answers
///
/// The header is compared first: a response for another request is corrupt
/// whatever its status says.
pub fn classify_response(buffer: &[u8], expected: &CommandHeader) -> ResponseState {
    if buffer.len() < REPORT_SIZE {
        return ResponseState::Corrupted(Corruption::InvalidPayload(format!(
            "short response: {} bytes",
            buffer.len()
        )));
    }

    let actual_id = buffer[offset::COMMUNICATION_ID];
    let actual_feature = buffer[offset::FEATURE];
    let actual_function = buffer[offset::FUNCTION];
    if actual_id != expected.communication_id
        || actual_feature != expected.feature as u8
        || actual_function != expected.function
    {
        return ResponseState::Corrupted(Corruption::HeaderMismatch {
            expected_id: expected.communication_id,
            expected_feature: expected.feature as u8,
            expected_function: expected.function,
            actual_id,
            actual_feature,
            actual_function,
        });
    }

    match ResponseStatus::from_u8(buffer[offset::STATUS]) {
        Some(ResponseStatus::Success) => match verify_checksum(buffer) {
            Ok(()) => ResponseState::Success,
            Err(corruption) => ResponseState::Corrupted(corruption),
        },
        Some(ResponseStatus::MustRetry) => ResponseState::MustRetry,
        Some(ResponseStatus::Failure) => ResponseState::Failure,
        Some(ResponseStatus::DeviceNotConnected) => ResponseState::DeviceNotConnected,
        Some(ResponseStatus::UnsupportedParameter) => ResponseState::UnsupportedParameter,
        Some(ResponseStatus::Unset) | None => {
            ResponseState::Corrupted(Corruption::UnexpectedStatus(buffer[offset::STATUS]))
        }
    }
}

/// The fixed-size region a transport reuses for every request and response
pub struct CommandBuffer {
    bytes: [u8; REPORT_SIZE],
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; REPORT_SIZE],
        }
    }

    /// Zero the whole buffer
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    pub fn is_clear(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Clear the buffer, then write header, payload and checksum
    pub fn write_command(&mut self, command: &Command) -> Result<()> {
        if command.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::InvalidArgument(format!(
                "payload of {} bytes exceeds {} byte limit",
                command.payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        self.clear();
        self.bytes[offset::COMMUNICATION_ID] = command.header.communication_id;
        self.bytes[offset::DATA_LENGTH] = command.data_length;
        self.bytes[offset::FEATURE] = command.header.feature as u8;
        self.bytes[offset::FUNCTION] = command.header.function;
        self.bytes[offset::PAYLOAD..offset::PAYLOAD + command.payload.len()]
            .copy_from_slice(&command.payload);
        update_checksum(&mut self.bytes);
        Ok(())
    }

    pub fn classify(&self, expected: &CommandHeader) -> ResponseState {
        let state = classify_response(&self.bytes, expected);
        if let ResponseState::Corrupted(ref corruption) = state {
            warn!(
                "Corrupted response to {} function 0x{:02X}: {}",
                expected.feature, expected.function, corruption
            );
        }
        state
    }
}

/// Owned copy of a successful, checksum-verified response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    frame: Vec<u8>,
}

impl DeviceResponse {
    /// Only called with frames that classified as `Success`
    pub(crate) fn from_frame(frame: &[u8]) -> Self {
        Self {
            frame: frame.to_vec(),
        }
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn data_length(&self) -> u8 {
        self.frame[offset::DATA_LENGTH]
    }

    /// Bytes between the function ID and the checksum
    pub fn payload(&self) -> &[u8] {
        &self.frame[offset::PAYLOAD..offset::CHECKSUM]
    }
}
