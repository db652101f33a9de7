//! DPI and DPI preset codecs
//!
//! A preset list is encoded as:
//!
//! ```text
//! [active index][count] then per preset: [index][x:2][y:2][z:2]
//! ```
//!
//! USB devices use big-endian fields and BLE devices little-endian. Whether
//! per-preset indices are written and checked depends on the command version.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::protocol::{MAX_BLE_DPI_PRESETS, MAX_USB_DPI_PRESETS};
use crate::types::DotsPerInch;

/// Bytes per encoded preset
const PRESET_SIZE: usize = 7;

/// Byte order of 16-bit fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let pair = [bytes[0], bytes[1]];
        match self {
            Endianness::Big => u16::from_be_bytes(pair),
            Endianness::Little => u16::from_le_bytes(pair),
        }
    }

    pub fn write_u16(self, bytes: &mut [u8], value: u16) {
        let pair = match self {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };
        bytes[..2].copy_from_slice(&pair);
    }
}

/// One stored resolution step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpiPreset {
    pub x: u16,
    pub y: u16,
    /// Unused by known devices, passed through untouched
    #[serde(default)]
    pub z: u16,
}

impl DpiPreset {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y, z: 0 }
    }

    pub fn dpi(&self) -> DotsPerInch {
        DotsPerInch::new(self.x, self.y)
    }
}

/// Ordered preset list with the currently selected preset (1-based)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpiProfileSet {
    pub active_preset: u8,
    pub presets: Vec<DpiPreset>,
}

impl DpiProfileSet {
    pub fn new(active_preset: u8, presets: Vec<DpiPreset>) -> Self {
        Self {
            active_preset,
            presets,
        }
    }

    pub fn active(&self) -> Option<&DpiPreset> {
        (self.active_preset as usize)
            .checked_sub(1)
            .and_then(|i| self.presets.get(i))
    }
}

/// Wire format parameters for a preset list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpiPresetFormat {
    pub max_presets: usize,
    pub endianness: Endianness,
    /// Write 1-based indices in front of each preset
    pub emit_indices: bool,
    /// Reject responses whose per-preset indices are out of sequence
    pub validate_indices: bool,
}

impl DpiPresetFormat {
    /// Legacy USB commands (communication ID 0x3F)
    pub const USB_V1: Self = Self {
        max_presets: MAX_USB_DPI_PRESETS,
        endianness: Endianness::Big,
        emit_indices: false,
        validate_indices: false,
    };

    pub const USB_V2: Self = Self {
        max_presets: MAX_USB_DPI_PRESETS,
        endianness: Endianness::Big,
        emit_indices: true,
        validate_indices: true,
    };

    pub const BLUETOOTH: Self = Self {
        max_presets: MAX_BLE_DPI_PRESETS,
        endianness: Endianness::Little,
        emit_indices: true,
        validate_indices: false,
    };

    /// Bytes needed to encode `count` presets
    pub fn encoded_len(count: usize) -> usize {
        2 + PRESET_SIZE * count
    }
}

/// Decode a preset list
///
/// The z coordinate of the last preset is sometimes cut short; it then
/// decodes as 0.
pub fn parse_dpi_presets(buffer: &[u8], format: DpiPresetFormat) -> Result<DpiProfileSet> {
    if buffer.len() < 2 {
        return Err(ProtocolError::invalid_payload("DPI preset header truncated"));
    }
    let active_preset = buffer[0];
    let count = buffer[1] as usize;

    if count > format.max_presets {
        return Err(ProtocolError::invalid_payload(format!(
            "{count} DPI presets exceeds maximum of {}",
            format.max_presets
        )));
    }

    let minimum = match count {
        0 => 2,
        n => 2 + 5 * n + 2 * (n - 1),
    };
    if buffer.len() < minimum {
        return Err(ProtocolError::invalid_payload(format!(
            "{count} DPI presets need {minimum} bytes, got {}",
            buffer.len()
        )));
    }

    let endianness = format.endianness;
    let mut presets = Vec::with_capacity(count);
    for i in 0..count {
        let record = &buffer[2 + PRESET_SIZE * i..];
        if format.validate_indices && record[0] as usize != i + 1 {
            return Err(ProtocolError::invalid_payload(format!(
                "DPI preset {} carries index {}",
                i + 1,
                record[0]
            )));
        }
        let z = if record.len() >= PRESET_SIZE {
            endianness.read_u16(&record[5..7])
        } else {
            0
        };
        presets.push(DpiPreset {
            x: endianness.read_u16(&record[1..3]),
            y: endianness.read_u16(&record[3..5]),
            z,
        });
    }

    Ok(DpiProfileSet {
        active_preset,
        presets,
    })
}

/// Encode a preset list, returning the number of bytes written
pub fn write_dpi_presets(
    buffer: &mut [u8],
    format: DpiPresetFormat,
    set: &DpiProfileSet,
) -> Result<usize> {
    let count = set.presets.len();
    if count == 0 || count > format.max_presets {
        return Err(ProtocolError::InvalidArgument(format!(
            "expected 1 to {} DPI presets, got {count}",
            format.max_presets
        )));
    }
    if set.active_preset == 0 || set.active_preset as usize > count {
        return Err(ProtocolError::InvalidArgument(format!(
            "active preset {} is outside 1..={count}",
            set.active_preset
        )));
    }
    let length = DpiPresetFormat::encoded_len(count);
    if buffer.len() < length {
        return Err(ProtocolError::InvalidArgument(format!(
            "{count} DPI presets need {length} bytes, buffer holds {}",
            buffer.len()
        )));
    }

    let endianness = format.endianness;
    // The legacy layout leaves the active preset byte zero
    buffer[0] = if format.emit_indices { set.active_preset } else { 0 };
    buffer[1] = count as u8;
    for (i, preset) in set.presets.iter().enumerate() {
        let record = &mut buffer[2 + PRESET_SIZE * i..2 + PRESET_SIZE * (i + 1)];
        record[0] = if format.emit_indices { i as u8 + 1 } else { 0 };
        endianness.write_u16(&mut record[1..3], preset.x);
        endianness.write_u16(&mut record[3..5], preset.y);
        endianness.write_u16(&mut record[5..7], preset.z);
    }
    Ok(length)
}

/// Decode a `[x:2][y:2]` resolution pair
pub fn parse_dpi(buffer: &[u8], endianness: Endianness) -> Result<DotsPerInch> {
    if buffer.len() < 4 {
        return Err(ProtocolError::invalid_payload(format!(
            "DPI needs 4 bytes, got {}",
            buffer.len()
        )));
    }
    Ok(DotsPerInch::new(
        endianness.read_u16(&buffer[0..2]),
        endianness.read_u16(&buffer[2..4]),
    ))
}

/// Encode `[x:2][y:2][0:2]`, returning the number of bytes written
pub fn write_dpi(buffer: &mut [u8], dpi: DotsPerInch, endianness: Endianness) -> Result<usize> {
    if buffer.len() < 6 {
        return Err(ProtocolError::InvalidArgument(format!(
            "DPI needs 6 bytes, buffer holds {}",
            buffer.len()
        )));
    }
    endianness.write_u16(&mut buffer[0..2], dpi.horizontal);
    endianness.write_u16(&mut buffer[2..4], dpi.vertical);
    endianness.write_u16(&mut buffer[4..6], 0);
    Ok(6)
}
