//! Protocol constants for Razer feature-report and BLE communication

use std::fmt;

/// Size of a feature report on the control interface, including report ID 0
pub const REPORT_SIZE: usize = 91;

/// Number of message bytes following the report ID
pub const MESSAGE_SIZE: usize = REPORT_SIZE - 1;

/// Byte offsets inside a feature report buffer (report ID at offset 0)
pub mod offset {
    /// Response status, see [`super::ResponseStatus`]
    pub const STATUS: usize = 1;
    /// Communication ID echoed back by the device
    pub const COMMUNICATION_ID: usize = 2;
    /// Declared data length of the request (and of the response payload)
    pub const DATA_LENGTH: usize = 6;
    /// Feature group ID
    pub const FEATURE: usize = 7;
    /// Function ID within the feature group
    pub const FUNCTION: usize = 8;
    /// First payload byte
    pub const PAYLOAD: usize = 9;
    /// XOR checksum over `CHECKSUM_START..CHECKSUM`
    pub const CHECKSUM: usize = super::REPORT_SIZE - 2;
    /// First byte covered by the checksum
    pub const CHECKSUM_START: usize = 3;
    /// Trailing reserved byte
    pub const RESERVED: usize = super::REPORT_SIZE - 1;
}

/// Maximum number of payload bytes a single command can carry
pub const MAX_PAYLOAD_SIZE: usize = offset::CHECKSUM - offset::PAYLOAD;

/// Communication IDs used to tag requests
pub mod communication_id {
    /// Default tag used by most lighting, mouse and power commands
    pub const DEFAULT: u8 = 0x1F;
    /// Identity and pairing queries (handshake, serial numbers)
    pub const GENERAL: u8 = 0x08;
    /// Legacy DPI preset commands
    pub const LEGACY_DPI: u8 = 0x3F;
}

/// Feature groups addressed by byte 7 of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Feature {
    General = 0x00,
    LightingV1 = 0x03,
    Mouse = 0x04,
    Profiles = 0x05,
    Power = 0x07,
    Sensor = 0x0B,
    LightingV2 = 0x0F,
}

impl Feature {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::General),
            0x03 => Some(Self::LightingV1),
            0x04 => Some(Self::Mouse),
            0x05 => Some(Self::Profiles),
            0x07 => Some(Self::Power),
            0x0B => Some(Self::Sensor),
            0x0F => Some(Self::LightingV2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::General => "General",
            Self::LightingV1 => "LightingV1",
            Self::Mouse => "Mouse",
            Self::Profiles => "Profiles",
            Self::Power => "Power",
            Self::Sensor => "Sensor",
            Self::LightingV2 => "LightingV2",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

/// Status byte reported by the device at offset 1 of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseStatus {
    /// No response written yet
    Unset = 0x00,
    /// Device is busy; poll again
    MustRetry = 0x01,
    Success = 0x02,
    DeviceNotConnected = 0x03,
    Failure = 0x04,
    UnsupportedParameter = 0x05,
}

impl ResponseStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Unset),
            0x01 => Some(Self::MustRetry),
            0x02 => Some(Self::Success),
            0x03 => Some(Self::DeviceNotConnected),
            0x04 => Some(Self::Failure),
            0x05 => Some(Self::UnsupportedParameter),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unset => "unset",
            Self::MustRetry => "must retry",
            Self::Success => "success",
            Self::DeviceNotConnected => "device not connected",
            Self::Failure => "failure",
            Self::UnsupportedParameter => "unsupported parameter",
        };
        write!(f, "{name} (0x{:02X})", *self as u8)
    }
}

/// Feature-report polling delays
pub mod timing {
    /// Delay between Set-Feature and the first Get-Feature (ms)
    pub const INITIAL_POLL_DELAY_MS: u64 = 4;
    /// Delay between two Get-Feature polls (ms)
    pub const RETRY_POLL_DELAY_MS: u64 = 6;
    /// Error retries granted to the handshake
    pub const HANDSHAKE_ERROR_RETRIES: u32 = 4;
}

/// Bluetooth LE protocol constants (DeathAdder V2 Pro GATT service)
pub mod ble {
    /// Characteristic the host writes commands to
    pub const WRITE_CHARACTERISTIC: u128 = 0x52401524_F97C_7F90_0E7F_6C6F4E36DB1C;
    /// Characteristic the device pushes responses on
    pub const READ_CHARACTERISTIC: u128 = 0x52401525_F97C_7F90_0E7F_6C6F4E36DB1C;

    /// Size of the command header written before any payload
    pub const HEADER_SIZE: usize = 8;
    /// Maximum bytes per GATT write
    pub const MAX_FRAGMENT_SIZE: usize = 20;
    /// Response accumulation buffer
    pub const RESPONSE_BUFFER_SIZE: usize = 256;
    /// Hard timeout for one request (ms)
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
    /// Polling divider reported for BLE connections (125 Hz)
    pub const POLLING_DIVIDER: u8 = 8;

    /// Set bit on command IDs of read requests
    pub const READ_FLAG: u8 = 0x80;

    /// Command IDs (request byte 0; echoed in the response)
    pub mod cmd {
        pub const POWER_SET_IDLE_TIMER: u8 = 0x05;
        pub const POWER_SET_LOW_POWER_THRESHOLD: u8 = 0x07;
        pub const DPI_SET: u8 = 0x0B;
        pub const DPI_PRESETS_SET: u8 = 0x0F;
        pub const LIGHTING_SET_EFFECT: u8 = 0x13;
        pub const LIGHTING_SET_BRIGHTNESS: u8 = 0x15;
        pub const SERIAL_NUMBER: u8 = 0x83;
        pub const POWER_QUERY: u8 = 0x85;
        pub const POWER_LOW_POWER_THRESHOLD: u8 = 0x87;
        pub const DPI_GET: u8 = 0x8B;
        pub const DPI_PRESETS_GET: u8 = 0x8F;
        pub const LIGHTING_GET_EFFECT: u8 = 0x93;
    }

    /// Feature bytes used in the BLE header (distinct from the USB feature IDs)
    pub mod feature {
        pub const GENERAL: u8 = 0x01;
        pub const POWER: u8 = 0x05;
        pub const DPI: u8 = 0x0B;
        pub const LIGHTING: u8 = 0x10;
    }
}

/// Notification opcodes (first byte after the report ID on the input interface)
pub mod notif {
    pub const DPI_CHANGE: u8 = 0x02;
    pub const DEVICE_CONNECTION: u8 = 0x09;
    pub const EXTERNAL_POWER: u8 = 0x0C;
    /// Periodic Bluetooth keep-alive, carries nothing useful
    pub const BLUETOOTH_KEEPALIVE: u8 = 0x10;
    pub const BATTERY_LEVEL: u8 = 0x31;
    pub const DEVICE_CONNECTION_WITH_PRODUCT_ID: u8 = 0x35;

    /// Second byte of a connection notification
    pub const CONNECTION_REMOVED: u8 = 0x02;
    pub const CONNECTION_ARRIVED: u8 = 0x03;

    pub fn name(opcode: u8) -> &'static str {
        match opcode {
            DPI_CHANGE => "DPI_CHANGE",
            DEVICE_CONNECTION => "DEVICE_CONNECTION",
            EXTERNAL_POWER => "EXTERNAL_POWER",
            BLUETOOTH_KEEPALIVE => "BLUETOOTH_KEEPALIVE",
            BATTERY_LEVEL => "BATTERY_LEVEL",
            DEVICE_CONNECTION_WITH_PRODUCT_ID => "DEVICE_CONNECTION_WITH_PRODUCT_ID",
            _ => "UNKNOWN",
        }
    }
}

/// Notification report IDs
pub mod report_id {
    /// Mice and docks
    pub const DEFAULT: u8 = 0x05;
    /// Some receivers and keyboards
    pub const ALTERNATE: u8 = 0x09;
}

/// Maximum DPI presets stored by a USB device
pub const MAX_USB_DPI_PRESETS: usize = 11;
/// Maximum DPI presets stored by a BLE device
pub const MAX_BLE_DPI_PRESETS: usize = 5;
/// Paired devices that fit in one response
pub const MAX_PAIRED_DEVICES: usize = 26;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_fit_report() {
        assert_eq!(offset::CHECKSUM, 89);
        assert_eq!(offset::RESERVED, 90);
        assert_eq!(MAX_PAYLOAD_SIZE, 80);
    }

    #[test]
    fn test_feature_round_trip() {
        for feature in [
            Feature::General,
            Feature::LightingV1,
            Feature::Mouse,
            Feature::Profiles,
            Feature::Power,
            Feature::Sensor,
            Feature::LightingV2,
        ] {
            assert_eq!(Feature::from_u8(feature as u8), Some(feature));
        }
        assert_eq!(Feature::from_u8(0x42), None);
    }

    #[test]
    fn test_status_unknown_byte() {
        assert_eq!(ResponseStatus::from_u8(0x02), Some(ResponseStatus::Success));
        assert_eq!(ResponseStatus::from_u8(0x06), None);
    }

    #[test]
    fn test_ble_uuid_layout() {
        assert_eq!((ble::WRITE_CHARACTERISTIC >> 96) as u32, 0x52401524);
        assert_eq!(ble::READ_CHARACTERISTIC - ble::WRITE_CHARACTERISTIC, 1 << 96);
    }
}
