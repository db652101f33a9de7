//! Value types shared by the codecs and transports

use serde::{Deserialize, Serialize};
use std::fmt;

/// 24-bit RGB color
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl std::str::FromStr for RgbColor {
    type Err = String;

    /// Parse `RRGGBB` or `#RRGGBB`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("invalid color '{s}', expected RRGGBB"));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("invalid color '{s}': {e}"))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Sensor resolution on both axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DotsPerInch {
    pub horizontal: u16,
    pub vertical: u16,
}

impl DotsPerInch {
    pub const fn new(horizontal: u16, vertical: u16) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }
}

impl fmt::Display for DotsPerInch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.horizontal, self.vertical)
    }
}

/// LED (lighting zone) identifier
///
/// Devices report zone IDs outside the known set, so this is an open newtype
/// rather than an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedId(pub u8);

impl LedId {
    pub const ZERO: LedId = LedId(0x00);
    pub const SCROLL_WHEEL: LedId = LedId(0x01);
    pub const BATTERY: LedId = LedId(0x03);
    pub const LOGO: LedId = LedId(0x04);
    pub const BACKLIGHT: LedId = LedId(0x05);
    pub const MACRO: LedId = LedId(0x07);
    pub const GAME: LedId = LedId(0x08);
    pub const RED_PROFILE: LedId = LedId(0x0C);
    pub const GREEN_PROFILE: LedId = LedId(0x0D);
    pub const BLUE_PROFILE: LedId = LedId(0x0E);
    pub const RIGHT_SIDE: LedId = LedId(0x10);
    pub const LEFT_SIDE: LedId = LedId(0x11);
    pub const CHARGING: LedId = LedId(0x20);
    pub const FAST_CHARGING: LedId = LedId(0x21);
    pub const FULLY_CHARGED: LedId = LedId(0x22);

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::ZERO => "zero",
            Self::SCROLL_WHEEL => "scroll-wheel",
            Self::BATTERY => "battery",
            Self::LOGO => "logo",
            Self::BACKLIGHT => "backlight",
            Self::MACRO => "macro",
            Self::GAME => "game",
            Self::RED_PROFILE => "red-profile",
            Self::GREEN_PROFILE => "green-profile",
            Self::BLUE_PROFILE => "blue-profile",
            Self::RIGHT_SIDE => "right-side",
            Self::LEFT_SIDE => "left-side",
            Self::CHARGING => "charging",
            Self::FAST_CHARGING => "fast-charging",
            Self::FULLY_CHARGED => "fully-charged",
            _ => return None,
        })
    }
}

impl fmt::Display for LedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

impl std::str::FromStr for LedId {
    type Err = String;

    /// Parse a known zone name or a raw numeric ID (`5`, `0x05`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const NAMED: &[LedId] = &[
            LedId::ZERO,
            LedId::SCROLL_WHEEL,
            LedId::BATTERY,
            LedId::LOGO,
            LedId::BACKLIGHT,
            LedId::MACRO,
            LedId::GAME,
            LedId::RED_PROFILE,
            LedId::GREEN_PROFILE,
            LedId::BLUE_PROFILE,
            LedId::RIGHT_SIDE,
            LedId::LEFT_SIDE,
            LedId::CHARGING,
            LedId::FAST_CHARGING,
            LedId::FULLY_CHARGED,
        ];
        let lower = s.to_ascii_lowercase();
        if let Some(id) = NAMED.iter().find(|id| id.name() == Some(lower.as_str())) {
            return Ok(*id);
        }
        let parsed = match lower.strip_prefix("0x") {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => lower.parse(),
        };
        parsed.map(LedId).map_err(|_| format!("unknown LED '{s}'"))
    }
}

/// Connection state and product ID of a device behind a receiver or dock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDeviceInformation {
    pub is_connected: bool,
    pub product_id: u16,
}

/// Four-part firmware version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub revision: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Physical channel a transport speaks over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Lock-step HID feature reports (USB cable or 2.4 GHz receiver)
    FeatureReport,
    /// GATT writes with notification responses
    BluetoothLe,
}
