//! Lighting effect codec
//!
//! Two wire layouts exist:
//!
//! - V1 (legacy matrix commands): `[effect id][parameter][colors...]`, where the
//!   parameter doubles as the variant selector (0 = random, 1 = one color,
//!   2 = two colors).
//! - V2: `[effect id][0x01][0x28][color count][colors...]`.
//!
//! Effect IDs that are not recognized decode to `None`.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::types::RgbColor;

/// Effect IDs used by the V1 layout
pub mod v1 {
    pub const DISABLED: u8 = 0x00;
    pub const WAVE: u8 = 0x01;
    pub const REACTIVE: u8 = 0x02;
    pub const BREATHING: u8 = 0x03;
    pub const SPECTRUM_CYCLE: u8 = 0x04;
    pub const STATIC: u8 = 0x06;
}

/// Effect IDs used by the V2 layout
pub mod v2 {
    pub const DISABLED: u8 = 0x00;
    pub const STATIC: u8 = 0x01;
    pub const BREATHING: u8 = 0x02;
    pub const SPECTRUM_CYCLE: u8 = 0x03;
    pub const WAVE: u8 = 0x04;
    pub const REACTIVE: u8 = 0x05;

    /// Constant bytes following the effect ID
    pub const RESERVED: [u8; 2] = [0x01, 0x28];
}

/// Longest encoded effect (V2 with two colors)
pub const MAX_EFFECT_SIZE: usize = 10;

/// A lighting effect the device can run on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightingEffect {
    Disabled,
    StaticColor(RgbColor),
    /// Breathing in one color
    ColorPulse(RgbColor),
    /// Breathing alternating between two colors
    TwoColorPulse(RgbColor, RgbColor),
    /// Breathing in random colors
    RandomColorPulse,
    SpectrumCycle,
    SpectrumWave,
    Reactive(RgbColor),
}

impl LightingEffect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::StaticColor(_) => "static",
            Self::ColorPulse(_) => "pulse",
            Self::TwoColorPulse(..) => "two-color-pulse",
            Self::RandomColorPulse => "random-pulse",
            Self::SpectrumCycle => "spectrum",
            Self::SpectrumWave => "wave",
            Self::Reactive(_) => "reactive",
        }
    }

    fn colors(&self) -> (u8, [RgbColor; 2]) {
        match *self {
            Self::StaticColor(c) | Self::ColorPulse(c) | Self::Reactive(c) => {
                (1, [c, RgbColor::default()])
            }
            Self::TwoColorPulse(c1, c2) => (2, [c1, c2]),
            Self::Disabled | Self::RandomColorPulse | Self::SpectrumCycle | Self::SpectrumWave => {
                (0, [RgbColor::default(); 2])
            }
        }
    }
}

fn ensure_capacity(buffer: &[u8], needed: usize) -> Result<()> {
    if buffer.len() < needed {
        return Err(ProtocolError::InvalidArgument(format!(
            "effect needs {needed} bytes, buffer holds {}",
            buffer.len()
        )));
    }
    Ok(())
}

fn read_color(buffer: &[u8], at: usize) -> Result<RgbColor> {
    buffer
        .get(at..at + 3)
        .map(|c| RgbColor::new(c[0], c[1], c[2]))
        .ok_or_else(|| ProtocolError::invalid_payload("effect color truncated"))
}

fn write_colors(buffer: &mut [u8], at: usize, colors: &[RgbColor]) {
    for (i, color) in colors.iter().enumerate() {
        buffer[at + 3 * i..at + 3 * i + 3].copy_from_slice(&color.to_bytes());
    }
}

/// Encode an effect in the V1 layout, returning the number of bytes written
pub fn write_effect_v1(buffer: &mut [u8], effect: &LightingEffect) -> Result<usize> {
    let (id, parameter) = match effect {
        LightingEffect::Disabled => (v1::DISABLED, None),
        LightingEffect::SpectrumCycle => (v1::SPECTRUM_CYCLE, None),
        // Wave direction
        LightingEffect::SpectrumWave => (v1::WAVE, Some(1)),
        LightingEffect::StaticColor(_) => (v1::STATIC, Some(1)),
        LightingEffect::Reactive(_) => (v1::REACTIVE, Some(1)),
        LightingEffect::RandomColorPulse => (v1::BREATHING, Some(0)),
        LightingEffect::ColorPulse(_) => (v1::BREATHING, Some(1)),
        LightingEffect::TwoColorPulse(..) => (v1::BREATHING, Some(2)),
    };
    let (count, colors) = effect.colors();
    let colors = &colors[..count as usize];

    let length = match parameter {
        None => 1,
        Some(_) => 2 + 3 * colors.len(),
    };
    ensure_capacity(buffer, length)?;

    buffer[0] = id;
    if let Some(parameter) = parameter {
        buffer[1] = parameter;
        write_colors(buffer, 2, colors);
    }
    Ok(length)
}

/// Decode an effect in the V1 layout
pub fn parse_effect_v1(buffer: &[u8]) -> Result<Option<LightingEffect>> {
    let Some(&id) = buffer.first() else {
        return Err(ProtocolError::invalid_payload("empty effect"));
    };
    let parameter = buffer.get(1).copied().unwrap_or(0);

    Ok(Some(match id {
        v1::DISABLED => LightingEffect::Disabled,
        v1::SPECTRUM_CYCLE => LightingEffect::SpectrumCycle,
        v1::WAVE => LightingEffect::SpectrumWave,
        v1::STATIC => LightingEffect::StaticColor(read_color(buffer, 2)?),
        v1::REACTIVE => LightingEffect::Reactive(read_color(buffer, 2)?),
        v1::BREATHING => match parameter {
            0 => LightingEffect::RandomColorPulse,
            1 => LightingEffect::ColorPulse(read_color(buffer, 2)?),
            _ => LightingEffect::TwoColorPulse(read_color(buffer, 2)?, read_color(buffer, 5)?),
        },
        _ => return Ok(None),
    }))
}

/// Encode an effect in the V2 layout, returning the number of bytes written
pub fn write_effect_v2(buffer: &mut [u8], effect: &LightingEffect) -> Result<usize> {
    let id = match effect {
        LightingEffect::Disabled => v2::DISABLED,
        LightingEffect::StaticColor(_) => v2::STATIC,
        LightingEffect::ColorPulse(_)
        | LightingEffect::TwoColorPulse(..)
        | LightingEffect::RandomColorPulse => v2::BREATHING,
        LightingEffect::SpectrumCycle => v2::SPECTRUM_CYCLE,
        LightingEffect::SpectrumWave => v2::WAVE,
        LightingEffect::Reactive(_) => v2::REACTIVE,
    };
    let (count, colors) = effect.colors();
    let colors = &colors[..count as usize];

    // Effects without colors stop after the reserved bytes
    let length = if colors.is_empty() { 3 } else { 4 + 3 * colors.len() };
    ensure_capacity(buffer, length)?;

    buffer[0] = id;
    buffer[1..3].copy_from_slice(&v2::RESERVED);
    if !colors.is_empty() {
        buffer[3] = count;
        write_colors(buffer, 4, colors);
    }
    Ok(length)
}

/// Decode an effect in the V2 layout
pub fn parse_effect_v2(buffer: &[u8]) -> Result<Option<LightingEffect>> {
    if buffer.len() < 3 {
        return Err(ProtocolError::invalid_payload(format!(
            "effect of {} bytes is shorter than its header",
            buffer.len()
        )));
    }
    let count = buffer.get(3).copied().unwrap_or(0);

    Ok(Some(match buffer[0] {
        v2::DISABLED => LightingEffect::Disabled,
        v2::SPECTRUM_CYCLE => LightingEffect::SpectrumCycle,
        v2::WAVE => LightingEffect::SpectrumWave,
        v2::STATIC => LightingEffect::StaticColor(read_color(buffer, 4)?),
        v2::REACTIVE => LightingEffect::Reactive(read_color(buffer, 4)?),
        v2::BREATHING => match count {
            0 => LightingEffect::RandomColorPulse,
            1 => LightingEffect::ColorPulse(read_color(buffer, 4)?),
            _ => LightingEffect::TwoColorPulse(read_color(buffer, 4)?, read_color(buffer, 7)?),
        },
        _ => return Ok(None),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: RgbColor = RgbColor::new(0xFF, 0, 0);
    const TEAL: RgbColor = RgbColor::new(0, 0x80, 0x80);

    #[test]
    fn test_v1_static_layout() {
        let mut buf = [0u8; MAX_EFFECT_SIZE];
        let len = write_effect_v1(&mut buf, &LightingEffect::StaticColor(RED)).unwrap();
        assert_eq!(&buf[..len], &[v1::STATIC, 1, 0xFF, 0, 0]);
    }

    #[test]
    fn test_v1_breathing_selector() {
        let mut buf = [0u8; MAX_EFFECT_SIZE];
        let len = write_effect_v1(&mut buf, &LightingEffect::RandomColorPulse).unwrap();
        assert_eq!(&buf[..len], &[v1::BREATHING, 0]);

        let len = write_effect_v1(&mut buf, &LightingEffect::TwoColorPulse(RED, TEAL)).unwrap();
        assert_eq!(
            &buf[..len],
            &[v1::BREATHING, 2, 0xFF, 0, 0, 0, 0x80, 0x80]
        );
    }

    #[test]
    fn test_v2_count_only_with_colors() {
        let mut buf = [0u8; MAX_EFFECT_SIZE];
        let len = write_effect_v2(&mut buf, &LightingEffect::SpectrumWave).unwrap();
        assert_eq!(&buf[..len], &[v2::WAVE, 0x01, 0x28]);

        let len = write_effect_v2(&mut buf, &LightingEffect::RandomColorPulse).unwrap();
        assert_eq!(len, 3);
        assert_eq!(
            parse_effect_v2(&buf[..len]).unwrap(),
            Some(LightingEffect::RandomColorPulse)
        );

        let len = write_effect_v2(&mut buf, &LightingEffect::ColorPulse(TEAL)).unwrap();
        assert_eq!(&buf[..len], &[v2::BREATHING, 0x01, 0x28, 1, 0, 0x80, 0x80]);
    }

    #[test]
    fn test_unknown_effect_is_none() {
        assert_eq!(parse_effect_v1(&[0x05, 0, 0]).unwrap(), None);
        assert_eq!(parse_effect_v2(&[0x09, 0x01, 0x28, 0]).unwrap(), None);
    }

    #[test]
    fn test_truncated_color_is_corrupt() {
        assert!(parse_effect_v2(&[v2::STATIC, 0x01, 0x28, 1, 0xFF])
            .unwrap_err()
            .is_corruption());
        assert!(parse_effect_v2(&[v2::WAVE, 0x01]).unwrap_err().is_corruption());
        assert!(parse_effect_v1(&[]).unwrap_err().is_corruption());
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buf = [0u8; 4];
        assert!(matches!(
            write_effect_v2(&mut buf, &LightingEffect::StaticColor(RED)),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }
}
