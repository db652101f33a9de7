//! Setting command handlers.

use super::query::default_led;
use super::{CommandResult, Context};
use razer_transport::{
    DotsPerInch, DpiPreset, DpiProfileSet, LedId, LightingEffect, RazerProtocol, RgbColor,
};

pub async fn set_dpi(ctx: &Context, x: u16, y: Option<u16>, persist: bool) -> CommandResult {
    let device = ctx.open()?;
    let dpi = DotsPerInch::new(x, y.unwrap_or(x));
    device.set_dpi(persist, dpi).await?;
    println!("DPI set to {dpi}");
    Ok(())
}

/// Parse `800,1600x1200,3200` into presets
pub fn parse_presets(list: &str) -> Result<Vec<DpiPreset>, String> {
    list.split(',')
        .map(|item| -> Result<DpiPreset, String> {
            let item = item.trim();
            let (x, y) = item.split_once(['x', 'X']).unwrap_or((item, item));
            let parse = |v: &str| {
                v.trim()
                    .parse::<u16>()
                    .map_err(|_| format!("invalid DPI preset '{item}'"))
            };
            Ok(DpiPreset::new(parse(x)?, parse(y)?))
        })
        .collect()
}

pub async fn set_presets(
    ctx: &Context,
    active: u8,
    list: &str,
    v1: bool,
    persist: bool,
) -> CommandResult {
    let set = DpiProfileSet::new(active, parse_presets(list)?);
    let device = ctx.open()?;
    if v1 {
        device.set_dpi_presets_v1(persist, &set).await?;
    } else {
        device.set_dpi_presets_v2(persist, &set).await?;
    }
    println!("Stored {} DPI preset(s), active {}", set.presets.len(), active);
    Ok(())
}

pub async fn set_brightness(
    ctx: &Context,
    value: u8,
    led: Option<LedId>,
    v1: bool,
    persist: bool,
) -> CommandResult {
    let device = ctx.open()?;
    if v1 {
        let led = led.unwrap_or_else(|| default_led(true));
        device.set_brightness_v1(led, value).await?;
    } else {
        device.set_brightness_v2(persist, value).await?;
    }
    println!("Brightness set to {value}/255");
    Ok(())
}

/// Build an effect from its CLI name and colors
pub fn parse_effect(kind: &str, colors: &[String]) -> Result<LightingEffect, String> {
    let colors = colors
        .iter()
        .map(|c| c.parse::<RgbColor>())
        .collect::<Result<Vec<_>, _>>()?;
    let expect = |count: usize| {
        if colors.len() == count {
            Ok(())
        } else {
            Err(format!("effect '{kind}' takes {count} color(s), got {}", colors.len()))
        }
    };

    let effect = match kind.to_ascii_lowercase().as_str() {
        "disabled" | "off" => LightingEffect::Disabled,
        "static" => {
            expect(1)?;
            LightingEffect::StaticColor(colors[0])
        }
        "pulse" | "breathing" => {
            expect(1)?;
            LightingEffect::ColorPulse(colors[0])
        }
        "two-color-pulse" => {
            expect(2)?;
            LightingEffect::TwoColorPulse(colors[0], colors[1])
        }
        "random-pulse" => LightingEffect::RandomColorPulse,
        "spectrum" => LightingEffect::SpectrumCycle,
        "wave" => LightingEffect::SpectrumWave,
        "reactive" => {
            expect(1)?;
            LightingEffect::Reactive(colors[0])
        }
        other => return Err(format!("unknown effect '{other}'")),
    };
    if matches!(
        effect,
        LightingEffect::Disabled
            | LightingEffect::RandomColorPulse
            | LightingEffect::SpectrumCycle
            | LightingEffect::SpectrumWave
    ) {
        expect(0)?;
    }
    Ok(effect)
}

pub async fn set_effect(
    ctx: &Context,
    kind: &str,
    colors: &[String],
    v1: bool,
    persist: bool,
) -> CommandResult {
    let effect = parse_effect(kind, colors)?;
    let device = ctx.open()?;
    if v1 {
        device.set_effect_v1(&effect).await?;
    } else {
        device.set_effect_v2(persist, &effect).await?;
    }
    println!("Effect set to {}", effect.name());
    Ok(())
}

pub async fn set_polling(ctx: &Context, divider: u8) -> CommandResult {
    let device = ctx.open()?;
    device.set_polling_interval(divider).await?;
    println!("Polling rate set to {} Hz", 1000 / divider as u32);
    Ok(())
}

pub async fn set_idle(ctx: &Context, seconds: u16) -> CommandResult {
    let device = ctx.open()?;
    device.set_idle_timer(seconds).await?;
    println!("Idle timer set to {seconds} s");
    Ok(())
}
