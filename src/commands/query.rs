//! Query (read-only) command handlers.

use super::{optional, CommandResult, Context};
use razer_transport::{LedId, LightingEffect, RazerProtocol};
use serde::Serialize;

#[derive(Serialize)]
struct DeviceInfo {
    serial_number: String,
    firmware_version: Option<String>,
    device_mode: Option<u8>,
    paired_devices: Option<Vec<razer_transport::PairedDeviceInformation>>,
    lighting_zones: Option<Vec<LedId>>,
}

/// Handshake and print identity information
pub async fn info(ctx: &Context) -> CommandResult {
    let device = ctx.open()?;
    if !device.handshake().await? {
        return Err("device did not answer the handshake".into());
    }

    let info = DeviceInfo {
        serial_number: device.serial_number().await?,
        firmware_version: optional(device.firmware_version().await)?.map(|v| v.to_string()),
        device_mode: optional(device.device_mode().await)?,
        paired_devices: optional(device.device_pairing_information().await)?,
        lighting_zones: optional(device.lighting_zone_ids().await)?,
    };

    let mut text = format!("Serial:   {}", info.serial_number);
    if let Some(version) = &info.firmware_version {
        text += &format!("\nFirmware: {version}");
    }
    if let Some(mode) = info.device_mode {
        text += &format!("\nMode:     0x{mode:02X}");
    }
    if let Some(paired) = &info.paired_devices {
        text += &format!("\nPaired:   {} device(s)", paired.len());
        for (i, dev) in paired.iter().enumerate() {
            text += &format!(
                "\n  {}: PID {:04X} {}",
                i + 1,
                dev.product_id,
                if dev.is_connected { "connected" } else { "offline" }
            );
        }
    }
    if let Some(zones) = &info.lighting_zones {
        let names: Vec<String> = zones.iter().map(LedId::to_string).collect();
        text += &format!("\nZones:    {}", names.join(", "));
    }
    ctx.emit(&info, text)
}

#[derive(Serialize)]
struct BatteryStatus {
    level: u8,
    percent: u8,
    charging: Option<bool>,
}

/// Get battery level (0-255 on the wire) and charging state
pub async fn battery(ctx: &Context) -> CommandResult {
    let device = ctx.open()?;
    let level = device.battery_level().await?;
    let status = BatteryStatus {
        level,
        percent: (level as u16 * 100 / 255) as u8,
        charging: optional(device.is_connected_to_external_power().await)?,
    };

    let mut text = format!("Battery: {}%", status.percent);
    match status.charging {
        Some(true) => text += " (charging)",
        Some(false) => text += " (discharging)",
        None => {}
    }
    ctx.emit(&status, text)
}

pub async fn dpi(ctx: &Context, persisted: bool) -> CommandResult {
    let device = ctx.open()?;
    let dpi = device.dpi(persisted).await?;
    ctx.emit(&dpi, format!("DPI: {dpi}"))
}

pub async fn presets(ctx: &Context, v1: bool) -> CommandResult {
    let device = ctx.open()?;
    let set = if v1 {
        device.dpi_presets_v1().await?
    } else {
        device.dpi_presets_v2().await?
    };

    let mut text = format!("DPI presets ({}):", set.presets.len());
    for (i, preset) in set.presets.iter().enumerate() {
        let marker = if i + 1 == set.active_preset as usize { '*' } else { ' ' };
        text += &format!("\n {marker}{}: {}", i + 1, preset.dpi());
    }
    ctx.emit(&set, text)
}

/// Zone used when none is given on the command line
pub fn default_led(v1: bool) -> LedId {
    if v1 {
        LedId::BACKLIGHT
    } else {
        LedId::ZERO
    }
}

pub async fn brightness(
    ctx: &Context,
    led: Option<LedId>,
    v1: bool,
    persisted: bool,
) -> CommandResult {
    let device = ctx.open()?;
    let led = led.unwrap_or_else(|| default_led(v1));
    let value = if v1 {
        device.brightness_v1(led).await?
    } else {
        device.brightness_v2(persisted, led).await?
    };
    ctx.emit(&value, format!("Brightness ({led}): {value}/255"))
}

fn describe_effect(effect: &LightingEffect) -> String {
    match effect {
        LightingEffect::StaticColor(c)
        | LightingEffect::ColorPulse(c)
        | LightingEffect::Reactive(c) => format!("{} {c}", effect.name()),
        LightingEffect::TwoColorPulse(a, b) => format!("{} {a} {b}", effect.name()),
        _ => effect.name().to_string(),
    }
}

pub async fn effect(
    ctx: &Context,
    led: Option<LedId>,
    v1: bool,
    persisted: bool,
) -> CommandResult {
    let device = ctx.open()?;
    let led = led.unwrap_or_else(|| default_led(v1));
    let effect = if v1 {
        device.effect_v1().await?
    } else {
        device.effect_v2(persisted, led).await?
    };
    let text = match &effect {
        Some(effect) => format!("Effect: {}", describe_effect(effect)),
        None => "Effect: unknown".to_string(),
    };
    ctx.emit(&effect, text)
}

pub async fn polling(ctx: &Context) -> CommandResult {
    let device = ctx.open()?;
    let divider = device.polling_interval().await?;
    let hz = 1000 / divider.max(1) as u32;
    ctx.emit(&hz, format!("Polling rate: {hz} Hz (divider {divider})"))
}

pub async fn idle(ctx: &Context) -> CommandResult {
    let device = ctx.open()?;
    let seconds = device.idle_timer().await?;
    ctx.emit(&seconds, format!("Idle timer: {seconds} s"))
}
