//! Protocol transport for Razer mice, receivers and docks
//!
//! The same command set is spoken over two very different channels:
//!
//! - HID feature reports (USB cable, 2.4 GHz receivers, docks): lock-step
//!   Set-Feature / Get-Feature with status polling, see [`FeatureReportTransport`]
//! - Bluetooth LE GATT: command writes answered by push notifications that are
//!   reassembled from fragments, see [`BluetoothLeTransport`]
//!
//! Both implement [`RazerProtocol`]. Unsolicited device events are read by the
//! notification loop in [`event_parser`].

pub mod bluetooth;
pub mod command;
pub mod dpi;
pub mod effect;
pub mod error;
pub mod event_parser;
pub mod feature_report;
pub mod poll;
pub mod protocol;
pub mod types;
pub mod wait_state;

mod hid_feature;

pub use bluetooth::{pump_notifications, BluetoothLeTransport, GattWriter};
pub use command::{
    build_command, classify_response, compute_checksum, validate_checksum, Command,
    CommandBuffer, CommandHeader, DeviceResponse, ResponseState,
};
pub use dpi::{DpiPreset, DpiPresetFormat, DpiProfileSet, Endianness};
pub use effect::LightingEffect;
pub use error::{Corruption, ProtocolError};
pub use event_parser::{
    parse_notification, run_notification_loop, strip_report_id, BroadcastSink,
    DeviceNotification, LoopExit, NotificationOptions, NotificationSink, NotificationWatcher,
    TimestampedNotification,
};
pub use feature_report::{FeatureReportChannel, FeatureReportTransport};
pub use hid_feature::HidFeatureChannel;
pub use poll::{PollTiming, ResponsePoller};
pub use protocol::{Feature, ResponseStatus};
pub use types::{
    DotsPerInch, FirmwareVersion, LedId, PairedDeviceInformation, RgbColor, TransportKind,
};
pub use wait_state::{WaitHandle, WaitSlot, WaitState};

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use error::Result;

/// Operations exposed to the device layer
///
/// Every operation resolves to exactly one outcome. Operations a transport
/// cannot perform return [`ProtocolError::NotSupported`]. `persisted` selects
/// the value saved on the device rather than the live one; `persist` writes
/// it there as well.
#[async_trait]
#[allow(unused_variables)]
pub trait RazerProtocol: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Probe the device. `false` means it answered but is not usable.
    async fn handshake(&self) -> Result<bool>;

    async fn serial_number(&self) -> Result<String>;

    async fn dock_serial_number(&self) -> Result<String> {
        Err(ProtocolError::NotSupported("dock serial number"))
    }

    async fn firmware_version(&self) -> Result<FirmwareVersion> {
        Err(ProtocolError::NotSupported("firmware version"))
    }

    async fn device_information(&self) -> Result<PairedDeviceInformation> {
        Err(ProtocolError::NotSupported("device information"))
    }

    /// Devices paired to a receiver or dock
    async fn device_pairing_information(&self) -> Result<Vec<PairedDeviceInformation>> {
        Err(ProtocolError::NotSupported("pairing information"))
    }

    async fn device_mode(&self) -> Result<u8> {
        Err(ProtocolError::NotSupported("device mode"))
    }

    async fn set_device_mode(&self, mode: u8) -> Result<()> {
        Err(ProtocolError::NotSupported("device mode"))
    }

    /// Polling rate divider (1 = 1000 Hz, 2 = 500 Hz, 8 = 125 Hz)
    async fn polling_interval(&self) -> Result<u8> {
        Err(ProtocolError::NotSupported("polling interval"))
    }

    async fn set_polling_interval(&self, divider: u8) -> Result<()> {
        Err(ProtocolError::NotSupported("polling interval"))
    }

    async fn battery_level(&self) -> Result<u8> {
        Err(ProtocolError::NotSupported("battery level"))
    }

    async fn is_connected_to_external_power(&self) -> Result<bool> {
        Err(ProtocolError::NotSupported("external power"))
    }

    async fn low_power_threshold(&self) -> Result<u8> {
        Err(ProtocolError::NotSupported("low power threshold"))
    }

    async fn set_low_power_threshold(&self, value: u8) -> Result<()> {
        Err(ProtocolError::NotSupported("low power threshold"))
    }

    /// Idle time before sleep, in seconds
    async fn idle_timer(&self) -> Result<u16> {
        Err(ProtocolError::NotSupported("idle timer"))
    }

    async fn set_idle_timer(&self, seconds: u16) -> Result<()> {
        Err(ProtocolError::NotSupported("idle timer"))
    }

    async fn dpi(&self, persisted: bool) -> Result<DotsPerInch> {
        Err(ProtocolError::NotSupported("DPI"))
    }

    async fn set_dpi(&self, persist: bool, dpi: DotsPerInch) -> Result<()> {
        Err(ProtocolError::NotSupported("DPI"))
    }

    async fn current_dpi_preset(&self, persisted: bool) -> Result<u8> {
        Err(ProtocolError::NotSupported("current DPI preset"))
    }

    async fn set_current_dpi_preset(&self, persist: bool, index: u8) -> Result<()> {
        Err(ProtocolError::NotSupported("current DPI preset"))
    }

    async fn dpi_presets_v1(&self) -> Result<DpiProfileSet> {
        Err(ProtocolError::NotSupported("DPI presets (v1)"))
    }

    async fn set_dpi_presets_v1(&self, persist: bool, presets: &DpiProfileSet) -> Result<()> {
        Err(ProtocolError::NotSupported("DPI presets (v1)"))
    }

    async fn dpi_presets_v2(&self) -> Result<DpiProfileSet> {
        Err(ProtocolError::NotSupported("DPI presets (v2)"))
    }

    async fn set_dpi_presets_v2(&self, persist: bool, presets: &DpiProfileSet) -> Result<()> {
        Err(ProtocolError::NotSupported("DPI presets (v2)"))
    }

    async fn brightness_v1(&self, led: LedId) -> Result<u8> {
        Err(ProtocolError::NotSupported("brightness (v1)"))
    }

    async fn set_brightness_v1(&self, led: LedId, value: u8) -> Result<()> {
        Err(ProtocolError::NotSupported("brightness (v1)"))
    }

    async fn is_led_enabled_v1(&self, led: LedId) -> Result<bool> {
        Err(ProtocolError::NotSupported("LED state (v1)"))
    }

    async fn set_led_enabled_v1(&self, led: LedId, enable: bool) -> Result<()> {
        Err(ProtocolError::NotSupported("LED state (v1)"))
    }

    async fn set_static_color_v1(&self, led: LedId, color: RgbColor) -> Result<()> {
        Err(ProtocolError::NotSupported("static color (v1)"))
    }

    async fn is_synchronized_lighting_v1(&self, led: LedId) -> Result<bool> {
        Err(ProtocolError::NotSupported("synchronized lighting (v1)"))
    }

    async fn set_synchronized_lighting_v1(&self, led: LedId, enable: bool) -> Result<()> {
        Err(ProtocolError::NotSupported("synchronized lighting (v1)"))
    }

    /// Saved effect of a legacy device. `None` when the effect is not one
    /// this crate models.
    async fn effect_v1(&self) -> Result<Option<LightingEffect>> {
        Err(ProtocolError::NotSupported("effect (v1)"))
    }

    async fn set_effect_v1(&self, effect: &LightingEffect) -> Result<()> {
        Err(ProtocolError::NotSupported("effect (v1)"))
    }

    async fn brightness_v2(&self, persisted: bool, led: LedId) -> Result<u8> {
        Err(ProtocolError::NotSupported("brightness (v2)"))
    }

    async fn set_brightness_v2(&self, persist: bool, value: u8) -> Result<()> {
        Err(ProtocolError::NotSupported("brightness (v2)"))
    }

    async fn lighting_zone_ids(&self) -> Result<Vec<LedId>> {
        Err(ProtocolError::NotSupported("lighting zones"))
    }

    async fn effect_v2(&self, persisted: bool, led: LedId) -> Result<Option<LightingEffect>> {
        Err(ProtocolError::NotSupported("effect (v2)"))
    }

    async fn set_effect_v2(&self, persist: bool, effect: &LightingEffect) -> Result<()> {
        Err(ProtocolError::NotSupported("effect (v2)"))
    }

    /// Host-driven color, not saved and not acknowledged
    async fn set_dynamic_color(&self, color: RgbColor) -> Result<()> {
        Err(ProtocolError::NotSupported("dynamic color"))
    }

    /// Opaque sensor register addressed by two parameter bytes
    async fn sensor_state(&self, parameter1: u8, parameter2: u8) -> Result<u8> {
        Err(ProtocolError::NotSupported("sensor state"))
    }

    async fn set_sensor_state(&self, parameter1: u8, parameter2: u8, value: u8) -> Result<()> {
        Err(ProtocolError::NotSupported("sensor state"))
    }
}

/// Run `future` until it completes or `token` fires
///
/// Dropping the operation future is what releases the transport lock and
/// clears its buffers, so a fired token leaves the transport usable.
pub async fn cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProtocolError::Cancelled),
        result = future => result,
    }
}
