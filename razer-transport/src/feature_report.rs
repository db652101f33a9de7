//! Feature-report transport
//!
//! Every request runs under one FIFO lock that also owns the command buffer:
//! write the command with Set-Feature, then poll Get-Feature until the device
//! reports a final status. The buffer is cleared whenever the lock is
//! released, including when the request future is dropped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::command::{Command, CommandBuffer, DeviceResponse, ResponseState};
use crate::dpi::{self, DpiPresetFormat, DpiProfileSet, Endianness};
use crate::effect::{self, LightingEffect, MAX_EFFECT_SIZE};
use crate::error::{ProtocolError, Result};
use crate::poll::{PollStep, PollTiming, ResponsePoller};
use crate::protocol::{
    communication_id, offset, timing, Feature, ResponseStatus, MAX_PAIRED_DEVICES,
    MAX_PAYLOAD_SIZE,
};
use crate::types::{
    DotsPerInch, FirmwareVersion, LedId, PairedDeviceInformation, RgbColor, TransportKind,
};
use crate::RazerProtocol;

/// Raw Set-Feature / Get-Feature access to a device
///
/// Buffers include the report ID at index 0.
#[async_trait]
pub trait FeatureReportChannel: Send + Sync {
    async fn set_feature(&self, report: &[u8]) -> Result<()>;

    async fn get_feature(&self, report: &mut [u8]) -> Result<()>;
}

/// Lock guard that wipes the command buffer on release
struct BufferGuard<'a>(MutexGuard<'a, CommandBuffer>);

impl Deref for BufferGuard<'_> {
    type Target = CommandBuffer;

    fn deref(&self) -> &CommandBuffer {
        &self.0
    }
}

impl DerefMut for BufferGuard<'_> {
    fn deref_mut(&mut self) -> &mut CommandBuffer {
        &mut self.0
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Request/response transport over HID feature reports
pub struct FeatureReportTransport<C> {
    channel: C,
    buffer: Mutex<CommandBuffer>,
    timing: PollTiming,
    error_retry_budget: u32,
    closed: AtomicBool,
}

/// Command with the default communication ID
fn command(feature: Feature, function: u8, data_length: u8) -> Command {
    Command::new(communication_id::DEFAULT, feature, function, data_length)
}

fn read_string(frame: &[u8]) -> String {
    let value = &frame[offset::PAYLOAD..offset::CHECKSUM];
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    String::from_utf8_lossy(&value[..end]).into_owned()
}

fn read_be_u16(frame: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([frame[at], frame[at + 1]])
}

impl<C: FeatureReportChannel> FeatureReportTransport<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            buffer: Mutex::new(CommandBuffer::new()),
            timing: PollTiming::default(),
            error_retry_budget: 0,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Extra polls granted after a `Failure` status, for every operation
    /// except the handshake
    pub fn with_error_retry_budget(mut self, budget: u32) -> Self {
        self.error_retry_budget = budget;
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Reject all further requests. In-flight requests finish normally.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn lock(&self) -> Result<BufferGuard<'_>> {
        if self.is_closed() {
            return Err(ProtocolError::Closed);
        }
        Ok(BufferGuard(self.buffer.lock().await))
    }

    /// Send `command` and wait for a successful, checksum-verified response
    pub async fn execute(
        &self,
        command: &Command,
        error_retry_budget: u32,
    ) -> Result<DeviceResponse> {
        self.execute_with(command, error_retry_budget, |frame| {
            Ok(DeviceResponse::from_frame(frame))
        })
        .await
    }

    /// Like [`execute`](Self::execute), decoding the response in place before
    /// the buffer is cleared
    pub async fn execute_with<T, F>(
        &self,
        command: &Command,
        error_retry_budget: u32,
        decode: F,
    ) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T> + Send,
        T: Send,
    {
        let mut buffer = self.lock().await?;
        buffer.write_command(command)?;

        let header = &command.header;
        debug!(
            "Sending {} function 0x{:02X}: {:02X?}",
            header.feature,
            header.function,
            &buffer.as_slice()[offset::COMMUNICATION_ID..offset::PAYLOAD + command.payload.len()]
        );
        self.channel.set_feature(buffer.as_slice()).await?;

        let mut poller = ResponsePoller::new(error_retry_budget, self.timing);
        let mut step = poller.start();
        loop {
            match step {
                PollStep::Poll { after } => {
                    tokio::time::sleep(after).await;
                    buffer.clear();
                    self.channel.get_feature(buffer.as_mut_slice()).await?;
                    let state = buffer.classify(header);
                    if matches!(state, ResponseState::MustRetry | ResponseState::Failure) {
                        debug!(
                            "{} function 0x{:02X}: {:?} after {} poll(s)",
                            header.feature,
                            header.function,
                            state,
                            poller.polls() + 1
                        );
                    }
                    step = poller.on_response(state);
                }
                PollStep::Done(result) => {
                    result?;
                    return decode(buffer.as_slice());
                }
            }
        }
    }

    /// Write a command that the device does not answer
    pub async fn send(&self, command: &Command) -> Result<()> {
        let mut buffer = self.lock().await?;
        buffer.write_command(command)?;
        debug!(
            "Sending {} function 0x{:02X} (no response)",
            command.header.feature, command.header.function
        );
        self.channel.set_feature(buffer.as_slice()).await
    }

    async fn query<T, F>(&self, command: Command, decode: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T + Send,
        T: Send,
    {
        self.execute_with(&command, self.error_retry_budget, |frame| Ok(decode(frame)))
            .await
    }

    async fn apply(&self, command: Command) -> Result<()> {
        self.execute_with(&command, self.error_retry_budget, |_| Ok(()))
            .await
    }

    async fn dpi_presets(
        &self,
        comm_id: u8,
        function: u8,
        format: DpiPresetFormat,
    ) -> Result<DpiProfileSet> {
        let command = Command::new(comm_id, Feature::Mouse, function, 0x26).with_payload([1]);
        self.execute_with(&command, self.error_retry_budget, |frame| {
            dpi::parse_dpi_presets(&frame[offset::PAYLOAD + 1..offset::CHECKSUM], format)
        })
        .await
    }

    async fn set_dpi_presets(
        &self,
        comm_id: u8,
        function: u8,
        format: DpiPresetFormat,
        persist: bool,
        presets: &DpiProfileSet,
    ) -> Result<()> {
        let mut payload = [0u8; MAX_PAYLOAD_SIZE];
        payload[0] = persist as u8;
        let length = dpi::write_dpi_presets(&mut payload[1..], format, presets)?;
        let command = Command::new(comm_id, Feature::Mouse, function, 0x26)
            .with_payload(&payload[..1 + length]);
        self.apply(command).await
    }
}

#[async_trait]
impl<C: FeatureReportChannel> RazerProtocol for FeatureReportTransport<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::FeatureReport
    }

    async fn handshake(&self) -> Result<bool> {
        let command = Command::new(communication_id::GENERAL, Feature::General, 0x86, 0x02);
        match self
            .execute_with(&command, timing::HANDSHAKE_ERROR_RETRIES, |_| Ok(()))
            .await
        {
            Ok(()) => Ok(true),
            Err(ProtocolError::DeviceUnreachable)
            | Err(ProtocolError::Rejected {
                status: ResponseStatus::Failure,
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn serial_number(&self) -> Result<String> {
        let command = Command::new(communication_id::GENERAL, Feature::General, 0x82, 0x16);
        self.query(command, read_string).await
    }

    async fn dock_serial_number(&self) -> Result<String> {
        let command = Command::new(communication_id::GENERAL, Feature::General, 0x92, 0x16);
        self.query(command, read_string).await
    }

    async fn firmware_version(&self) -> Result<FirmwareVersion> {
        self.query(command(Feature::General, 0x87, 0x31), |frame| FirmwareVersion {
            major: frame[9],
            minor: frame[10],
            build: frame[11],
            revision: frame[12],
        })
        .await
    }

    async fn device_information(&self) -> Result<PairedDeviceInformation> {
        self.query(command(Feature::General, 0xC5, 0x31), |frame| {
            PairedDeviceInformation {
                is_connected: frame[9] == 1,
                product_id: read_be_u16(frame, 10),
            }
        })
        .await
    }

    async fn device_pairing_information(&self) -> Result<Vec<PairedDeviceInformation>> {
        let command = Command::new(communication_id::GENERAL, Feature::General, 0xBF, 0x31)
            .with_payload([0x10]);
        self.execute_with(&command, self.error_retry_budget, |frame| {
            let count = frame[9] as usize;
            if count > MAX_PAIRED_DEVICES {
                return Err(ProtocolError::invalid_payload(format!(
                    "{count} paired devices cannot fit in one response"
                )));
            }
            Ok((0..count)
                .map(|i| {
                    let at = 10 + 3 * i;
                    PairedDeviceInformation {
                        is_connected: frame[at] == 1,
                        product_id: read_be_u16(frame, at + 1),
                    }
                })
                .collect())
        })
        .await
    }

    async fn device_mode(&self) -> Result<u8> {
        self.query(command(Feature::General, 0x84, 0x02), |frame| frame[9])
            .await
    }

    async fn set_device_mode(&self, mode: u8) -> Result<()> {
        self.apply(command(Feature::General, 0x04, 0x02).with_payload([mode, 0]))
            .await
    }

    async fn polling_interval(&self) -> Result<u8> {
        self.query(command(Feature::General, 0x85, 0x01), |frame| frame[9])
            .await
    }

    async fn set_polling_interval(&self, divider: u8) -> Result<()> {
        self.apply(command(Feature::General, 0x05, 0x01).with_payload([divider]))
            .await
    }

    async fn battery_level(&self) -> Result<u8> {
        self.query(command(Feature::Power, 0x80, 0x02), |frame| frame[10])
            .await
    }

    async fn is_connected_to_external_power(&self) -> Result<bool> {
        self.query(command(Feature::Power, 0x84, 0x02), |frame| {
            frame[10] & 1 != 0
        })
        .await
    }

    async fn low_power_threshold(&self) -> Result<u8> {
        self.query(command(Feature::Power, 0x81, 0x01), |frame| frame[9])
            .await
    }

    async fn set_low_power_threshold(&self, value: u8) -> Result<()> {
        self.apply(command(Feature::Power, 0x01, 0x01).with_payload([value]))
            .await
    }

    async fn idle_timer(&self) -> Result<u16> {
        self.query(command(Feature::Power, 0x83, 0x02), |frame| {
            read_be_u16(frame, 9)
        })
        .await
    }

    async fn set_idle_timer(&self, seconds: u16) -> Result<()> {
        // Devices accept the two value bytes with a declared length of 1
        self.apply(command(Feature::Power, 0x03, 0x01).with_payload(seconds.to_be_bytes()))
            .await
    }

    async fn dpi(&self, persisted: bool) -> Result<DotsPerInch> {
        let command = command(Feature::Mouse, 0x85, 0x07).with_payload([persisted as u8]);
        self.execute_with(&command, self.error_retry_budget, |frame| {
            dpi::parse_dpi(&frame[10..], Endianness::Big)
        })
        .await
    }

    async fn set_dpi(&self, persist: bool, value: DotsPerInch) -> Result<()> {
        let mut payload = [0u8; 7];
        payload[0] = persist as u8;
        dpi::write_dpi(&mut payload[1..], value, Endianness::Big)?;
        self.apply(command(Feature::Mouse, 0x05, 0x07).with_payload(payload))
            .await
    }

    async fn current_dpi_preset(&self, persisted: bool) -> Result<u8> {
        let command = command(Feature::Mouse, 0x84, 0x02).with_payload([persisted as u8]);
        self.query(command, |frame| frame[10]).await
    }

    async fn set_current_dpi_preset(&self, persist: bool, index: u8) -> Result<()> {
        self.apply(command(Feature::Mouse, 0x04, 0x02).with_payload([persist as u8, index]))
            .await
    }

    async fn dpi_presets_v1(&self) -> Result<DpiProfileSet> {
        self.dpi_presets(communication_id::LEGACY_DPI, 0x83, DpiPresetFormat::USB_V1)
            .await
    }

    async fn set_dpi_presets_v1(&self, persist: bool, presets: &DpiProfileSet) -> Result<()> {
        self.set_dpi_presets(
            communication_id::LEGACY_DPI,
            0x03,
            DpiPresetFormat::USB_V1,
            persist,
            presets,
        )
        .await
    }

    async fn dpi_presets_v2(&self) -> Result<DpiProfileSet> {
        self.dpi_presets(communication_id::DEFAULT, 0x86, DpiPresetFormat::USB_V2)
            .await
    }

    async fn set_dpi_presets_v2(&self, persist: bool, presets: &DpiProfileSet) -> Result<()> {
        self.set_dpi_presets(
            communication_id::DEFAULT,
            0x06,
            DpiPresetFormat::USB_V2,
            persist,
            presets,
        )
        .await
    }

    async fn brightness_v1(&self, led: LedId) -> Result<u8> {
        let command = command(Feature::LightingV1, 0x83, 0x03).with_payload([1, led.0]);
        self.query(command, |frame| frame[11]).await
    }

    async fn set_brightness_v1(&self, led: LedId, value: u8) -> Result<()> {
        self.apply(command(Feature::LightingV1, 0x03, 0x03).with_payload([1, led.0, value]))
            .await
    }

    async fn is_led_enabled_v1(&self, led: LedId) -> Result<bool> {
        let command = command(Feature::LightingV1, 0x80, 0x03).with_payload([1, led.0]);
        self.query(command, |frame| frame[11] != 0).await
    }

    async fn set_led_enabled_v1(&self, led: LedId, enable: bool) -> Result<()> {
        self.apply(
            command(Feature::LightingV1, 0x00, 0x03).with_payload([1, led.0, enable as u8]),
        )
        .await
    }

    async fn set_static_color_v1(&self, led: LedId, color: RgbColor) -> Result<()> {
        self.apply(
            command(Feature::LightingV1, 0x01, 0x05)
                .with_payload([1, led.0, color.r, color.g, color.b]),
        )
        .await
    }

    async fn is_synchronized_lighting_v1(&self, led: LedId) -> Result<bool> {
        let command = command(Feature::LightingV1, 0x8F, 0x03).with_payload([1, led.0]);
        self.query(command, |frame| frame[11] != 0).await
    }

    async fn set_synchronized_lighting_v1(&self, led: LedId, enable: bool) -> Result<()> {
        self.apply(
            command(Feature::LightingV1, 0x0F, 0x03).with_payload([1, led.0, enable as u8]),
        )
        .await
    }

    async fn effect_v1(&self) -> Result<Option<LightingEffect>> {
        // Saved effects come back in the V2 layout even on legacy devices
        let command = command(Feature::LightingV1, 0x8A, 0x08);
        self.execute_with(&command, self.error_retry_budget, |frame| {
            effect::parse_effect_v2(&frame[offset::PAYLOAD..offset::CHECKSUM])
        })
        .await
    }

    async fn set_effect_v1(&self, value: &LightingEffect) -> Result<()> {
        let mut payload = [0u8; MAX_EFFECT_SIZE];
        let length = effect::write_effect_v1(&mut payload, value)?;
        self.apply(
            command(Feature::LightingV1, 0x0A, length as u8).with_payload(&payload[..length]),
        )
        .await
    }

    async fn brightness_v2(&self, persisted: bool, led: LedId) -> Result<u8> {
        let command =
            command(Feature::LightingV2, 0x84, 0x01).with_payload([persisted as u8, led.0]);
        self.query(command, |frame| frame[11]).await
    }

    async fn set_brightness_v2(&self, persist: bool, value: u8) -> Result<()> {
        self.apply(
            command(Feature::LightingV2, 0x04, 0x03).with_payload([persist as u8, 0, value]),
        )
        .await
    }

    async fn lighting_zone_ids(&self) -> Result<Vec<LedId>> {
        self.query(command(Feature::LightingV2, 0x80, 0x32), |frame| {
            let length = (frame[offset::DATA_LENGTH] as usize).min(MAX_PAYLOAD_SIZE);
            frame[offset::PAYLOAD..offset::PAYLOAD + length]
                .chunks_exact(5)
                .map(|zone| LedId(zone[0]))
                .collect()
        })
        .await
    }

    async fn effect_v2(&self, persisted: bool, led: LedId) -> Result<Option<LightingEffect>> {
        let command =
            command(Feature::LightingV2, 0x82, 0x0C).with_payload([persisted as u8, led.0]);
        self.execute_with(&command, self.error_retry_budget, |frame| {
            effect::parse_effect_v2(&frame[11..offset::CHECKSUM])
        })
        .await
    }

    async fn set_effect_v2(&self, persist: bool, value: &LightingEffect) -> Result<()> {
        let mut payload = [0u8; 2 + MAX_EFFECT_SIZE];
        payload[0] = persist as u8;
        let length = effect::write_effect_v2(&mut payload[2..], value)?;
        self.apply(command(Feature::LightingV2, 0x02, 0x0C).with_payload(&payload[..2 + length]))
            .await
    }

    async fn set_dynamic_color(&self, color: RgbColor) -> Result<()> {
        let payload = [0, 0, 0, 0, 0, color.r, color.g, color.b];
        self.send(&command(Feature::LightingV2, 0x03, 0x08).with_payload(payload))
            .await
    }

    async fn sensor_state(&self, parameter1: u8, parameter2: u8) -> Result<u8> {
        let command = command(Feature::Sensor, 0x83, 0x03).with_payload([parameter1, parameter2]);
        self.query(command, |frame| frame[11]).await
    }

    async fn set_sensor_state(&self, parameter1: u8, parameter2: u8, value: u8) -> Result<()> {
        self.apply(
            command(Feature::Sensor, 0x03, 0x03).with_payload([parameter1, parameter2, value]),
        )
        .await
    }
}
