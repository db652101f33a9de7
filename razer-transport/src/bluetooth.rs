//! Bluetooth LE transport
//!
//! Commands are written to the GATT write characteristic as an 8-byte header
//! followed by the body in fragments of at most 20 bytes:
//!
//! ```text
//! [cmd][body length][0][0][feature][function][arg0][arg1]
//! ```
//!
//! Responses arrive as notifications on the read characteristic and are fed
//! to [`BluetoothLeTransport::handle_notification`] (or through
//! [`pump_notifications`]). A read response starts with `[cmd][length]`, its
//! payload following in later fragments; a write is acknowledged with
//! `[cmd][0x00]`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::dpi::{self, DpiPresetFormat, DpiProfileSet, Endianness};
use crate::effect::{self, LightingEffect, MAX_EFFECT_SIZE};
use crate::error::{ProtocolError, Result};
use crate::protocol::ble::{self, cmd, feature};
use crate::types::{DotsPerInch, LedId, TransportKind};
use crate::wait_state::{WaitHandle, WaitSlot, WaitState};
use crate::RazerProtocol;

/// Smallest accepted per-request timeout
const MIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Write access to the command characteristic
#[async_trait]
pub trait GattWriter: Send + Sync {
    /// Write one fragment (at most [`ble::MAX_FRAGMENT_SIZE`] bytes)
    async fn write(&self, fragment: &[u8]) -> Result<()>;
}

/// Command header written before any body bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BleCommandHeader {
    pub command_id: u8,
    pub body_length: u8,
    pub reserved: [u8; 2],
    pub feature: u8,
    pub function: u8,
    pub arguments: [u8; 2],
}

impl BleCommandHeader {
    pub const fn new(command_id: u8, feature: u8, function: u8, arguments: [u8; 2]) -> Self {
        Self {
            command_id,
            body_length: 0,
            reserved: [0; 2],
            feature,
            function,
            arguments,
        }
    }
}

fn first_byte(data: &[u8]) -> Result<u8> {
    data.first()
        .copied()
        .ok_or_else(|| ProtocolError::invalid_payload("empty response"))
}

fn decode_u16(data: &[u8]) -> Result<u16> {
    match data {
        [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
        _ => Err(ProtocolError::invalid_payload(format!(
            "expected 2 bytes, got {}",
            data.len()
        ))),
    }
}

fn decode_string(data: &[u8]) -> Result<String> {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Ok(String::from_utf8_lossy(&data[..end]).into_owned())
}

/// Request/response transport over BLE GATT
pub struct BluetoothLeTransport<W> {
    writer: W,
    lock: Mutex<()>,
    slot: Arc<WaitSlot>,
    timeout: Duration,
    closed: AtomicBool,
}

impl<W: GattWriter> BluetoothLeTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lock: Mutex::new(()),
            slot: Arc::new(WaitSlot::new()),
            timeout: Duration::from_millis(ble::DEFAULT_TIMEOUT_MS),
            closed: AtomicBool::new(false),
        }
    }

    /// Per-request deadline, at least 10 ms
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout < MIN_TIMEOUT {
            return Err(ProtocolError::InvalidArgument(format!(
                "timeout of {timeout:?} is below {MIN_TIMEOUT:?}"
            )));
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Slot to hand notifications to from another task
    pub fn notification_slot(&self) -> Arc<WaitSlot> {
        Arc::clone(&self.slot)
    }

    /// Feed one notification from the read characteristic
    pub fn handle_notification(&self, data: &[u8]) -> bool {
        self.slot.dispatch(data)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slot.clear();
    }

    async fn write_command(&self, mut header: BleCommandHeader, body: &[u8]) -> Result<()> {
        header.body_length = u8::try_from(body.len()).map_err(|_| {
            ProtocolError::InvalidArgument(format!("body of {} bytes is too long", body.len()))
        })?;
        debug!(
            "Writing BLE command 0x{:02X}: {:02X?} + {} body byte(s)",
            header.command_id,
            header.as_bytes(),
            body.len()
        );
        self.writer.write(header.as_bytes()).await?;
        for fragment in body.chunks(ble::MAX_FRAGMENT_SIZE) {
            self.writer.write(fragment).await?;
        }
        Ok(())
    }

    /// Arm `state`, write the command, and wait for the response
    async fn request<T: Send + 'static>(
        &self,
        header: BleCommandHeader,
        body: &[u8],
        state: WaitState<T>,
        handle: WaitHandle<T>,
    ) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProtocolError::Closed);
        }
        let _lock = self.lock.lock().await;
        // Armed before writing so a fast reply is not lost
        let _armed = self.slot.arm(state)?;
        self.write_command(header, body).await?;

        match tokio::time::timeout(self.timeout, handle.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "BLE command 0x{:02X} timed out after {:?}",
                    header.command_id, self.timeout
                );
                Err(ProtocolError::Timeout)
            }
        }
    }

    async fn read<T, D>(&self, header: BleCommandHeader, decode: D) -> Result<T>
    where
        T: Send + 'static,
        D: Fn(&[u8]) -> Result<T> + Send + 'static,
    {
        let (state, handle) = WaitState::new(header.command_id, decode);
        self.request(header, &[], state, handle).await
    }

    async fn write(&self, header: BleCommandHeader, body: &[u8]) -> Result<()> {
        let (state, handle) = WaitState::acknowledgement(header.command_id);
        self.request(header, body, state, handle).await
    }
}

/// Forward notifications from a GATT subscription to a transport's slot
/// until the stream ends
pub async fn pump_notifications<S>(slot: Arc<WaitSlot>, mut notifications: S)
where
    S: Stream<Item = Vec<u8>> + Unpin,
{
    debug!("BLE notification pump started");
    while let Some(data) = notifications.next().await {
        if !slot.dispatch(&data) {
            trace!("Unsolicited BLE notification: {:02X?}", data);
        }
    }
    debug!("BLE notification pump exiting");
}

#[async_trait]
impl<W: GattWriter> RazerProtocol for BluetoothLeTransport<W> {
    fn kind(&self) -> TransportKind {
        TransportKind::BluetoothLe
    }

    async fn handshake(&self) -> Result<bool> {
        Ok(true)
    }

    async fn serial_number(&self) -> Result<String> {
        let header = BleCommandHeader::new(cmd::SERIAL_NUMBER, feature::GENERAL, 0x83, [0, 0]);
        self.read(header, decode_string).await
    }

    async fn polling_interval(&self) -> Result<u8> {
        Ok(ble::POLLING_DIVIDER)
    }

    async fn battery_level(&self) -> Result<u8> {
        let header = BleCommandHeader::new(cmd::POWER_QUERY, feature::POWER, 0x81, [0, 1]);
        self.read(header, first_byte).await
    }

    async fn is_connected_to_external_power(&self) -> Result<bool> {
        let header = BleCommandHeader::new(cmd::POWER_QUERY, feature::POWER, 0x85, [0, 0]);
        self.read(header, |data| Ok(first_byte(data)? != 0)).await
    }

    async fn low_power_threshold(&self) -> Result<u8> {
        let header = BleCommandHeader::new(
            cmd::POWER_LOW_POWER_THRESHOLD,
            feature::POWER,
            0x82,
            [0, 1],
        );
        self.read(header, first_byte).await
    }

    async fn set_low_power_threshold(&self, value: u8) -> Result<()> {
        let header = BleCommandHeader::new(
            cmd::POWER_SET_LOW_POWER_THRESHOLD,
            feature::POWER,
            0x02,
            [0, 1],
        );
        self.write(header, &[value]).await
    }

    async fn idle_timer(&self) -> Result<u16> {
        let header = BleCommandHeader::new(cmd::POWER_QUERY, feature::POWER, 0x84, [0, 0]);
        self.read(header, decode_u16).await
    }

    async fn set_idle_timer(&self, seconds: u16) -> Result<()> {
        let header =
            BleCommandHeader::new(cmd::POWER_SET_IDLE_TIMER, feature::POWER, 0x04, [0, 0]);
        self.write(header, &seconds.to_le_bytes()).await
    }

    async fn dpi(&self, persisted: bool) -> Result<DotsPerInch> {
        let header = BleCommandHeader::new(cmd::DPI_GET, feature::DPI, 0x81, [persisted as u8, 0]);
        self.read(header, |data| dpi::parse_dpi(data, Endianness::Little))
            .await
    }

    async fn set_dpi(&self, persist: bool, value: DotsPerInch) -> Result<()> {
        let mut body = [0u8; 6];
        dpi::write_dpi(&mut body, value, Endianness::Little)?;
        let header = BleCommandHeader::new(cmd::DPI_SET, feature::DPI, 0x01, [persist as u8, 0]);
        self.write(header, &body).await
    }

    async fn dpi_presets_v2(&self) -> Result<DpiProfileSet> {
        let header = BleCommandHeader::new(cmd::DPI_PRESETS_GET, feature::DPI, 0x84, [1, 0]);
        self.read(header, |data| {
            dpi::parse_dpi_presets(data, DpiPresetFormat::BLUETOOTH)
        })
        .await
    }

    async fn set_dpi_presets_v2(&self, persist: bool, presets: &DpiProfileSet) -> Result<()> {
        let mut body = [0u8; ble::RESPONSE_BUFFER_SIZE];
        let length = dpi::write_dpi_presets(&mut body, DpiPresetFormat::BLUETOOTH, presets)?;
        let header =
            BleCommandHeader::new(cmd::DPI_PRESETS_SET, feature::DPI, 0x04, [persist as u8, 0]);
        self.write(header, &body[..length]).await
    }

    async fn set_brightness_v2(&self, persist: bool, value: u8) -> Result<()> {
        let header = BleCommandHeader::new(
            cmd::LIGHTING_SET_BRIGHTNESS,
            feature::LIGHTING,
            0x05,
            [persist as u8, 0],
        );
        self.write(header, &[value]).await
    }

    async fn effect_v2(&self, persisted: bool, led: LedId) -> Result<Option<LightingEffect>> {
        let header = BleCommandHeader::new(
            cmd::LIGHTING_GET_EFFECT,
            feature::LIGHTING,
            0x83,
            [persisted as u8, led.0],
        );
        self.read(header, effect::parse_effect_v2).await
    }

    async fn set_effect_v2(&self, persist: bool, value: &LightingEffect) -> Result<()> {
        let mut body = [0u8; MAX_EFFECT_SIZE];
        let length = effect::write_effect_v2(&mut body, value)?;
        let header = BleCommandHeader::new(
            cmd::LIGHTING_SET_EFFECT,
            feature::LIGHTING,
            0x03,
            [persist as u8, 0],
        );
        self.write(header, &body[..length]).await
    }
}
