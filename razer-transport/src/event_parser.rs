//! Unsolicited device notifications
//!
//! Mice, receivers and docks push short input reports on their notification
//! interface when something changes on the device side: a DPI button was
//! pressed, a wireless device paired or went out of range, the battery level
//! moved, a cable was plugged in.
//!
//! Frame layout: `[report_id, (report_id,) opcode, ...]`. The report id is
//! repeated when the notification arrives over Bluetooth HID.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{notif, report_id};
use crate::types::DotsPerInch;

/// Parsed notification payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum DeviceNotification {
    /// Sensor resolution changed, usually through the DPI buttons
    DpiChange { dpi: DotsPerInch },
    /// A wireless device (one-based index) connected to the receiver
    DeviceArrival {
        device_index: u8,
        product_id: Option<u16>,
    },
    DeviceRemoval {
        device_index: u8,
        product_id: Option<u16>,
    },
    ExternalPowerChange { is_connected: bool },
    BatteryLevelChange { device_index: u8, level: u8 },
    /// The notification stream ended because the device went away.
    /// Never produced by [`parse_notification`].
    AvailabilityChange,
    Unknown { opcode: u8 },
}

/// Reader settings for one notification stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationOptions {
    /// Docks expose two notification streams (1 and 2)
    pub stream_index: u8,
    pub report_id: u8,
    /// Report id is sent twice over Bluetooth HID
    pub bluetooth_hid_quirk: bool,
    /// Size of one input report, report id included
    pub report_length: usize,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            stream_index: 1,
            report_id: report_id::DEFAULT,
            bluetooth_hid_quirk: false,
            report_length: 16,
        }
    }
}

/// Consumer of device notifications
///
/// Called from the reader task, so implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn on_device_arrival(&self, stream_index: u8, device_index: u8, product_id: Option<u16>);
    fn on_device_removal(&self, stream_index: u8, device_index: u8, product_id: Option<u16>);
    fn on_dpi_change(&self, stream_index: u8, dpi: DotsPerInch);
    fn on_external_power_change(&self, stream_index: u8, is_connected: bool);
    fn on_battery_level_change(&self, stream_index: u8, device_index: u8, level: u8);
    /// The stream stopped delivering because the device disconnected
    fn on_availability_change(&self, stream_index: u8);
}

/// Remove the report id prefix, or `None` if the frame is not ours
pub fn strip_report_id<'a>(frame: &'a [u8], options: &NotificationOptions) -> Option<&'a [u8]> {
    let rest = frame.strip_prefix(&[options.report_id])?;
    if options.bluetooth_hid_quirk {
        rest.strip_prefix(&[options.report_id])
    } else {
        Some(rest)
    }
}

fn connection_change(payload: &[u8], product_id: Option<u16>) -> Option<DeviceNotification> {
    let device_index = *payload.get(2)?;
    match payload[1] {
        notif::CONNECTION_REMOVED => Some(DeviceNotification::DeviceRemoval {
            device_index,
            product_id,
        }),
        notif::CONNECTION_ARRIVED => Some(DeviceNotification::DeviceArrival {
            device_index,
            product_id,
        }),
        _ => None,
    }
}

/// Parse a notification payload (report id already stripped)
///
/// Returns `None` for frames that carry nothing to report: truncated frames,
/// keep-alives and connection notifications with an unknown sub-code.
/// Unrecognized opcodes come back as [`DeviceNotification::Unknown`].
///
/// Opcodes:
/// - 0x02: DPI change, `[02, x_hi, x_lo, y_hi, y_lo]`
/// - 0x09: connection, `[09, 2=removed|3=arrived, device_index]`
/// - 0x0C: external power, `[0C, flags]` (bit 0 = connected)
/// - 0x10: Bluetooth keep-alive
/// - 0x31: battery level, `[31, level, _, _, device_index]`
/// - 0x35: connection with product id, `[35, 2|3, device_index, pid_hi, pid_lo]`
pub fn parse_notification(payload: &[u8]) -> Option<DeviceNotification> {
    let opcode = *payload.first()?;
    match opcode {
        notif::DPI_CHANGE if payload.len() >= 5 => Some(DeviceNotification::DpiChange {
            dpi: DotsPerInch::new(
                u16::from_be_bytes([payload[1], payload[2]]),
                u16::from_be_bytes([payload[3], payload[4]]),
            ),
        }),
        notif::DEVICE_CONNECTION if payload.len() >= 3 => connection_change(payload, None),
        notif::EXTERNAL_POWER if payload.len() >= 2 => {
            Some(DeviceNotification::ExternalPowerChange {
                is_connected: payload[1] & 1 != 0,
            })
        }
        notif::BLUETOOTH_KEEPALIVE => None,
        notif::BATTERY_LEVEL if payload.len() >= 5 => {
            Some(DeviceNotification::BatteryLevelChange {
                device_index: payload[4],
                level: payload[1],
            })
        }
        notif::DEVICE_CONNECTION_WITH_PRODUCT_ID if payload.len() >= 5 => connection_change(
            payload,
            Some(u16::from_be_bytes([payload[3], payload[4]])),
        ),
        notif::DPI_CHANGE
        | notif::DEVICE_CONNECTION
        | notif::EXTERNAL_POWER
        | notif::BATTERY_LEVEL
        | notif::DEVICE_CONNECTION_WITH_PRODUCT_ID => None,
        _ => Some(DeviceNotification::Unknown { opcode }),
    }
}

fn dispatch<S: NotificationSink + ?Sized>(sink: &S, stream_index: u8, event: DeviceNotification) {
    match event {
        DeviceNotification::DpiChange { dpi } => sink.on_dpi_change(stream_index, dpi),
        DeviceNotification::DeviceArrival {
            device_index,
            product_id,
        } => sink.on_device_arrival(stream_index, device_index, product_id),
        DeviceNotification::DeviceRemoval {
            device_index,
            product_id,
        } => sink.on_device_removal(stream_index, device_index, product_id),
        DeviceNotification::ExternalPowerChange { is_connected } => {
            sink.on_external_power_change(stream_index, is_connected)
        }
        DeviceNotification::BatteryLevelChange {
            device_index,
            level,
        } => sink.on_battery_level_change(stream_index, device_index, level),
        DeviceNotification::AvailabilityChange => sink.on_availability_change(stream_index),
        DeviceNotification::Unknown { opcode } => {
            debug!("Ignoring notification opcode 0x{:02X}", opcode);
        }
    }
}

/// I/O errors that mean the device node is gone
pub fn is_disconnect(error: &io::Error) -> bool {
    // hidraw reports an unplug as EIO, USB teardown as ESHUTDOWN or ENODEV.
    // ERROR_DEVICE_NOT_CONNECTED on Windows.
    const EIO: i32 = 5;
    const ENODEV: i32 = 19;
    const ESHUTDOWN: i32 = 108;
    const ERROR_DEVICE_NOT_CONNECTED: i32 = 1167;

    matches!(
        error.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    ) || matches!(
        error.raw_os_error(),
        Some(EIO | ENODEV | ESHUTDOWN | ERROR_DEVICE_NOT_CONNECTED)
    )
}

/// Why the notification loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// Zero-length read or a disconnect-class error
    Disconnected,
}

/// Read notifications until the device disconnects or `token` fires
///
/// Each read is expected to return one whole input report, as hidraw does.
/// Frames with a foreign report id are dropped. Errors other than a
/// disconnect are returned.
pub async fn run_notification_loop<R, S>(
    mut reader: R,
    sink: &S,
    options: NotificationOptions,
    token: CancellationToken,
) -> io::Result<LoopExit>
where
    R: AsyncRead + Unpin,
    S: NotificationSink + ?Sized,
{
    debug!(
        "Notification reader {} started (report id 0x{:02X})",
        options.stream_index, options.report_id
    );
    let mut buf = vec![0u8; options.report_length.max(2)];

    let exit = loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break LoopExit::Cancelled,
            read = reader.read(&mut buf) => read,
        };
        let len = match read {
            Ok(0) => break LoopExit::Disconnected,
            Ok(len) => len,
            Err(e) if is_disconnect(&e) => {
                debug!("Notification reader {}: {}", options.stream_index, e);
                break LoopExit::Disconnected;
            }
            Err(e) => {
                warn!("Notification reader {} failed: {}", options.stream_index, e);
                return Err(e);
            }
        };

        let frame = &buf[..len];
        let Some(payload) = strip_report_id(frame, &options) else {
            debug!("Dropping foreign frame: {:02X?}", frame);
            continue;
        };
        if let Some(event) = parse_notification(payload) {
            debug!(
                "Notification {} on stream {}: {:?}",
                payload.first().map(|&op| notif::name(op)).unwrap_or_default(),
                options.stream_index,
                event
            );
            dispatch(sink, options.stream_index, event);
        }
    };

    if exit == LoopExit::Disconnected {
        sink.on_availability_change(options.stream_index);
    }
    debug!("Notification reader {} exiting", options.stream_index);
    Ok(exit)
}

/// Background task running [`run_notification_loop`]
pub struct NotificationWatcher {
    token: CancellationToken,
    task: JoinHandle<io::Result<LoopExit>>,
}

impl NotificationWatcher {
    pub fn spawn<R>(
        reader: R,
        sink: Arc<dyn NotificationSink>,
        options: NotificationOptions,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.child_token();
        let task = tokio::spawn(async move {
            run_notification_loop(reader, sink.as_ref(), options, child).await
        });
        Self { token, task }
    }

    /// Loop ended on its own (device gone or read error)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end without stopping it
    pub async fn join(self) -> io::Result<LoopExit> {
        self.task.await.map_err(io::Error::other)?
    }

    /// Stop the loop and wait for it
    pub async fn shutdown(self) -> io::Result<LoopExit> {
        self.token.cancel();
        self.join().await
    }
}

/// A notification with its arrival time, in seconds since the sink was created
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedNotification {
    pub timestamp: f64,
    pub stream_index: u8,
    pub notification: DeviceNotification,
}

/// Broadcast channel capacity for notifications
const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// Sink that republishes every notification on a broadcast channel
pub struct BroadcastSink {
    tx: broadcast::Sender<TimestampedNotification>,
    start_time: Instant,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            tx,
            start_time: Instant::now(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedNotification> {
        self.tx.subscribe()
    }

    fn publish(&self, stream_index: u8, notification: DeviceNotification) {
        let timestamped = TimestampedNotification {
            timestamp: self.start_time.elapsed().as_secs_f64(),
            stream_index,
            notification,
        };
        // No subscribers is fine
        let _ = self.tx.send(timestamped);
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastSink {
    fn on_device_arrival(&self, stream_index: u8, device_index: u8, product_id: Option<u16>) {
        self.publish(
            stream_index,
            DeviceNotification::DeviceArrival {
                device_index,
                product_id,
            },
        );
    }

    fn on_device_removal(&self, stream_index: u8, device_index: u8, product_id: Option<u16>) {
        self.publish(
            stream_index,
            DeviceNotification::DeviceRemoval {
                device_index,
                product_id,
            },
        );
    }

    fn on_dpi_change(&self, stream_index: u8, dpi: DotsPerInch) {
        self.publish(stream_index, DeviceNotification::DpiChange { dpi });
    }

    fn on_external_power_change(&self, stream_index: u8, is_connected: bool) {
        self.publish(
            stream_index,
            DeviceNotification::ExternalPowerChange { is_connected },
        );
    }

    fn on_battery_level_change(&self, stream_index: u8, device_index: u8, level: u8) {
        self.publish(
            stream_index,
            DeviceNotification::BatteryLevelChange {
                device_index,
                level,
            },
        );
    }

    fn on_availability_change(&self, stream_index: u8) {
        self.publish(stream_index, DeviceNotification::AvailabilityChange);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dpi_change() {
        // 1600 x 800, big-endian
        let event = parse_notification(&[0x02, 0x06, 0x40, 0x03, 0x20]);
        assert_eq!(
            event,
            Some(DeviceNotification::DpiChange {
                dpi: DotsPerInch::new(1600, 800)
            })
        );
    }

    #[test]
    fn test_parse_connection() {
        let event = parse_notification(&[0x09, 0x03, 0x01]);
        assert!(matches!(
            event,
            Some(DeviceNotification::DeviceArrival {
                device_index: 1,
                product_id: None
            })
        ));

        let event = parse_notification(&[0x09, 0x02, 0x02]);
        assert!(matches!(
            event,
            Some(DeviceNotification::DeviceRemoval {
                device_index: 2,
                product_id: None
            })
        ));

        // Unknown sub-code
        assert_eq!(parse_notification(&[0x09, 0x07, 0x01]), None);
    }

    #[test]
    fn test_parse_connection_with_product_id() {
        let event = parse_notification(&[0x35, 0x03, 0x01, 0x00, 0x8C]);
        assert!(matches!(
            event,
            Some(DeviceNotification::DeviceArrival {
                device_index: 1,
                product_id: Some(0x008C)
            })
        ));
    }

    #[test]
    fn test_parse_power_and_battery() {
        assert_eq!(
            parse_notification(&[0x0C, 0x01]),
            Some(DeviceNotification::ExternalPowerChange { is_connected: true })
        );
        assert_eq!(
            parse_notification(&[0x0C, 0x02]),
            Some(DeviceNotification::ExternalPowerChange {
                is_connected: false
            })
        );
        assert_eq!(
            parse_notification(&[0x31, 0xB4, 0x00, 0x00, 0x01]),
            Some(DeviceNotification::BatteryLevelChange {
                device_index: 1,
                level: 0xB4
            })
        );
    }

    #[test]
    fn test_parse_ignored() {
        assert_eq!(parse_notification(&[]), None);
        assert_eq!(parse_notification(&[0x10, 0x00]), None);
        // Truncated DPI change
        assert_eq!(parse_notification(&[0x02, 0x06]), None);
        assert_eq!(
            parse_notification(&[0x7E, 0x01]),
            Some(DeviceNotification::Unknown { opcode: 0x7E })
        );
    }

    #[test]
    fn test_strip_report_id() {
        let options = NotificationOptions::default();
        assert_eq!(strip_report_id(&[0x05, 0x0C, 0x01], &options), Some(&[0x0C, 0x01][..]));
        assert_eq!(strip_report_id(&[0x09, 0x0C, 0x01], &options), None);

        let quirk = NotificationOptions {
            bluetooth_hid_quirk: true,
            ..options
        };
        assert_eq!(strip_report_id(&[0x05, 0x05, 0x0C, 0x01], &quirk), Some(&[0x0C, 0x01][..]));
        assert_eq!(strip_report_id(&[0x05, 0x0C, 0x01], &quirk), None);
    }

    #[test]
    fn test_is_disconnect() {
        assert!(is_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_disconnect(&io::Error::from_raw_os_error(19)));
        assert!(is_disconnect(&io::Error::from_raw_os_error(5)));
        assert!(is_disconnect(&io::Error::from_raw_os_error(108)));
        assert!(!is_disconnect(&io::Error::from_raw_os_error(13)));
        assert!(!is_disconnect(&io::Error::from(io::ErrorKind::InvalidData)));
    }

    #[tokio::test]
    async fn test_broadcast_sink() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();
        sink.on_battery_level_change(2, 1, 200);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.stream_index, 2);
        assert_eq!(
            received.notification,
            DeviceNotification::BatteryLevelChange {
                device_index: 1,
                level: 200
            }
        );
    }
}
