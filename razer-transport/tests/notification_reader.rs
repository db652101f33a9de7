//! Notification reader over an in-memory duplex stream.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use razer_transport::{
    run_notification_loop, BroadcastSink, DeviceNotification, DotsPerInch, LoopExit,
    NotificationOptions, NotificationSink, NotificationWatcher,
};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio_util::sync::CancellationToken;

const REPORT_LENGTH: usize = 16;

/// Pad a notification to a whole input report
fn frame(bytes: &[u8]) -> [u8; REPORT_LENGTH] {
    let mut frame = [0u8; REPORT_LENGTH];
    frame[..bytes.len()].copy_from_slice(bytes);
    frame
}

fn options() -> NotificationOptions {
    NotificationOptions {
        report_length: REPORT_LENGTH,
        ..NotificationOptions::default()
    }
}

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn on_device_arrival(&self, stream_index: u8, device_index: u8, product_id: Option<u16>) {
        self.record(format!("arrival {stream_index} {device_index} {product_id:?}"));
    }

    fn on_device_removal(&self, stream_index: u8, device_index: u8, product_id: Option<u16>) {
        self.record(format!("removal {stream_index} {device_index} {product_id:?}"));
    }

    fn on_dpi_change(&self, stream_index: u8, dpi: DotsPerInch) {
        self.record(format!("dpi {stream_index} {dpi}"));
    }

    fn on_external_power_change(&self, stream_index: u8, is_connected: bool) {
        self.record(format!("power {stream_index} {is_connected}"));
    }

    fn on_battery_level_change(&self, stream_index: u8, device_index: u8, level: u8) {
        self.record(format!("battery {stream_index} {device_index} {level}"));
    }

    fn on_availability_change(&self, stream_index: u8) {
        self.record(format!("availability {stream_index}"));
    }
}

/// Reader failing with a fixed OS error
struct FailingReader(i32);

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::from_raw_os_error(self.0)))
    }
}

#[tokio::test]
async fn dispatches_until_eof() {
    let (mut device, host) = tokio::io::duplex(256);
    let sink = RecordingSink::default();

    device.write_all(&frame(&[0x05, 0x02, 0x03, 0x20, 0x03, 0x20])).await.unwrap();
    device.write_all(&frame(&[0x05, 0x09, 0x03, 0x01])).await.unwrap();
    device.write_all(&frame(&[0x05, 0x35, 0x02, 0x01, 0x00, 0x8C])).await.unwrap();
    device.write_all(&frame(&[0x05, 0x10, 0xAA])).await.unwrap();
    device.write_all(&frame(&[0x05, 0x0C, 0x01])).await.unwrap();
    // Foreign report id
    device.write_all(&frame(&[0x09, 0x0C, 0x00])).await.unwrap();
    device.write_all(&frame(&[0x05, 0x31, 0x64, 0x00, 0x00, 0x01])).await.unwrap();
    device.write_all(&frame(&[0x05, 0x77])).await.unwrap();
    drop(device);

    let exit = run_notification_loop(host, &sink, options(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(exit, LoopExit::Disconnected);
    assert_eq!(
        sink.calls(),
        vec![
            "dpi 1 800x800",
            "arrival 1 1 None",
            "removal 1 1 Some(140)",
            "power 1 true",
            "battery 1 1 100",
            "availability 1",
        ]
    );
}

#[tokio::test]
async fn bluetooth_quirk_strips_repeated_report_id() {
    let (mut device, host) = tokio::io::duplex(256);
    let sink = RecordingSink::default();
    let options = NotificationOptions {
        stream_index: 2,
        bluetooth_hid_quirk: true,
        ..options()
    };

    device.write_all(&frame(&[0x05, 0x05, 0x0C, 0x01])).await.unwrap();
    // Single report id is not enough under the quirk
    device.write_all(&frame(&[0x05, 0x0C, 0x00])).await.unwrap();
    drop(device);

    run_notification_loop(host, &sink, options, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sink.calls(), vec!["power 2 true", "availability 2"]);
}

#[tokio::test]
async fn disconnect_error_ends_cleanly() {
    // EIO (hidraw unplug), ENODEV, ESHUTDOWN
    for errno in [5, 19, 108] {
        let sink = RecordingSink::default();
        let exit =
            run_notification_loop(FailingReader(errno), &sink, options(), CancellationToken::new())
                .await
                .unwrap();
        assert_eq!(exit, LoopExit::Disconnected, "errno {errno}");
        assert_eq!(sink.calls(), vec!["availability 1"], "errno {errno}");
    }
}

#[tokio::test]
async fn broadcast_channel_closes_when_reader_fails() {
    let sink = Arc::new(BroadcastSink::new());
    let mut rx = sink.subscribe();

    // EACCES is not a disconnect
    let watcher = NotificationWatcher::spawn(FailingReader(13), sink, options());
    assert!(matches!(
        rx.recv().await,
        Err(tokio::sync::broadcast::error::RecvError::Closed)
    ));
    assert!(watcher.join().await.is_err());
}

#[tokio::test]
async fn other_errors_are_returned() {
    let sink = RecordingSink::default();
    // EACCES
    let result =
        run_notification_loop(FailingReader(13), &sink, options(), CancellationToken::new()).await;
    assert!(result.is_err());
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn watcher_shutdown_is_not_a_disconnect() {
    let (_device, host) = tokio::io::duplex(256);
    let sink = Arc::new(RecordingSink::default());

    let watcher = NotificationWatcher::spawn(host, sink.clone(), options());
    let exit = watcher.shutdown().await.unwrap();
    assert_eq!(exit, LoopExit::Cancelled);
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn broadcast_sink_republishes() {
    let (mut device, host) = tokio::io::duplex(256);
    let sink = Arc::new(BroadcastSink::new());
    let mut rx = sink.subscribe();

    let watcher = NotificationWatcher::spawn(host, sink.clone(), options());
    device.write_all(&frame(&[0x05, 0x02, 0x06, 0x40, 0x06, 0x40])).await.unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.stream_index, 1);
    assert_eq!(
        received.notification,
        DeviceNotification::DpiChange {
            dpi: DotsPerInch::new(1600, 1600)
        }
    );

    drop(device);
    let received = rx.recv().await.unwrap();
    assert_eq!(received.notification, DeviceNotification::AvailabilityChange);
    assert_eq!(watcher.join().await.unwrap(), LoopExit::Disconnected);
}
