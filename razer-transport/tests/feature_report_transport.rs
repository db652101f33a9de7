//! Feature-report transport against a scripted in-memory device.
//!
//! The mock answers every Get-Feature by echoing the header of the last
//! Set-Feature, so a request that polls another request's response shows up
//! as a header mismatch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use razer_transport::command::{update_checksum, validate_checksum, Command};
use razer_transport::error::Result;
use razer_transport::protocol::{offset, REPORT_SIZE};
use razer_transport::{
    cancellable, Corruption, DotsPerInch, DpiPreset, DpiProfileSet, Feature, FeatureReportChannel,
    FeatureReportTransport, LedId, LightingEffect, ProtocolError, RazerProtocol, ResponseStatus,
    RgbColor,
};
use tokio_util::sync::CancellationToken;

/// What the device answers to one Get-Feature
#[derive(Debug, Clone)]
enum Reply {
    /// Status byte with a valid checksum and no payload
    Status(u8),
    /// Success carrying these bytes from offset 9
    Payload(Vec<u8>),
    /// Success for another function
    Foreign,
    /// Success with a broken checksum
    BadChecksum,
}

const BUSY: u8 = 0x01;
const SUCCESS: u8 = 0x02;
const NOT_CONNECTED: u8 = 0x03;
const FAILURE: u8 = 0x04;
const UNSUPPORTED: u8 = 0x05;

#[derive(Default)]
struct MockDevice {
    replies: Mutex<VecDeque<Reply>>,
    /// Reply used once the script runs out
    fallback: Mutex<Option<Reply>>,
    sent: Mutex<Vec<Vec<u8>>>,
    polls: AtomicUsize,
}

impl MockDevice {
    fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        let device = Self::default();
        device.replies.lock().unwrap().extend(replies);
        device
    }

    fn always(reply: Reply) -> Self {
        let device = Self::default();
        *device.fallback.lock().unwrap() = Some(reply);
        device
    }

    fn push(&self, replies: impl IntoIterator<Item = Reply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureReportChannel for MockDevice {
    async fn set_feature(&self, report: &[u8]) -> Result<()> {
        assert_eq!(report.len(), REPORT_SIZE);
        self.sent.lock().unwrap().push(report.to_vec());
        Ok(())
    }

    async fn get_feature(&self, report: &mut [u8]) -> Result<()> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        // Buffer is wiped before every poll
        assert!(report.iter().all(|&b| b == 0));

        let request = self
            .sent
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("poll without a request");
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone())
            .unwrap_or(Reply::Status(SUCCESS));

        report.copy_from_slice(&request);
        match reply {
            Reply::Status(status) => report[offset::STATUS] = status,
            Reply::Payload(ref payload) => {
                report[offset::STATUS] = SUCCESS;
                report[offset::PAYLOAD..offset::PAYLOAD + payload.len()].copy_from_slice(&payload);
            }
            Reply::Foreign => {
                report[offset::STATUS] = SUCCESS;
                report[offset::FUNCTION] ^= 0x40;
            }
            Reply::BadChecksum => report[offset::STATUS] = SUCCESS,
        }
        update_checksum(report);
        if matches!(reply, Reply::BadChecksum) {
            report[offset::CHECKSUM] ^= 0xFF;
        }
        Ok(())
    }
}

fn transport(device: MockDevice) -> FeatureReportTransport<MockDevice> {
    FeatureReportTransport::new(device)
}

#[tokio::test(start_paused = true)]
async fn set_brightness_v1_frame() {
    let t = transport(MockDevice::default());
    t.set_brightness_v1(LedId::BACKLIGHT, 0x80).await.unwrap();

    let sent = t.channel().sent();
    assert_eq!(sent.len(), 1);
    let frame = &sent[0];
    assert_eq!(frame[0], 0x00);
    assert_eq!(frame[1], 0x00);
    assert_eq!(frame[2], 0x1F);
    assert_eq!(&frame[6..9], &[0x03, 0x03, 0x03]);
    assert_eq!(&frame[9..12], &[0x01, 0x05, 0x80]);
    assert!(frame[12..89].iter().all(|&b| b == 0));
    assert_eq!(frame[89], 0x87);
    assert_eq!(frame[90], 0x00);
}

#[tokio::test(start_paused = true)]
async fn raw_command_returns_verified_response() {
    let t = transport(MockDevice::scripted([Reply::Payload(vec![0x01, 0x02, 0x42])]));
    let command = Command::new(0x1F, Feature::Sensor, 0x83, 0x03).with_payload([0x01, 0x02]);

    let response = t.execute(&command, 0).await.unwrap();
    assert!(validate_checksum(response.frame()));
    assert_eq!(response.data_length(), 0x03);
    assert_eq!(&response.payload()[..3], &[0x01, 0x02, 0x42]);
    assert!(response.payload()[3..].iter().all(|&b| b == 0));
}

#[tokio::test(start_paused = true)]
async fn busy_device_is_polled_until_ready() {
    let t = transport(MockDevice::scripted([
        Reply::Status(BUSY),
        Reply::Status(BUSY),
        Reply::Payload(vec![0x00, 0xC8]),
    ]));
    let start = tokio::time::Instant::now();
    assert_eq!(t.battery_level().await.unwrap(), 0xC8);

    assert_eq!(t.channel().polls(), 3);
    // 4 ms before the first poll, 6 ms before each retry
    assert!(start.elapsed() >= Duration::from_millis(16));
}

#[tokio::test(start_paused = true)]
async fn failure_consumes_retry_budget() {
    let t = transport(MockDevice::scripted([
        Reply::Status(FAILURE),
        Reply::Payload(vec![0x00, 0x40]),
    ]))
    .with_error_retry_budget(1);
    assert_eq!(t.battery_level().await.unwrap(), 0x40);
    assert_eq!(t.channel().polls(), 2);

    let t = transport(MockDevice::scripted([Reply::Status(FAILURE)]));
    let err = t.battery_level().await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Rejected {
            status: ResponseStatus::Failure
        }
    ));
    assert_eq!(t.channel().polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn final_statuses_map_to_errors() {
    let t = transport(MockDevice::scripted([Reply::Status(NOT_CONNECTED)]));
    assert!(matches!(
        t.battery_level().await,
        Err(ProtocolError::DeviceUnreachable)
    ));

    let t = transport(MockDevice::scripted([Reply::Status(UNSUPPORTED)]));
    assert!(matches!(
        t.sensor_state(1, 2).await,
        Err(ProtocolError::Rejected {
            status: ResponseStatus::UnsupportedParameter
        })
    ));

    let t = transport(MockDevice::scripted([Reply::Status(0x00)]));
    assert!(matches!(
        t.battery_level().await,
        Err(ProtocolError::Corrupted(Corruption::UnexpectedStatus(0x00)))
    ));

    let t = transport(MockDevice::scripted([Reply::Status(0x42)]));
    assert!(matches!(
        t.battery_level().await,
        Err(ProtocolError::Corrupted(Corruption::UnexpectedStatus(0x42)))
    ));
}

#[tokio::test(start_paused = true)]
async fn corrupted_responses_are_not_retried() {
    let t = transport(MockDevice::scripted([Reply::Foreign]));
    assert!(matches!(
        t.battery_level().await,
        Err(ProtocolError::Corrupted(Corruption::HeaderMismatch { .. }))
    ));
    assert_eq!(t.channel().polls(), 1);

    let t = transport(MockDevice::scripted([Reply::BadChecksum]));
    assert!(matches!(
        t.battery_level().await,
        Err(ProtocolError::Corrupted(Corruption::ChecksumMismatch { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn handshake_outcomes() {
    let t = transport(MockDevice::default());
    assert!(t.handshake().await.unwrap());
    assert_eq!(&t.channel().sent()[0][6..9], &[0x02, 0x00, 0x86]);
    assert_eq!(t.channel().sent()[0][2], 0x08);

    // Budget of 4 extra polls, then the device is considered unusable
    let t = transport(MockDevice::always(Reply::Status(FAILURE)));
    assert!(!t.handshake().await.unwrap());
    assert_eq!(t.channel().polls(), 5);

    let t = transport(MockDevice::scripted([
        Reply::Status(FAILURE),
        Reply::Status(FAILURE),
        Reply::Status(SUCCESS),
    ]));
    assert!(t.handshake().await.unwrap());

    let t = transport(MockDevice::scripted([Reply::Status(NOT_CONNECTED)]));
    assert!(!t.handshake().await.unwrap());

    let t = transport(MockDevice::scripted([Reply::Foreign]));
    assert!(t.handshake().await.unwrap_err().is_corruption());
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_are_serialized() {
    let t = Arc::new(transport(MockDevice::scripted([
        Reply::Status(BUSY),
        Reply::Payload(vec![0x00, 0x10]),
        Reply::Status(BUSY),
        Reply::Payload(vec![0x00, 0x01]),
    ])));

    let (battery, power) = tokio::join!(
        {
            let t = Arc::clone(&t);
            async move { t.battery_level().await }
        },
        {
            let t = Arc::clone(&t);
            async move { t.is_connected_to_external_power().await }
        }
    );
    assert_eq!(battery.unwrap(), 0x10);
    assert!(power.unwrap());

    let sent = t.channel().sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0][offset::FUNCTION], 0x80);
    assert_eq!(sent[1][offset::FUNCTION], 0x84);
}

#[tokio::test(start_paused = true)]
async fn cancellation_releases_transport() {
    let t = transport(MockDevice::always(Reply::Status(BUSY)));
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        cancel.cancel();
    });
    let result = cancellable(&token, t.battery_level()).await;
    assert!(matches!(result, Err(ProtocolError::Cancelled)));
    assert!(t.channel().polls() >= 1);

    // Device stops being busy; the next caller gets through
    *t.channel().fallback.lock().unwrap() = None;
    t.channel().push([Reply::Payload(vec![0x00, 0x33])]);
    assert_eq!(t.battery_level().await.unwrap(), 0x33);
}

#[tokio::test(start_paused = true)]
async fn dropped_request_releases_transport() {
    let t = transport(MockDevice::always(Reply::Status(BUSY)));
    let timed_out = tokio::time::timeout(Duration::from_millis(20), t.battery_level()).await;
    assert!(timed_out.is_err());

    *t.channel().fallback.lock().unwrap() = None;
    assert!(t.set_polling_interval(1).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn closed_transport_rejects_requests() {
    let t = transport(MockDevice::default());
    t.close();
    assert!(matches!(t.battery_level().await, Err(ProtocolError::Closed)));
    assert!(t.channel().sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dynamic_color_is_not_polled() {
    let t = transport(MockDevice::default());
    t.set_dynamic_color(RgbColor::new(0x11, 0x22, 0x33))
        .await
        .unwrap();

    assert_eq!(t.channel().polls(), 0);
    let frame = &t.channel().sent()[0];
    assert_eq!(&frame[6..9], &[0x08, 0x0F, 0x03]);
    assert_eq!(&frame[14..17], &[0x11, 0x22, 0x33]);
}

#[tokio::test(start_paused = true)]
async fn identity_queries_decode() {
    let mut serial = b"PM2143H12345678".to_vec();
    serial.push(0);
    let t = transport(MockDevice::scripted([
        Reply::Payload(serial),
        Reply::Payload(vec![1, 2, 3, 0]),
        Reply::Payload(vec![3, 1, 0x00, 0x7C, 0, 0x00, 0x00, 1, 0x00, 0x8C]),
    ]));

    assert_eq!(t.serial_number().await.unwrap(), "PM2143H12345678");
    let fw = t.firmware_version().await.unwrap();
    assert_eq!(fw.to_string(), "1.2.3.0");

    let paired = t.device_pairing_information().await.unwrap();
    assert_eq!(paired.len(), 3);
    assert!(paired[0].is_connected);
    assert_eq!(paired[0].product_id, 0x007C);
    assert!(!paired[1].is_connected);
    assert_eq!(paired[2].product_id, 0x008C);

    let sent = t.channel().sent();
    assert_eq!(sent[2][offset::PAYLOAD], 0x10);
}

#[tokio::test(start_paused = true)]
async fn dpi_round_trip_through_device() {
    let t = transport(MockDevice::scripted([
        Reply::Status(SUCCESS),
        Reply::Payload(vec![0x00, 0x06, 0x40, 0x03, 0x20]),
    ]));
    t.set_dpi(true, DotsPerInch::new(1600, 800)).await.unwrap();
    let frame = &t.channel().sent()[0];
    assert_eq!(&frame[9..16], &[0x01, 0x06, 0x40, 0x03, 0x20, 0x00, 0x00]);

    assert_eq!(
        t.dpi(false).await.unwrap(),
        DotsPerInch::new(1600, 800)
    );
}

#[tokio::test(start_paused = true)]
async fn dpi_presets_v2_validated() {
    let good = vec![
        0x00, 2, 2, // persistence, active, count
        1, 0x01, 0x90, 0x01, 0x90, 0, 0, //
        2, 0x03, 0x20, 0x03, 0x20, 0, 0,
    ];
    let mut bad = good.clone();
    bad[3] = 2;
    let t = transport(MockDevice::scripted([Reply::Payload(good), Reply::Payload(bad)]));

    let set = t.dpi_presets_v2().await.unwrap();
    assert_eq!(set.active_preset, 2);
    assert_eq!(set.presets, vec![DpiPreset::new(400, 400), DpiPreset::new(800, 800)]);
    assert!(t.dpi_presets_v2().await.unwrap_err().is_corruption());
}

#[tokio::test(start_paused = true)]
async fn set_dpi_presets_v1_uses_legacy_layout() {
    let t = transport(MockDevice::default());
    let set = DpiProfileSet::new(2, vec![DpiPreset::new(400, 400), DpiPreset::new(1600, 1600)]);
    t.set_dpi_presets_v1(true, &set).await.unwrap();

    let frame = &t.channel().sent()[0];
    assert_eq!(frame[2], 0x3F);
    assert_eq!(&frame[6..9], &[0x26, 0x04, 0x03]);
    // Persist, then a zero active preset, then the count
    assert_eq!(&frame[9..12], &[0x01, 0x00, 0x02]);
    assert_eq!(frame[10], 0);
    // No per-preset index
    assert_eq!(&frame[12..19], &[0x00, 0x01, 0x90, 0x01, 0x90, 0, 0]);

    let invalid = DpiProfileSet::new(3, vec![DpiPreset::new(400, 400)]);
    assert!(matches!(
        t.set_dpi_presets_v1(false, &invalid).await,
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert_eq!(t.channel().sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn effect_v2_get_and_set() {
    let t = transport(MockDevice::scripted([
        Reply::Payload(vec![0x01, 0x01, 0x02, 0x01, 0x28, 0x02, 0xFF, 0, 0, 0, 0, 0xFF]),
        Reply::Payload(vec![0x00, 0x04, 0x7F]),
    ]));
    let effect = t.effect_v2(true, LedId::LOGO).await.unwrap();
    assert_eq!(
        effect,
        Some(LightingEffect::TwoColorPulse(
            RgbColor::new(0xFF, 0, 0),
            RgbColor::new(0, 0, 0xFF)
        ))
    );
    assert_eq!(&t.channel().sent()[0][9..11], &[0x01, 0x04]);

    // Unknown effect ids are not an error
    assert_eq!(t.effect_v2(false, LedId::LOGO).await.unwrap(), None);

    t.set_effect_v2(true, &LightingEffect::StaticColor(RgbColor::new(1, 2, 3)))
        .await
        .unwrap();
    let frame = &t.channel().sent()[2];
    assert_eq!(&frame[9..18], &[0x01, 0x00, 0x01, 0x01, 0x28, 0x01, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn lighting_zone_ids_every_five_bytes() {
    let t = transport(MockDevice::scripted([Reply::Payload(vec![
        0x01, 0, 0, 0, 0, //
        0x04, 0, 0, 0, 0, //
        0x05, 0, 0, 0, 0,
    ])]));
    // Declared length of the request (0x32) bounds the scan
    let zones = t.lighting_zone_ids().await.unwrap();
    assert_eq!(&zones[..3], &[LedId::SCROLL_WHEEL, LedId::LOGO, LedId::BACKLIGHT]);
    assert_eq!(zones.len(), 10);
}
