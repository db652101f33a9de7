//! Notification stream command.

use std::path::Path;
use std::sync::Arc;

use razer_transport::{BroadcastSink, DeviceNotification, NotificationWatcher};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{CommandResult, Context};

fn describe(notification: &DeviceNotification) -> String {
    match notification {
        DeviceNotification::DpiChange { dpi } => format!("DPI changed to {dpi}"),
        DeviceNotification::DeviceArrival {
            device_index,
            product_id,
        } => match product_id {
            Some(pid) => format!("Device {device_index} connected (PID {pid:04X})"),
            None => format!("Device {device_index} connected"),
        },
        DeviceNotification::DeviceRemoval {
            device_index,
            product_id,
        } => match product_id {
            Some(pid) => format!("Device {device_index} disconnected (PID {pid:04X})"),
            None => format!("Device {device_index} disconnected"),
        },
        DeviceNotification::ExternalPowerChange { is_connected } => {
            if *is_connected {
                "External power connected".to_string()
            } else {
                "External power disconnected".to_string()
            }
        }
        DeviceNotification::BatteryLevelChange {
            device_index,
            level,
        } => format!(
            "Device {device_index} battery at {}%",
            *level as u16 * 100 / 255
        ),
        DeviceNotification::AvailabilityChange => "Notification interface gone".to_string(),
        DeviceNotification::Unknown { opcode } => format!("Unknown notification 0x{opcode:02X}"),
    }
}

/// Print notifications until Ctrl-C or until the device goes away
pub async fn watch(ctx: &Context, path: &Path, stream: u8) -> CommandResult {
    let file = tokio::fs::File::open(path).await?;
    let options = razer_transport::NotificationOptions {
        stream_index: stream,
        ..ctx.config.notifications.options()
    };

    let sink = Arc::new(BroadcastSink::new());
    let mut rx = sink.subscribe();
    let watcher = NotificationWatcher::spawn(file, sink.clone(), options);
    // The reader task holds the last sender, so the channel closes when it ends
    drop(sink);
    eprintln!("Watching {} (Ctrl-C to stop)", path.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = rx.recv() => match received {
                Ok(event) => {
                    ctx.emit(
                        &event,
                        format!("[{:8.3}s] {}", event.timestamp, describe(&event.notification)),
                    )?;
                    if event.notification == DeviceNotification::AvailabilityChange {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Dropped {} notification(s)", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    watcher.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use razer_transport::DotsPerInch;

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&DeviceNotification::DpiChange {
                dpi: DotsPerInch::new(800, 800)
            }),
            "DPI changed to 800x800"
        );
        assert_eq!(
            describe(&DeviceNotification::DeviceArrival {
                device_index: 1,
                product_id: Some(0x8C)
            }),
            "Device 1 connected (PID 008C)"
        );
        assert_eq!(
            describe(&DeviceNotification::BatteryLevelChange {
                device_index: 1,
                level: 255
            }),
            "Device 1 battery at 100%"
        );
    }
}
