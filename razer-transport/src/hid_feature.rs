//! hidapi-backed feature report channel

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::feature_report::FeatureReportChannel;
use crate::protocol::REPORT_SIZE;

/// Control interface of a device opened through hidapi
pub struct HidFeatureChannel {
    device: Mutex<HidDevice>,
}

impl HidFeatureChannel {
    pub fn new(device: HidDevice) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    /// Open a device node such as `/dev/hidraw3`
    pub fn open_path(api: &HidApi, path: &str) -> Result<Self> {
        let c_path = std::ffi::CString::new(path)
            .map_err(|_| ProtocolError::InvalidArgument(format!("invalid device path '{path}'")))?;
        let device = api.open_path(&c_path)?;
        debug!("Opened feature channel {}", path);
        Ok(Self::new(device))
    }
}

#[async_trait]
impl FeatureReportChannel for HidFeatureChannel {
    async fn set_feature(&self, report: &[u8]) -> Result<()> {
        self.device.lock().send_feature_report(report)?;
        Ok(())
    }

    async fn get_feature(&self, report: &mut [u8]) -> Result<()> {
        let read = self.device.lock().get_feature_report(report)?;
        if read < REPORT_SIZE - 1 {
            return Err(ProtocolError::invalid_payload(format!(
                "feature report of {read} bytes, expected {REPORT_SIZE}"
            )));
        }
        Ok(())
    }
}
