//! Device state queries.
//!
//! Nothing here is cached: USB enumeration changes under our feet after every
//! reboot, so each call asks the tools again. Tool absence and runner errors
//! read as "no device" and never escape as errors.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::adb::AdbClient;
use crate::config::DeviceProfile;
use crate::device::{DeviceTransport, FastbootSubmode};
use crate::fastboot::FastbootClient;
use crate::runner::CommandRunner;

const MIN_WAIT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct DeviceDetector {
    adb: AdbClient,
    fastboot: FastbootClient,
    profile: DeviceProfile,
}

impl DeviceDetector {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: DeviceProfile, serial: Option<String>) -> Self {
        let mut adb = AdbClient::new(runner.clone());
        adb.set_serial(serial.clone());
        let mut fastboot = FastbootClient::new(runner);
        fastboot.set_serial(serial);
        Self { adb, fastboot, profile }
    }

    pub fn adb(&self) -> &AdbClient {
        &self.adb
    }

    pub fn fastboot(&self) -> &FastbootClient {
        &self.fastboot
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub async fn bridge_present(&self) -> bool {
        match self.adb.list_serials().await {
            Ok(serials) => !serials.is_empty(),
            Err(e) => {
                warn!("adb devices failed: {}", e);
                false
            }
        }
    }

    pub async fn fastboot_present(&self) -> bool {
        match self.fastboot.list_serials().await {
            Ok(serials) => !serials.is_empty(),
            Err(e) => {
                warn!("fastboot devices failed: {}", e);
                false
            }
        }
    }

    /// Current transport. A booted (ADB) device wins over a fastboot listing.
    pub async fn transport(&self) -> DeviceTransport {
        let bridge = self.bridge_present().await;
        let fastboot = self.fastboot_present().await;

        if bridge {
            if fastboot {
                warn!("both adb and fastboot report a device, using adb");
            }
            return DeviceTransport::Bridge;
        }
        if !fastboot {
            return DeviceTransport::Absent;
        }
        match self.fastboot_submode().await {
            FastbootSubmode::Userspace => DeviceTransport::UserspaceFastboot,
            FastbootSubmode::Bootloader | FastbootSubmode::Unknown => DeviceTransport::BootloaderFastboot,
        }
    }

    /// One `getvar is-userspace` query. Failures of any kind are `Unknown`.
    pub async fn fastboot_submode(&self) -> FastbootSubmode {
        match self.fastboot.getvar("is-userspace").await {
            Ok(outcome) => {
                let submode = FastbootSubmode::from(outcome.combined_text().as_str());
                debug!(?submode, "fastboot submode");
                submode
            }
            Err(e) => {
                warn!("fastboot getvar is-userspace failed: {}", e);
                FastbootSubmode::Unknown
            }
        }
    }

    pub async fn is_target_device(&self, transport: DeviceTransport) -> bool {
        let matched = match transport {
            DeviceTransport::Absent => false,
            DeviceTransport::Bridge => match self.adb.getprop().await {
                Ok(outcome) => getprop_matches(outcome.stdout_text(), &self.profile),
                Err(e) => {
                    warn!("adb shell getprop failed: {}", e);
                    false
                }
            },
            DeviceTransport::BootloaderFastboot | DeviceTransport::UserspaceFastboot => {
                match self.fastboot.getvar_all().await {
                    Ok(outcome) => fingerprint_matches(&outcome.combined_text(), &self.profile),
                    Err(e) => {
                        warn!("fastboot getvar all failed: {}", e);
                        false
                    }
                }
            }
        };
        debug!(%transport, matched, "identity check");
        matched
    }

    /// Polls until any device shows up or `patience` runs out.
    pub async fn wait_for_device(&self, patience: Duration, interval: Duration) -> DeviceTransport {
        let start = Instant::now();
        loop {
            let transport = self.transport().await;
            if transport != DeviceTransport::Absent || start.elapsed() >= patience {
                return transport;
            }
            sleep(interval.max(MIN_WAIT_INTERVAL)).await;
        }
    }
}

/// `[ro.product.name]: [OnePlusN200]`-style lines; case-sensitive as reported by the device.
pub fn getprop_matches(output: &str, profile: &DeviceProfile) -> bool {
    output
        .lines()
        .any(|line| line.contains(&profile.property_key) && line.contains(&profile.model_token))
}

/// `(bootloader) system-fingerprint:OnePlus/OnePlusN200TMO/...`; compared case-insensitively.
pub fn fingerprint_matches(output: &str, profile: &DeviceProfile) -> bool {
    let key = profile.fingerprint_key.to_lowercase();
    let model = profile.model_token.to_lowercase();
    output.lines().any(|line| {
        let low = line.to_lowercase();
        low.contains(&key) && low.contains(&model)
    })
}
