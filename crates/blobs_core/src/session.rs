//! One flashing run: detect, transition, re-verify, flash, reboot.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::{FlasherConfig, Timing};
use crate::detector::DeviceDetector;
use crate::device::{DeviceTransport, FlashReport, PartitionSpec};
use crate::error::{FlashError, Result};
use crate::flasher::Flasher;
use crate::reporter::StatusReporter;
use crate::runner::CommandRunner;
use crate::transition::ModeTransitioner;

pub struct Session {
    detector: DeviceDetector,
    transitioner: ModeTransitioner,
    flasher: Flasher,
    timing: Timing,
    reporter: Arc<dyn StatusReporter>,
}

impl Session {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &FlasherConfig, reporter: Arc<dyn StatusReporter>) -> Self {
        let detector = DeviceDetector::new(runner, config.device.clone(), config.serial.clone());
        Self {
            transitioner: ModeTransitioner::new(detector.clone(), config.timing.clone(), reporter.clone()),
            flasher: Flasher::new(detector.clone(), reporter.clone()),
            detector,
            timing: config.timing.clone(),
            reporter,
        }
    }

    pub fn detector(&self) -> &DeviceDetector {
        &self.detector
    }

    /// Brings the target device into fastbootd and confirms its identity there.
    pub async fn prepare_device(&self) -> Result<()> {
        let model = self.detector.profile().model_token.clone();

        let mut transport = self.detector.transport().await;
        if transport == DeviceTransport::Absent && self.timing.device_wait_secs > 0 {
            self.reporter.step(&format!(
                "Waiting up to {} seconds for a device...",
                self.timing.device_wait_secs
            ));
            transport = self
                .detector
                .wait_for_device(self.timing.device_wait(), self.timing.retry())
                .await;
        }
        info!(%transport, "initial transport");

        match transport {
            DeviceTransport::Absent => {
                self.reporter.err("No device detected in ADB or fastboot mode.");
                return Err(FlashError::DeviceNotFound);
            }
            DeviceTransport::Bridge => {
                self.reporter.step("Device detected in ADB mode.");
                if !self.detector.is_target_device(transport).await {
                    self.reporter
                        .err(&format!("ADB device detected, but it is NOT a {}.", model));
                    return Err(FlashError::IdentityMismatch(transport));
                }
                self.reporter.ok(&format!("Device is a {} (ADB mode).", model));
                if !self.transitioner.from_bridge().await {
                    return Err(FlashError::ModeTransitionTimeout { polls: self.timing.max_polls });
                }
            }
            DeviceTransport::BootloaderFastboot | DeviceTransport::UserspaceFastboot => {
                self.reporter.step(&format!("Device detected in {} mode.", transport));
                if !self.transitioner.ensure_userspace().await {
                    return Err(FlashError::ModeTransitionTimeout { polls: self.timing.max_polls });
                }
            }
        }

        if !self.detector.is_target_device(DeviceTransport::UserspaceFastboot).await {
            self.reporter
                .err(&format!("Fastbootd device detected, but NOT a {}. Aborting.", model));
            return Err(FlashError::IdentityMismatch(DeviceTransport::UserspaceFastboot));
        }
        self.reporter
            .ok(&format!("Device confirmed as {} in fastbootd.", model));
        Ok(())
    }

    pub async fn flash_all(&self, directory: &Path, specs: &[PartitionSpec]) -> FlashReport {
        self.flasher.flash_all(directory, specs).await
    }

    /// Final `fastboot reboot`. Best effort: a failure is reported, not returned.
    pub async fn finish(&self) -> bool {
        self.reporter.step("Rebooting device");
        match self.detector.fastboot().reboot(None).await {
            Ok(true) => true,
            Ok(false) => {
                self.reporter.warn("fastboot reboot did not report success");
                false
            }
            Err(e) => {
                self.reporter.warn(&format!("fastboot reboot failed: {}", e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::SilentReporter;
    use crate::runner::Tool;
    use crate::testing::{RecordingReporter, ScriptedRunner};

    const ADB_LIST: &str = "List of devices attached\n9f1e2d3c\tdevice\n";
    const FB_LIST: &str = "9f1e2d3c\tfastboot\n";
    const USERSPACE: &str = "is-userspace: yes\n";
    const BOOTLOADER: &str = "is-userspace: no\n";
    const GETVAR_ALL: &str = "(bootloader) system-fingerprint:OnePlus/OnePlusN200TMO/OnePlusN200TMO:11/RKQ1.201217.002/2111292129:user/release-keys\n";

    fn session(runner: &Arc<ScriptedRunner>) -> Session {
        let config = FlasherConfig {
            timing: Timing::immediate(5),
            ..FlasherConfig::default()
        };
        Session::new(runner.clone(), &config, Arc::new(SilentReporter))
    }

    #[tokio::test]
    async fn absent_device_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        let err = session(&runner).prepare_device().await.unwrap_err();
        assert!(matches!(err, FlashError::DeviceNotFound));
    }

    #[tokio::test]
    async fn foreign_adb_device_aborts_without_reboot() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .ok(Tool::Adb, "devices", ADB_LIST)
            .ok(Tool::Adb, "shell getprop", "[ro.product.name]: [redfin]\n");
        let err = session(&runner).prepare_device().await.unwrap_err();
        assert!(matches!(err, FlashError::IdentityMismatch(DeviceTransport::Bridge)));
        assert_eq!(runner.count(Tool::Adb, "reboot"), 0);
    }

    #[tokio::test]
    async fn adb_device_is_moved_to_fastbootd_and_verified() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            // Booted at first, gone from adb after the reboot.
            .ok(Tool::Adb, "devices", ADB_LIST)
            .ok(Tool::Adb, "devices", "List of devices attached\n")
            .ok(Tool::Adb, "shell getprop", "[ro.product.name]: [OnePlusN200TMO]\n")
            .ok(Tool::Fastboot, "devices", FB_LIST)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", USERSPACE)
            .ok_stderr(Tool::Fastboot, "getvar all", GETVAR_ALL);

        session(&runner).prepare_device().await.unwrap();
        assert_eq!(runner.count(Tool::Adb, "reboot fastboot"), 1);
        assert_eq!(runner.count(Tool::Fastboot, "getvar all"), 1);
    }

    #[tokio::test]
    async fn bootloader_device_is_rebooted_then_verified() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .ok(Tool::Fastboot, "devices", FB_LIST)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", BOOTLOADER)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", BOOTLOADER)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", USERSPACE)
            .ok_stderr(Tool::Fastboot, "getvar all", GETVAR_ALL);

        session(&runner).prepare_device().await.unwrap();
        assert_eq!(runner.count(Tool::Fastboot, "reboot fastboot"), 1);
    }

    #[tokio::test]
    async fn transition_timeout_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .ok(Tool::Fastboot, "devices", FB_LIST)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", "");
        let err = session(&runner).prepare_device().await.unwrap_err();
        assert!(matches!(err, FlashError::ModeTransitionTimeout { polls: 5 }));
        assert_eq!(runner.count(Tool::Fastboot, "getvar all"), 0);
    }

    #[tokio::test]
    async fn fastbootd_identity_mismatch_is_fatal() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .ok(Tool::Fastboot, "devices", FB_LIST)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", USERSPACE)
            .ok_stderr(Tool::Fastboot, "getvar all", "(bootloader) product:lahaina\n");
        let err = session(&runner).prepare_device().await.unwrap_err();
        assert!(matches!(err, FlashError::IdentityMismatch(DeviceTransport::UserspaceFastboot)));
    }

    #[tokio::test]
    async fn every_fatal_path_reports_exactly_one_error() {
        let absent = Arc::new(ScriptedRunner::new());

        let foreign_adb = Arc::new(ScriptedRunner::new());
        foreign_adb
            .ok(Tool::Adb, "devices", ADB_LIST)
            .ok(Tool::Adb, "shell getprop", "[ro.product.name]: [redfin]\n");

        let stuck = Arc::new(ScriptedRunner::new());
        stuck
            .ok(Tool::Fastboot, "devices", FB_LIST)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", "");

        let foreign_fastbootd = Arc::new(ScriptedRunner::new());
        foreign_fastbootd
            .ok(Tool::Fastboot, "devices", FB_LIST)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", USERSPACE)
            .ok_stderr(Tool::Fastboot, "getvar all", "(bootloader) product:lahaina\n");

        for runner in [absent, foreign_adb, stuck, foreign_fastbootd] {
            let reporter = Arc::new(RecordingReporter::new());
            let config = FlasherConfig {
                timing: Timing::immediate(3),
                ..FlasherConfig::default()
            };
            let session = Session::new(runner, &config, reporter.clone());
            assert!(session.prepare_device().await.is_err());
            assert_eq!(reporter.errors().len(), 1, "{:?}", reporter.errors());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_a_late_device() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .ok(Tool::Fastboot, "devices", "")
            .ok(Tool::Fastboot, "devices", "")
            .ok(Tool::Fastboot, "devices", FB_LIST)
            .ok_stderr(Tool::Fastboot, "getvar is-userspace", USERSPACE)
            .ok_stderr(Tool::Fastboot, "getvar all", GETVAR_ALL);
        let reporter = Arc::new(RecordingReporter::new());
        let config = FlasherConfig {
            timing: Timing {
                retry_secs: 1,
                device_wait_secs: 10,
                ..Timing::immediate(5)
            },
            ..FlasherConfig::default()
        };

        Session::new(runner.clone(), &config, reporter.clone())
            .prepare_device()
            .await
            .unwrap();
        assert!(reporter.lines("step").iter().any(|l| l.starts_with("Waiting up to 10 seconds")));
        assert!(runner.count(Tool::Fastboot, "devices") >= 3);
        assert!(reporter.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_device_wait() {
        let runner = Arc::new(ScriptedRunner::new());
        let config = FlasherConfig {
            timing: Timing {
                retry_secs: 2,
                device_wait_secs: 6,
                ..Timing::immediate(5)
            },
            ..FlasherConfig::default()
        };
        let session = Session::new(runner.clone(), &config, Arc::new(SilentReporter));

        let err = session.prepare_device().await.unwrap_err();
        assert!(matches!(err, FlashError::DeviceNotFound));
        // Initial check, then polls at 0, 2, 4 and 6 seconds.
        assert_eq!(runner.count(Tool::Fastboot, "devices"), 5);
    }

    #[tokio::test]
    async fn finish_reboots_to_system() {
        let runner = Arc::new(ScriptedRunner::new());
        assert!(session(&runner).finish().await);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, vec!["reboot".to_string()]);
    }
}
