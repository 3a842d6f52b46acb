//! Drives the device into userspace fastboot (fastbootd).
//!
//! Only fastbootd can take the partition writes, so whatever mode the device
//! starts in, it is rebooted until `getvar is-userspace` answers `yes`.
//! Patience is bounded by `Timing::max_polls`.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::Timing;
use crate::detector::DeviceDetector;
use crate::device::FastbootSubmode;
use crate::reporter::StatusReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    NoDevice,
    Mode(FastbootSubmode),
}

pub struct ModeTransitioner {
    detector: DeviceDetector,
    timing: Timing,
    reporter: Arc<dyn StatusReporter>,
}

impl ModeTransitioner {
    pub fn new(detector: DeviceDetector, timing: Timing, reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            detector,
            timing,
            reporter,
        }
    }

    /// From a booted system: `adb reboot fastboot`, settle, then the fastboot loop.
    /// Identity must already be confirmed over ADB.
    pub async fn from_bridge(&self) -> bool {
        self.reporter.step("Rebooting to fastbootd...");
        match self.detector.adb().reboot(Some("fastboot")).await {
            Ok(true) => {}
            Ok(false) => self.reporter.warn("adb reboot fastboot did not report success"),
            Err(e) => self.reporter.warn(&format!("adb reboot fastboot failed: {}", e)),
        }
        self.reporter
            .step(&format!("Waiting {} seconds for fastbootd...", self.timing.settle_secs));
        sleep(self.timing.settle()).await;
        self.ensure_userspace().await
    }

    /// Polls the fastboot submode until it is userspace. Returns `false` once
    /// `max_polls` polls pass without getting there.
    pub async fn ensure_userspace(&self) -> bool {
        self.reporter.step("Ensuring fastbootd");

        // Bootloader polls still tolerated after a reboot command went out. A
        // bootloader that keeps answering past that is rebooted again; a dropout
        // or unknown answer resets it.
        let grace = self.reboot_grace();
        let mut reboot_pending = 0u32;
        let mut delay: Option<Duration> = None;
        let mut last = Observation::NoDevice;

        for poll in 1..=self.timing.max_polls {
            if let Some(d) = delay.take() {
                sleep(d).await;
            }

            last = self.observe().await;
            debug!(poll, ?last, reboot_pending, "fastboot poll");

            match last {
                Observation::Mode(FastbootSubmode::Userspace) => {
                    info!(poll, "device reached fastbootd");
                    self.reporter.ok("Device is in fastbootd (userspace).");
                    return true;
                }
                Observation::Mode(FastbootSubmode::Bootloader) if reboot_pending == 0 => {
                    self.reporter
                        .step("Device is in bootloader fastboot. Rebooting to fastbootd...");
                    match self.detector.fastboot().reboot(Some("fastboot")).await {
                        Ok(true) => reboot_pending = grace,
                        Ok(false) => self.reporter.warn("fastboot reboot fastboot did not report success"),
                        Err(e) => self.reporter.warn(&format!("fastboot reboot fastboot failed: {}", e)),
                    }
                    self.reporter
                        .step(&format!("Waiting {} seconds for fastbootd...", self.timing.settle_secs));
                    delay = Some(self.timing.settle());
                }
                Observation::Mode(FastbootSubmode::Bootloader) => {
                    reboot_pending -= 1;
                    debug!(reboot_pending, "reboot already requested, bootloader still answering");
                    delay = Some(self.timing.retry());
                }
                Observation::Mode(FastbootSubmode::Unknown) => {
                    reboot_pending = 0;
                    self.reporter.warn(&format!(
                        "Unknown fastboot mode. Retrying in {}s...",
                        self.timing.retry_secs
                    ));
                    delay = Some(self.timing.retry());
                }
                Observation::NoDevice => {
                    reboot_pending = 0;
                    self.reporter.warn(&format!(
                        "No fastboot device detected. Retrying in {}s...",
                        self.timing.retry_secs
                    ));
                    delay = Some(self.timing.retry());
                }
            }
        }

        let why = match last {
            Observation::NoDevice => "no fastboot device answered",
            Observation::Mode(_) => "device never reported userspace fastboot",
        };
        self.reporter.err(&format!(
            "Gave up on fastbootd after {} polls: {}.",
            self.timing.max_polls, why
        ));
        false
    }

    /// Roughly one settle period worth of retry polls, never less than one.
    fn reboot_grace(&self) -> u32 {
        let polls = self.timing.settle_secs.div_ceil(self.timing.retry_secs.max(1));
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }

    /// `getvar` blocks until a device appears, so the listing is checked first.
    async fn observe(&self) -> Observation {
        if !self.detector.fastboot_present().await {
            return Observation::NoDevice;
        }
        Observation::Mode(self.detector.fastboot_submode().await)
    }
}
