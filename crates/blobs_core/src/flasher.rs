use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::detector::DeviceDetector;
use crate::device::{AbortReason, DeviceTransport, FlashOutcome, FlashReport, PartitionResult, PartitionSpec};
use crate::reporter::StatusReporter;
use crate::runner::CommandOutcome;

pub struct Flasher {
    detector: DeviceDetector,
    reporter: Arc<dyn StatusReporter>,
}

impl Flasher {
    pub fn new(detector: DeviceDetector, reporter: Arc<dyn StatusReporter>) -> Self {
        Self { detector, reporter }
    }

    /// Writes every partition of `specs` from `directory`, in order.
    ///
    /// Identity is checked again right before the sweep: the device may have
    /// been unplugged or swapped while the images were downloaded. Once the
    /// sweep starts it never stops early; a failed or missing partition is
    /// recorded and the next one is attempted.
    pub async fn flash_all(&self, directory: &Path, specs: &[PartitionSpec]) -> FlashReport {
        if !self.detector.fastboot_present().await {
            self.reporter.err("No fastboot device connected. Aborting.");
            return FlashReport::Aborted(AbortReason::DeviceAbsent);
        }
        if !self.detector.is_target_device(DeviceTransport::UserspaceFastboot).await {
            self.reporter.err(&format!(
                "Device is no longer detected as {}! Aborting.",
                self.detector.profile().model_token
            ));
            return FlashReport::Aborted(AbortReason::IdentityMismatch);
        }

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            let outcome = self.flash_one(directory, spec).await;
            results.push(PartitionResult {
                partition: spec.partition.clone(),
                image: spec.image.clone(),
                outcome,
            });
        }

        let report = FlashReport::Swept(results);
        info!(
            flashed = report.flashed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "flash sweep finished"
        );
        report
    }

    async fn flash_one(&self, directory: &Path, spec: &PartitionSpec) -> FlashOutcome {
        let path = directory.join(&spec.image);
        if !path.is_file() {
            self.reporter.warn(&format!("File missing: {}. Skipping.", spec.image));
            return FlashOutcome::SkippedMissingFile;
        }

        self.reporter
            .step(&format!("Flashing {} -> {}", spec.partition, spec.image));
        let outcome = match self.detector.fastboot().flash_all_slots(&spec.partition, &path).await {
            Ok(CommandOutcome::Completed(out)) if out.success() => FlashOutcome::Flashed,
            Ok(CommandOutcome::Completed(out)) => {
                let stderr = out.stderr.trim();
                let reason = if stderr.is_empty() {
                    format!("fastboot exited with {:?}", out.code)
                } else {
                    stderr.to_string()
                };
                FlashOutcome::Failed(reason)
            }
            Ok(CommandOutcome::ToolAbsent) => FlashOutcome::Failed("fastboot not found".to_string()),
            Err(e) => FlashOutcome::Failed(e.to_string()),
        };

        match &outcome {
            FlashOutcome::Flashed => self.reporter.ok(&format!("Successfully flashed {}", spec.partition)),
            FlashOutcome::Failed(reason) => self
                .reporter
                .err(&format!("Failed to flash {}: {}", spec.partition, reason)),
            FlashOutcome::SkippedMissingFile => {}
        }
        debug!(partition = %spec.partition, ?outcome, "partition done");
        outcome
    }
}
