use serde::{Deserialize, Serialize};
use std::fmt;

/// How the device is currently reachable. Always derived from a fresh query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTransport {
    Absent,
    Bridge,
    BootloaderFastboot,
    UserspaceFastboot,
}

impl DeviceTransport {
    pub fn is_fastboot(self) -> bool {
        matches!(self, DeviceTransport::BootloaderFastboot | DeviceTransport::UserspaceFastboot)
    }
}

impl fmt::Display for DeviceTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceTransport::Absent => "no device",
            DeviceTransport::Bridge => "ADB",
            DeviceTransport::BootloaderFastboot => "Fastboot",
            DeviceTransport::UserspaceFastboot => "FastbootD",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FastbootSubmode {
    Bootloader,
    Userspace,
    Unknown,
}

impl From<&str> for FastbootSubmode {
    /// Classifies combined `fastboot getvar is-userspace` output.
    fn from(output: &str) -> Self {
        let low = output.to_lowercase();
        if low.contains("is-userspace: yes") {
            FastbootSubmode::Userspace
        } else if low.contains("is-userspace: no") {
            FastbootSubmode::Bootloader
        } else {
            FastbootSubmode::Unknown
        }
    }
}

/// One entry of the flash table: the partition and the image file written to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub partition: String,
    pub image: String,
}

impl PartitionSpec {
    pub fn new(partition: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            image: image.into(),
        }
    }

    /// `<partition>.img`, the naming used by the blob archive.
    pub fn named(partition: &str) -> Self {
        Self::new(partition, format!("{}.img", partition))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashOutcome {
    Flashed,
    SkippedMissingFile,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionResult {
    pub partition: String,
    pub image: String,
    pub outcome: FlashOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    DeviceAbsent,
    IdentityMismatch,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::DeviceAbsent => f.write_str("no fastboot device is connected"),
            AbortReason::IdentityMismatch => f.write_str("device is no longer detected as the target model"),
        }
    }
}

/// Result of one flashing run. A sweep never stops early, so `Swept` always
/// holds one entry per table row in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashReport {
    Aborted(AbortReason),
    Swept(Vec<PartitionResult>),
}

impl FlashReport {
    pub fn results(&self) -> &[PartitionResult] {
        match self {
            FlashReport::Aborted(_) => &[],
            FlashReport::Swept(results) => results,
        }
    }

    pub fn flashed(&self) -> usize {
        self.count(|o| matches!(o, FlashOutcome::Flashed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FlashOutcome::SkippedMissingFile))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FlashOutcome::Failed(_)))
    }

    /// True when the sweep ran and nothing failed. Skipped files do not count as failures.
    pub fn is_clean(&self) -> bool {
        matches!(self, FlashReport::Swept(_)) && self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&FlashOutcome) -> bool) -> usize {
        self.results().iter().filter(|r| pred(&r.outcome)).count()
    }
}
