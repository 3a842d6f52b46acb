//! Run configuration.
//!
//! Everything has a default matching the N200 C.37 blob set, so the tool runs
//! without a config file. A TOML file may override any subset of fields; a
//! `[[partitions]]` list replaces the whole flash table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::device::PartitionSpec;
use crate::error::{FlashError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlasherConfig {
    pub serial: Option<String>,
    pub device: DeviceProfile,
    pub timing: Timing,
    pub tools: ToolOverrides,
    pub artifacts: ArtifactSource,
    pub partitions: Vec<PartitionSpec>,
}

impl Default for FlasherConfig {
    fn default() -> Self {
        Self {
            serial: None,
            device: DeviceProfile::default(),
            timing: Timing::default(),
            tools: ToolOverrides::default(),
            artifacts: ArtifactSource::default(),
            partitions: default_partitions(),
        }
    }
}

impl FlasherConfig {
    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partitions.is_empty() {
            return Err(FlashError::InvalidConfig("partition table is empty".into()));
        }
        if let Some(spec) = self.partitions.iter().find(|p| p.partition.is_empty() || p.image.is_empty()) {
            return Err(FlashError::InvalidConfig(format!("incomplete partition entry: {:?}", spec)));
        }
        if self.timing.max_polls == 0 {
            return Err(FlashError::InvalidConfig("timing.max_polls must be at least 1".into()));
        }
        if self.device.model_token.is_empty() {
            return Err(FlashError::InvalidConfig("device.model_token must not be empty".into()));
        }
        Ok(())
    }
}

/// Strings used to recognise the target device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Matched case-sensitively against getprop output, case-insensitively against fastboot vars.
    pub model_token: String,
    pub property_key: String,
    pub fingerprint_key: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            model_token: DEFAULT_MODEL_TOKEN.to_string(),
            property_key: DEFAULT_PROPERTY_KEY.to_string(),
            fingerprint_key: DEFAULT_FINGERPRINT_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Wait after a reboot command before polling again.
    pub settle_secs: u64,
    /// Wait between polls while the mode is unknown or the device is gone.
    pub retry_secs: u64,
    /// Upper bound on submode polls before giving up on fastbootd.
    pub max_polls: u32,
    /// How long to wait for any device to show up before the run starts.
    pub device_wait_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_secs: 15,
            retry_secs: 3,
            max_polls: 40,
            device_wait_secs: 30,
        }
    }
}

impl Timing {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }

    pub fn device_wait(&self) -> Duration {
        Duration::from_secs(self.device_wait_secs)
    }

    /// No delays at all; polling is bounded only by `max_polls`.
    pub fn immediate(max_polls: u32) -> Self {
        Self {
            settle_secs: 0,
            retry_secs: 0,
            max_polls,
            device_wait_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOverrides {
    pub adb: Option<PathBuf>,
    pub fastboot: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSource {
    pub base_url: String,
    pub files: Vec<String>,
}

impl Default for ArtifactSource {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            files: DEFAULT_PARTITIONS
                .iter()
                .map(|p| format!("{}.img{}", p, COMPRESSED_SUFFIX))
                .collect(),
        }
    }
}

impl ArtifactSource {
    pub fn url_for(&self, file: &str) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, file)
        } else {
            format!("{}/{}", self.base_url, file)
        }
    }
}

pub fn default_partitions() -> Vec<PartitionSpec> {
    DEFAULT_PARTITIONS.iter().map(|p| PartitionSpec::named(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_n200_blob_set() {
        let config = FlasherConfig::default();
        assert_eq!(config.partitions.len(), 18);
        assert_eq!(config.partitions[0], PartitionSpec::new("abl", "abl.img"));
        assert_eq!(config.partitions[17], PartitionSpec::new("xbl", "xbl.img"));
        assert_eq!(config.artifacts.files.len(), 18);
        assert!(config.artifacts.files.contains(&"xbl_config.img.zst".to_string()));
        assert_eq!(config.timing.settle_secs, 15);
        assert_eq!(config.timing.retry_secs, 3);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = FlasherConfig::from_toml(
            r#"
serial = "abc123"

[timing]
max_polls = 5

[[partitions]]
partition = "tz"
image = "tz.img"
"#,
        )
        .unwrap();
        assert_eq!(config.serial.as_deref(), Some("abc123"));
        assert_eq!(config.timing.max_polls, 5);
        assert_eq!(config.timing.settle_secs, 15);
        assert_eq!(config.partitions, vec![PartitionSpec::new("tz", "tz.img")]);
        assert_eq!(config.device.model_token, DEFAULT_MODEL_TOKEN);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = FlasherConfig::default();
        config.partitions.clear();
        assert!(matches!(config.validate(), Err(FlashError::InvalidConfig(_))));

        let mut config = FlasherConfig::default();
        config.timing.max_polls = 0;
        assert!(config.validate().is_err());

        assert!(matches!(FlasherConfig::from_toml("timing = 3"), Err(FlashError::Config(_))));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n200.toml");
        std::fs::write(&path, "[device]\nmodel_token = \"OnePlusN100\"\n").unwrap();
        let config = FlasherConfig::load(Some(&path)).unwrap();
        assert_eq!(config.device.model_token, "OnePlusN100");
        assert_eq!(config.device.property_key, DEFAULT_PROPERTY_KEY);

        assert!(matches!(FlasherConfig::load(Some(&dir.path().join("missing.toml"))), Err(FlashError::Io(_))));
    }

    #[test]
    fn url_joining() {
        let mut source = ArtifactSource::default();
        assert!(source.url_for("tz.img.zst").ends_with("DE2117_11_C.37/tz.img.zst"));
        source.base_url = "http://localhost:8080/blobs".into();
        assert_eq!(source.url_for("tz.img.zst"), "http://localhost:8080/blobs/tz.img.zst");
    }
}
