use thiserror::Error;

use crate::device::DeviceTransport;

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("No device found, check the USB connection")]
    DeviceNotFound,

    #[error("Connected device ({0}) is not the expected model")]
    IdentityMismatch(DeviceTransport),

    #[error("Device did not reach fastbootd after {polls} polls")]
    ModeTransitionTimeout { polls: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Download error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Extraction failed for {file}: {reason}")]
    Extract { file: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FlashError>;
