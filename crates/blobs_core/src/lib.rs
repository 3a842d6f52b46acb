pub mod error;
pub mod device;
pub mod runner;
pub mod adb;
pub mod fastboot;
pub mod detector;
pub mod transition;
pub mod flasher;
pub mod session;
pub mod artifacts;
pub mod reporter;

pub mod config;
pub mod constants;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{FlashError, Result};
pub use device::{AbortReason, DeviceTransport, FastbootSubmode, FlashOutcome, FlashReport, PartitionResult, PartitionSpec};
pub use runner::{CommandOutcome, CommandOutput, CommandRunner, SystemRunner, Tool, ToolPaths};
pub use detector::DeviceDetector;
pub use transition::ModeTransitioner;
pub use flasher::Flasher;
pub use session::Session;
pub use config::FlasherConfig;
pub use reporter::StatusReporter;
