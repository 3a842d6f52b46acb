use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::runner::{CommandOutcome, CommandRunner, Tool};

#[derive(Clone)]
pub struct FastbootClient {
    runner: Arc<dyn CommandRunner>,
    pub selected_serial: Option<String>,
}

impl FastbootClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            selected_serial: None,
        }
    }

    pub fn set_serial(&mut self, serial: Option<String>) {
        self.selected_serial = serial;
    }

    pub fn get_serial(&self) -> Option<&str> {
        self.selected_serial.as_deref()
    }

    fn build_args(&self, args: &[&str]) -> Vec<String> {
        let mut cmd_args = Vec::new();
        if let Some(ref serial) = self.selected_serial {
            cmd_args.push("-s".to_string());
            cmd_args.push(serial.clone());
        }
        for arg in args {
            cmd_args.push(arg.to_string());
        }
        cmd_args
    }

    pub async fn capture(&self, args: &[&str]) -> Result<CommandOutcome> {
        self.runner.run(Tool::Fastboot, &self.build_args(args)).await
    }

    pub async fn devices(&self) -> Result<CommandOutcome> {
        self.runner.run(Tool::Fastboot, &["devices".to_string()]).await
    }

    /// Serials listed by `fastboot devices`, narrowed to the selected serial if any.
    pub async fn list_serials(&self) -> Result<Vec<String>> {
        let outcome = self.devices().await?;
        let serials = parse_device_list(&outcome.combined_text());
        Ok(match self.get_serial() {
            Some(wanted) => serials.into_iter().filter(|s| s == wanted).collect(),
            None => serials,
        })
    }

    pub async fn getvar(&self, var: &str) -> Result<CommandOutcome> {
        self.capture(&["getvar", var]).await
    }

    pub async fn getvar_all(&self) -> Result<CommandOutcome> {
        self.getvar("all").await
    }

    pub async fn reboot(&self, target: Option<&str>) -> Result<bool> {
        let mut args = vec!["reboot"];
        if let Some(t) = target {
            args.push(t);
        }
        Ok(self.capture(&args).await?.succeeded())
    }

    /// `fastboot flash --slot=all <partition> <image>`.
    pub async fn flash_all_slots(&self, partition: &str, image_path: &Path) -> Result<CommandOutcome> {
        let image = image_path.to_string_lossy().into_owned();
        self.capture(&["flash", "--slot=all", partition, image.as_str()]).await
    }
}

/// Every non-blank line of `fastboot devices` names one device (first column).
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}
