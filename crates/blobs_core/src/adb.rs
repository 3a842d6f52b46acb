use std::sync::Arc;

use crate::error::Result;
use crate::runner::{CommandOutcome, CommandRunner, Tool};

#[derive(Clone)]
pub struct AdbClient {
    runner: Arc<dyn CommandRunner>,
    pub selected_serial: Option<String>,
}

impl AdbClient {
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
        self.runner.run(Tool::Adb, &self.build_args(args)).await
    }

    /// `adb devices`. The serial filter is not applied, the listing is global.
    pub async fn devices(&self) -> Result<CommandOutcome> {
        self.runner.run(Tool::Adb, &["devices".to_string()]).await
    }

    /// Serials of devices that are booted and authorised.
    pub async fn list_serials(&self) -> Result<Vec<String>> {
        let outcome = self.devices().await?;
        let serials = parse_device_list(outcome.stdout_text());
        Ok(match self.get_serial() {
            Some(wanted) => serials.into_iter().filter(|s| s == wanted).collect(),
            None => serials,
        })
    }

    pub async fn getprop(&self) -> Result<CommandOutcome> {
        self.capture(&["shell", "getprop"]).await
    }

    pub async fn reboot(&self, target: Option<&str>) -> Result<bool> {
        let mut args = vec!["reboot"];
        if let Some(t) = target {
            args.push(t);
        }
        Ok(self.capture(&args).await?.succeeded())
    }
}

/// Parses `adb devices`, keeping only entries whose state is `device`
/// (so `unauthorized`, `offline`, `recovery` and `sideload` are ignored).
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [serial, "device", ..] => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn parses_device_list() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n\
                      a1b2c3d4\tdevice\n\
                      e5f6\tunauthorized\n\
                      emulator-5554\toffline\n\n";
        assert_eq!(parse_device_list(output), vec!["a1b2c3d4".to_string()]);
        assert!(parse_device_list("List of devices attached\n\n").is_empty());
        assert!(parse_device_list("").is_empty());
    }

    #[tokio::test]
    async fn serial_is_prefixed_and_filters_listing() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok(Tool::Adb, "devices", "List of devices attached\nAAA\tdevice\nBBB\tdevice\n");
        let mut adb = AdbClient::new(runner.clone());
        adb.set_serial(Some("BBB".into()));

        assert_eq!(adb.list_serials().await.unwrap(), vec!["BBB".to_string()]);
        assert!(adb.reboot(Some("fastboot")).await.unwrap());
        assert_eq!(runner.count(Tool::Adb, "-s BBB reboot fastboot"), 1);
    }
}
