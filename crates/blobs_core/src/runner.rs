//! External command execution.
//!
//! Every `adb` / `fastboot` invocation goes through [`CommandRunner`] so the
//! detection and flashing logic can be driven by scripted output in tests.

use async_trait::async_trait;
use std::env;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolOverrides;
use crate::constants::PLATFORM_TOOLS_DIR;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Adb,
    Fastboot,
}

impl Tool {
    pub fn binary_name(self) -> &'static str {
        match (self, cfg!(target_os = "windows")) {
            (Tool::Adb, true) => "adb.exe",
            (Tool::Adb, false) => "adb",
            (Tool::Fastboot, true) => "fastboot.exe",
            (Tool::Fastboot, false) => "fastboot",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Adb => f.write_str("adb"),
            Tool::Fastboot => f.write_str("fastboot"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// fastboot writes most of its answers to stderr, so both streams are scanned as one blob.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// A missing binary is a normal answer ("no signal"), not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    ToolAbsent,
    Completed(CommandOutput),
}

impl CommandOutcome {
    pub fn is_absent(&self) -> bool {
        matches!(self, CommandOutcome::ToolAbsent)
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, CommandOutcome::Completed(out) if out.success())
    }

    pub fn stdout_text(&self) -> &str {
        match self {
            CommandOutcome::ToolAbsent => "",
            CommandOutcome::Completed(out) => &out.stdout,
        }
    }

    pub fn combined_text(&self) -> String {
        match self {
            CommandOutcome::ToolAbsent => String::new(),
            CommandOutcome::Completed(out) => out.combined(),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `tool` with `args` to completion and captures both output streams.
    async fn run(&self, tool: Tool, args: &[String]) -> Result<CommandOutcome>;
}

/// Where `adb` and `fastboot` live on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    adb: PathBuf,
    fastboot: PathBuf,
}

impl ToolPaths {
    /// Explicit overrides win, then a bundled `platform-tools` directory, then `PATH`.
    pub fn resolve(overrides: &ToolOverrides) -> Self {
        Self {
            adb: overrides.adb.clone().unwrap_or_else(|| Self::locate(Tool::Adb)),
            fastboot: overrides.fastboot.clone().unwrap_or_else(|| Self::locate(Tool::Fastboot)),
        }
    }

    pub fn path(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Adb => &self.adb,
            Tool::Fastboot => &self.fastboot,
        }
    }

    fn locate(tool: Tool) -> PathBuf {
        let mut candidates = Vec::new();
        if let Ok(cwd) = env::current_dir() {
            candidates.push(cwd.join(PLATFORM_TOOLS_DIR));
        }
        if let Ok(mut exe_path) = env::current_exe() {
            exe_path.pop();
            candidates.push(exe_path.join(PLATFORM_TOOLS_DIR));
        }

        candidates
            .into_iter()
            .map(|dir| dir.join(tool.binary_name()))
            .find(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from(tool.binary_name()))
    }
}

/// Runs the real binaries.
pub struct SystemRunner {
    paths: ToolPaths,
}

impl SystemRunner {
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, tool: Tool, args: &[String]) -> Result<CommandOutcome> {
        let program = self.paths.path(tool);
        debug!(%tool, program = %program.display(), ?args, "spawning");

        let result = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) => {
                let output = CommandOutput::from(output);
                debug!(%tool, code = ?output.code, "exited");
                Ok(CommandOutcome::Completed(output))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%tool, program = %program.display(), "binary not found");
                Ok(CommandOutcome::ToolAbsent)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_binary_is_tool_absent() {
        let overrides = ToolOverrides {
            adb: Some(PathBuf::from("/nonexistent/platform-tools/adb")),
            fastboot: Some(PathBuf::from("/nonexistent/platform-tools/fastboot")),
        };
        let runner = SystemRunner::new(ToolPaths::resolve(&overrides));
        let outcome = runner.run(Tool::Adb, &args(&["devices"])).await.unwrap();
        assert!(outcome.is_absent());
        assert_eq!(outcome.stdout_text(), "");
        assert!(!outcome.succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let overrides = ToolOverrides {
            adb: None,
            fastboot: Some(PathBuf::from("sh")),
        };
        let runner = SystemRunner::new(ToolPaths::resolve(&overrides));
        let outcome = runner
            .run(Tool::Fastboot, &args(&["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        match outcome {
            CommandOutcome::Completed(out) => {
                assert_eq!(out.code, Some(3));
                assert!(!out.success());
                assert_eq!(out.combined(), "out\nerr\n");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn overrides_take_precedence() {
        let overrides = ToolOverrides {
            adb: Some(PathBuf::from("/opt/sdk/adb")),
            fastboot: None,
        };
        let paths = ToolPaths::resolve(&overrides);
        assert_eq!(paths.path(Tool::Adb), Path::new("/opt/sdk/adb"));
        assert!(paths.path(Tool::Fastboot).ends_with(Tool::Fastboot.binary_name()));
    }
}
