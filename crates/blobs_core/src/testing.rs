//! Scripted command runner for tests.
//!
//! Records every invocation without spawning anything. Responses are queued
//! per command line; the last queued response repeats once the queue drains,
//! and unscripted commands succeed with empty output.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::reporter::StatusReporter;
use crate::runner::{CommandOutcome, CommandOutput, CommandRunner, Tool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<(Tool, String), VecDeque<CommandOutcome>>,
    absent: HashSet<Tool>,
    calls: Vec<Invocation>,
}

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    state: Mutex<ScriptState>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `outcome` for command lines starting with `line` (e.g. `"flash --slot=all tz"`).
    pub fn push(&self, tool: Tool, line: &str, outcome: CommandOutcome) -> &Self {
        self.state()
            .scripts
            .entry((tool, line.to_string()))
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn ok(&self, tool: Tool, line: &str, stdout: &str) -> &Self {
        self.push(tool, line, completed(0, stdout, ""))
    }

    /// fastboot prints most answers on stderr; `ok_stderr` scripts that shape.
    pub fn ok_stderr(&self, tool: Tool, line: &str, stderr: &str) -> &Self {
        self.push(tool, line, completed(0, "", stderr))
    }

    pub fn fail(&self, tool: Tool, line: &str, code: i32, stderr: &str) -> &Self {
        self.push(tool, line, completed(code, "", stderr))
    }

    /// Every call to `tool` reports the binary as missing.
    pub fn absent(&self, tool: Tool) -> &Self {
        self.state().absent.insert(tool);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.state().calls.clone()
    }

    /// Number of recorded calls to `tool` whose command line starts with `line`.
    pub fn count(&self, tool: Tool, line: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.tool == tool && c.line().starts_with(line))
            .count()
    }
}

pub fn completed(code: i32, stdout: &str, stderr: &str) -> CommandOutcome {
    CommandOutcome::Completed(CommandOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    })
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, tool: Tool, args: &[String]) -> Result<CommandOutcome> {
        let mut state = self.state();
        let invocation = Invocation { tool, args: args.to_vec() };
        let line = invocation.line();
        state.calls.push(invocation);

        if state.absent.contains(&tool) {
            return Ok(CommandOutcome::ToolAbsent);
        }

        // Longest scripted prefix wins so "getvar all" and "getvar is-userspace" stay apart.
        let key = state
            .scripts
            .keys()
            .filter(|(t, l)| *t == tool && (line == *l || line.starts_with(&format!("{} ", l))))
            .max_by_key(|(_, l)| l.len())
            .cloned();

        let outcome = match key.and_then(|k| state.scripts.get_mut(&k)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| completed(0, "", "")),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| completed(0, "", "")),
            None => completed(0, "", ""),
        };
        Ok(outcome)
    }
}

/// Keeps every status line, tagged with its level.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, level: &'static str, msg: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((level, msg.to_string()));
    }

    pub fn lines(&self, level: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines("err")
    }
}

impl StatusReporter for RecordingReporter {
    fn step(&self, msg: &str) {
        self.record("step", msg);
    }

    fn ok(&self, msg: &str) {
        self.record("ok", msg);
    }

    fn warn(&self, msg: &str) {
        self.record("warn", msg);
    }

    fn err(&self, msg: &str) {
        self.record("err", msg);
    }
}
