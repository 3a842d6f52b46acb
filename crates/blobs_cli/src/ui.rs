use blobs_core::StatusReporter;
use colored::*;
use rustyline::DefaultEditor;
use std::io::{self, Write};

pub fn step(msg: &str) {
    println!("{} {}", ">>".cyan().bold(), msg.bright_white());
}

pub fn ok(msg: &str) {
    println!("{} {}", "✔".green().bold(), msg.green());
}

pub fn warn(msg: &str) {
    println!("{} {}", "⚠️".yellow().bold(), msg.yellow());
}

pub fn err(msg: &str) {
    println!("{} {}", "[!]".red().bold(), msg.red());
}

pub fn section(msg: &str) {
    let bar = "=".repeat(60).white();
    println!("\n{}", bar);
    println!("{}", msg.bright_white().bold());
    println!("{}", bar);
}

/// Anything other than a literal `yes` (any case) declines, including Ctrl-C and EOF.
pub fn confirm_yes(prompt: &str) -> bool {
    let answer = match DefaultEditor::new() {
        Ok(mut rl) => rl.readline(&prompt.cyan().to_string()).ok(),
        Err(_) => {
            print!("{}", prompt);
            let _ = io::stdout().flush();
            let mut line = String::new();
            io::stdin().read_line(&mut line).ok().map(|_| line)
        }
    };
    answer.is_some_and(|a| a.trim().eq_ignore_ascii_case("yes"))
}

pub struct ConsoleReporter;

impl StatusReporter for ConsoleReporter {
    fn step(&self, msg: &str) {
        step(msg);
    }

    fn ok(&self, msg: &str) {
        ok(msg);
    }

    fn warn(&self, msg: &str) {
        warn(msg);
    }

    fn err(&self, msg: &str) {
        err(msg);
    }
}
