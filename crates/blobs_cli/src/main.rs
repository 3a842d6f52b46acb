mod ui;

use anyhow::{Context, bail};
use blobs_core::artifacts::{self, ArtifactFetcher};
use blobs_core::config::Timing;
use blobs_core::constants::*;
use blobs_core::{
    DeviceTransport, FlashOutcome, FlashReport, FlasherConfig, Session, StatusReporter, SystemRunner, ToolPaths,
};
use clap::Parser;
use colored::*;
use figlet_rs::FIGfont;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EXIT_DECLINED: u8 = 1;
const EXIT_FATAL: u8 = 2;
const EXIT_PARTIAL: u8 = 3;

#[derive(Parser, Debug)]
#[command(version, about = "Re-flashes the OnePlus N200 C.37 firmware blobs through fastbootd", long_about = None)]
struct Args {
    /// TOML file overriding the built-in device profile, timings and partition table
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only talk to the device with this serial
    #[arg(short, long)]
    serial: Option<String>,

    /// Flash already extracted images from DIR instead of downloading them
    #[arg(long, value_name = "DIR")]
    images: Option<PathBuf>,

    /// Keep the download directory after flashing
    #[arg(long)]
    keep_files: bool,

    /// Accept the disclaimer without prompting
    #[arg(short, long)]
    yes: bool,

    /// Report the connected device and exit without changing anything
    #[arg(long)]
    detect: bool,

    /// Leave the device in fastbootd when done
    #[arg(long)]
    no_reboot: bool,

    /// Print the flash report as JSON
    #[arg(long)]
    json: bool,

    /// Log level used when BLOBS_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value_t = tracing::Level::WARN)]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            ui::err(&format!("{:#}", e));
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_logging(level: tracing::Level) {
    match EnvFilter::builder().with_env_var("BLOBS_LOG").try_from_env() {
        Ok(filter) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .init(),
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = FlasherConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if args.serial.is_some() {
        config.serial = args.serial.clone();
    }

    print_banner();

    let reporter: Arc<dyn StatusReporter> = Arc::new(ui::ConsoleReporter);
    let runner = Arc::new(SystemRunner::new(ToolPaths::resolve(&config.tools)));
    let session = Session::new(runner, &config, reporter.clone());

    if args.detect {
        return Ok(detect(&session, &config.timing).await);
    }

    if !args.yes {
        println!("{}", DISCLAIMER.yellow());
        if !ui::confirm_yes(CONFIRM_PROMPT) {
            ui::warn("Aborted by user.");
            return Ok(ExitCode::from(EXIT_DECLINED));
        }
    }

    ui::section("Starting Device Detection");
    if let Err(e) = session.prepare_device().await {
        // The session already reported the failure on the console.
        tracing::debug!(error = %e, "device preparation failed");
        return Ok(ExitCode::from(EXIT_FATAL));
    }

    let owned = args.images.is_none();
    let dir = match &args.images {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("image directory {} does not exist", dir.display());
            }
            dir.clone()
        }
        None => artifacts::create_work_dir().context("failed to create download directory")?,
    };
    let remove = owned && !args.keep_files;
    let dir = scopeguard::guard(dir, move |dir| {
        if remove {
            ui::step(&format!("Cleaning up temporary files: {}", dir.display()));
            match fs::remove_dir_all(&dir) {
                Ok(()) => ui::ok("Cleanup complete."),
                Err(e) => ui::warn(&format!("Could not remove {}: {}", dir.display(), e)),
            }
        } else if owned {
            ui::step(&format!("Keeping downloaded files in {}", dir.display()));
        }
    });

    if owned {
        ui::section("Downloading Needed Update Files");
        ui::step(&format!("Temporary download directory: {}", dir.display()));
        let fetcher = ArtifactFetcher::new(config.artifacts.clone(), reporter.clone())?;
        let fetched = fetcher.download_all(&dir).await;
        if !fetched.failed.is_empty() {
            ui::warn(&format!("{} file(s) could not be downloaded", fetched.failed.len()));
        }
        let extracted = artifacts::extract_all(&dir, reporter.clone()).await?;
        if !extracted.failed.is_empty() {
            ui::warn(&format!("{} file(s) could not be extracted", extracted.failed.len()));
        }
    } else {
        ui::step(&format!("Using extracted images from {}", dir.display()));
    }

    ui::section("Flashing Update Files");
    let report = session.flash_all(&dir, &config.partitions).await;
    print_summary(&report);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    drop(dir);

    if let FlashReport::Aborted(reason) = report {
        ui::err(&format!("Flashing aborted: {}.", reason));
        return Ok(ExitCode::from(EXIT_FATAL));
    }

    if !args.no_reboot {
        session.finish().await;
    }

    if report.is_clean() {
        ui::ok("All done.");
        Ok(ExitCode::SUCCESS)
    } else {
        ui::warn(&format!("Done with {} failed partition(s).", report.failed()));
        Ok(ExitCode::from(EXIT_PARTIAL))
    }
}

fn print_banner() {
    println!();
    match FIGfont::standard() {
        Ok(font) => match font.convert(APP_NAME) {
            Some(art) => println!("{}", art.to_string().cyan()),
            None => println!("{}", APP_NAME.cyan().bold()),
        },
        Err(_) => println!("{}", APP_NAME.cyan().bold()),
    }
    println!("Version: {}", VERSION.yellow());
}

async fn detect(session: &Session, timing: &Timing) -> ExitCode {
    let detector = session.detector();

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message("Scanning for ADB and fastboot devices...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let transport = detector.wait_for_device(timing.device_wait(), timing.retry()).await;
    pb.finish_and_clear();

    if transport == DeviceTransport::Absent {
        ui::err(&format!("No device detected within {}s. Check the cable and drivers.", timing.device_wait_secs));
        return ExitCode::from(EXIT_FATAL);
    }

    let model = &detector.profile().model_token;
    let is_target = detector.is_target_device(transport).await;
    let mode_str = match transport {
        DeviceTransport::Bridge => "ADB (system)".green(),
        DeviceTransport::UserspaceFastboot => "FastbootD".yellow(),
        _ => transport.to_string().yellow(),
    };
    let divider = "─".repeat(60).white();
    println!("{}", divider);
    println!(
        "  Mode: {}  Target {}: {}",
        mode_str,
        model,
        if is_target { "yes".green() } else { "no".red() }
    );
    if transport.is_fastboot() && transport != DeviceTransport::UserspaceFastboot {
        println!("  {}", "A flashing run will reboot the device into fastbootd first.".bright_black());
    }
    println!("{}", divider);

    if is_target { ExitCode::SUCCESS } else { ExitCode::from(EXIT_FATAL) }
}

fn print_summary(report: &FlashReport) {
    let results = report.results();
    if results.is_empty() {
        return;
    }
    let divider = "─".repeat(60).white();
    println!("\n{}", divider);
    for result in results {
        let status = match &result.outcome {
            FlashOutcome::Flashed => "flashed".green(),
            FlashOutcome::SkippedMissingFile => "missing".yellow(),
            FlashOutcome::Failed(_) => "failed".red(),
        };
        println!(
            "  {:<14} {} {}",
            result.partition,
            format!("{:<20}", result.image).bright_black(),
            status
        );
    }
    println!("{}", divider);
    println!(
        "Summary: {} flashed  {} skipped  {} failed",
        report.flashed().to_string().green(),
        report.skipped().to_string().yellow(),
        report.failed().to_string().red()
    );
}
