//! CLI entry point for volta-daq
//!
//! Records one paced measurement session from the first serial port found (or the one
//! given with `--port`) into the file named on the command line.
//!
//! # Usage
//!
//! ```bash
//! volta-daq NavigatorTest1.log
//! volta-daq --port /dev/ttyUSB0 --window-minutes 1 --samples 6000 run1.log
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use volta_daq::config::{AppConfig, SerialConfig};
use volta_daq::logging::{self, OutputFormat, TracingConfig};
use volta_daq::session::{AcquisitionSession, SessionOutcome};
use volta_daq::transport::{self, SerialSettings};

/// Steps shown while no serial port is present.
const CONNECT_INSTRUCTIONS: &[&str] = &[
    "Connect the measurement box to a USB port",
    "Make sure the USB-serial driver is installed",
    "Check that no other program holds the port open",
];

#[derive(Parser)]
#[command(name = "volta-daq")]
#[command(about = "Paced power-consumption recording from a serial measurement box", long_about = None)]
struct Cli {
    /// Sample log to write (replaced if it exists)
    output: PathBuf,

    /// Serial port; the first available port is used when omitted
    #[arg(long)]
    port: Option<String>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Measurement window in minutes
    #[arg(long)]
    window_minutes: Option<u64>,

    /// Number of samples to collect
    #[arg(long)]
    samples: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, default_value = "compact")]
    log_format: String,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => AppConfig::load().context("Failed to load configuration")?,
        };

        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(minutes) = self.window_minutes {
            config.acquisition.window_minutes = minutes;
        }
        if let Some(samples) = self.samples {
            config.acquisition.target_count = samples;
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let format: OutputFormat = cli.log_format.parse()?;
    logging::init(TracingConfig::from_app_config(&config)?.with_format(format));

    let plan = config.acquisition.plan()?;
    let port = match &config.serial.port {
        Some(port) => port.clone(),
        None => wait_for_port(&config.serial).await?,
    };
    println!("Port: {port}");

    let settings = SerialSettings::from_config(&port, &config.serial);
    let transport = transport::open_serial(&settings)
        .await
        .with_context(|| format!("Failed to open serial port {port}"))?;

    let session = AcquisitionSession::new(plan, config.serial.read_timeout());
    let progress = session.progress();
    let destination = cli.output.clone();
    let mut task = tokio::spawn(async move { session.run(transport, &destination).await });

    println!("Measuring power consumption:");
    let mut shown = None;
    let joined = tokio::select! {
        joined = &mut task => joined,
        () = progress.poll_until_finished(|p| {
            let collected = p.collected();
            if shown != Some(collected) {
                shown = Some(collected);
                print!("\r{}    ", p.status());
                let _ = std::io::stdout().flush();
            }
        }) => task.await,
    };
    println!();

    let report = joined
        .context("Acquisition task panicked")?
        .with_context(|| format!("Failed to record {}", cli.output.display()))?;

    match report.outcome {
        SessionOutcome::Completed => println!(
            "Done: {} samples written to {}",
            report.samples_written,
            cli.output.display()
        ),
        SessionOutcome::TransportClosed => println!(
            "Device disconnected: {} of {} samples written to {}",
            report.samples_written,
            plan.target_count(),
            cli.output.display()
        ),
    }
    if report.malformed > 0 {
        println!("{} malformed lines skipped", report.malformed);
    }
    Ok(())
}

/// Poll for a serial port until one shows up, printing connection steps meanwhile.
async fn wait_for_port(config: &SerialConfig) -> Result<String> {
    loop {
        if let Some(port) = transport::first_available_port()? {
            return Ok(port);
        }
        println!("No serial port found.");
        println!("Please check the following:");
        for (i, step) in CONNECT_INSTRUCTIONS.iter().enumerate() {
            println!("{}. {}", i + 1, step);
        }
        tokio::time::sleep(config.discovery_interval().max(Duration::from_millis(100))).await;
    }
}
