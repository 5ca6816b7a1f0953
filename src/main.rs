mod config;
mod sched;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::thread;
use std::time::Duration;

use crate::config::loader::load_config;
use crate::config::structs::Config;
use crate::sched::engine::{SampleOutcome, SchedstatMonitor};
use crate::sched::sample::CpuCounters;

#[derive(Parser)]
#[command(name = "schedsnap")]
#[command(version)]
#[command(about = "Point-in-time Linux scheduler counter inspector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Take two samples and print the per-CPU delta (default)
    Sample {
        /// Milliseconds to wait between the two samples
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Print the delta as JSON instead of plain text
        #[arg(long)]
        json: bool,
        /// Leave counter collection enabled on exit
        #[arg(long)]
        keep_enabled: bool,
    },
    /// Turn kernel scheduler counter collection on
    Enable,
    /// Turn kernel scheduler counter collection off
    Disable,
    /// Show kernel info and whether collection is enabled
    Status,
}

fn main() -> Result<()> {
    utils::logger::init();

    let cli = Cli::parse();

    // Toggling the kernel switch needs root; reading the counters does
    // not. A diagnostic tool should still run in restricted
    // environments, so warn instead of exiting.
    if !matches!(cli.command, Some(Commands::Status)) && !utils::privilege::is_root() {
        warn!("Not running as root; toggling counter collection will likely fail");
    }

    let config = load_config();

    match cli.command.unwrap_or(Commands::Sample {
        interval_ms: None,
        json: false,
        keep_enabled: false,
    }) {
        Commands::Sample {
            interval_ms,
            json,
            keep_enabled,
        } => run_sample(&config, interval_ms, json, keep_enabled),
        Commands::Enable => run_enable(&config),
        Commands::Disable => run_disable(&config),
        Commands::Status => run_status(&config),
    }
}

/// Delta report shape for --json output.
#[derive(Serialize)]
struct DeltaReport<'a> {
    recorded_at: chrono::DateTime<chrono::Local>,
    interval_ms: u64,
    cpus: &'a [CpuCounters],
}

fn run_sample(config: &Config, interval_ms: Option<u64>, json: bool, keep_enabled: bool) -> Result<()> {
    let interval = Duration::from_millis(interval_ms.unwrap_or(config.sample.interval_ms));
    let mut monitor = SchedstatMonitor::new(config.sched.clone());

    // 1. Switch the counters on, take the baseline, wait, resample.
    monitor.enable_counters();
    let outcome = take_sample_pair(&mut monitor, interval);

    // 2. Switch them back off before looking at the result, so an
    //    aborted run does not leave collection running.
    if !keep_enabled {
        monitor.disable_counters();
    }

    // 3. Render whatever the second cycle produced.
    match outcome? {
        SampleOutcome::Delta => {
            if json {
                let report = DeltaReport {
                    recorded_at: chrono::Local::now(),
                    interval_ms: interval.as_millis() as u64,
                    cpus: monitor.delta(),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Samples:");
                print!("{}", monitor.render_delta());
            }
        }
        SampleOutcome::FirstSample | SampleOutcome::BaselineReset => {
            info!("No delta this run (baseline was reset mid-sampling); try again");
        }
    }

    Ok(())
}

/// sample -> wait -> sample, reporting the second cycle's outcome.
fn take_sample_pair(monitor: &mut SchedstatMonitor, interval: Duration) -> Result<SampleOutcome> {
    monitor.sample()?;
    thread::sleep(interval);
    monitor.sample()
}

fn run_enable(config: &Config) -> Result<()> {
    let monitor = SchedstatMonitor::new(config.sched.clone());
    if monitor.enable_counters() {
        info!("Scheduler counter collection enabled");
    }
    Ok(())
}

fn run_disable(config: &Config) -> Result<()> {
    let monitor = SchedstatMonitor::new(config.sched.clone());
    if monitor.disable_counters() {
        info!("Scheduler counter collection disabled");
    }
    Ok(())
}

fn run_status(config: &Config) -> Result<()> {
    use procfs::Current;

    // ANSI Colors
    const RED: &str = "\x1b[0;31m";
    const GREEN: &str = "\x1b[0;32m";
    const BOLD: &str = "\x1b[1m";
    const DIM: &str = "\x1b[2m";
    const NC: &str = "\x1b[0m";

    println!();
    println!("{}schedsnap status{}", BOLD, NC);
    println!();

    // 1. Kernel switch state
    let switch = std::fs::read_to_string(&config.sched.control_path).ok();
    let state = match switch.as_deref().map(str::trim) {
        Some("1") => format!("{}[ENABLED]{}", GREEN, NC),
        Some("0") => format!("{}[DISABLED]{}", RED, NC),
        Some(other) => format!("{}[UNKNOWN: {}]{}", DIM, other, NC),
        None => format!("{}[UNREADABLE]{}", DIM, NC),
    };
    println!(
        "Counter collection: {} ({})",
        state,
        config.sched.control_path.display()
    );

    // 2. Kernel and topology
    match procfs::KernelVersion::current() {
        Ok(v) => println!("Kernel:             {}.{}.{}", v.major, v.minor, v.patch),
        Err(e) => warn!("Could not read kernel version: {}", e),
    }
    match procfs::CpuInfo::current() {
        Ok(cpuinfo) => println!("CPUs:               {}", cpuinfo.num_cores()),
        Err(e) => warn!("Could not read cpuinfo: {}", e),
    }

    // 3. Counter file banner
    match std::fs::read_to_string(&config.sched.schedstat_path) {
        Ok(content) => {
            let banner = content.lines().next().unwrap_or("");
            println!(
                "Schedstat banner:   {} ({})",
                banner,
                config.sched.schedstat_path.display()
            );
        }
        Err(e) => warn!(
            "Could not read {}: {}",
            config.sched.schedstat_path.display(),
            e
        ),
    }

    println!();
    Ok(())
}
