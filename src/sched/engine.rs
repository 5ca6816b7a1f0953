//! Rolling two-generation schedstat sampling
//!
//! Owns the previous/current/delta generations for all CPUs, reads the
//! counter file, validates the version banner and computes the delta
//! generation. Also toggles the kernel switch that makes the counters
//! tick at all.

use anyhow::{bail, Context, Result};
use log::{error, info};
use regex::Regex;
use std::fs;
use std::mem;

use crate::config::structs::SchedConfig;
use crate::sched::sample::CpuCounters;

/// Outcome of one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// First successful read ever; only `current` is populated.
    FirstSample,
    /// Both generations agreed and the delta was computed.
    Delta,
    /// CPU topology changed or a counter moved backward; all state was
    /// cleared so the next call starts from scratch.
    BaselineReset,
}

/// Two-generation sample history plus the computed delta.
///
/// Not safe for concurrent mutation; callers that sample periodically
/// must own the monitor from a single loop.
pub struct SchedstatMonitor {
    config: SchedConfig,
    /// Banner substring the counter file must announce, e.g. "version 15".
    version_token: String,
    previous: Vec<CpuCounters>,
    current: Vec<CpuCounters>,
    delta: Vec<CpuCounters>,
}

impl SchedstatMonitor {
    pub fn new(config: SchedConfig) -> Self {
        let version_token = format!("version {}", config.expected_version);
        Self {
            config,
            version_token,
            previous: Vec::new(),
            current: Vec::new(),
            delta: Vec::new(),
        }
    }

    /// Turn kernel counter collection on. Best effort: a failure is
    /// logged and sampling proceeds, yielding zeroed counters if the
    /// switch really is off.
    pub fn enable_counters(&self) -> bool {
        self.write_control("1\n")
    }

    /// Turn kernel counter collection off. Best effort, like enable.
    pub fn disable_counters(&self) -> bool {
        self.write_control("0\n")
    }

    fn write_control(&self, value: &str) -> bool {
        match fs::write(&self.config.control_path, value) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Could not write {:?} to {}: {}",
                    value.trim_end(),
                    self.config.control_path.display(),
                    e
                );
                false
            }
        }
    }

    /// One full sampling cycle: read the counter file, shift
    /// generations, and compute the delta when a baseline exists.
    pub fn sample(&mut self) -> Result<SampleOutcome> {
        // Read before shifting generations so a failed open or a stale
        // banner cannot cost us the current baseline.
        let content = fs::read_to_string(&self.config.schedstat_path)
            .with_context(|| format!("could not read {}", self.config.schedstat_path.display()))?;

        let mut lines = content.lines();
        let banner = lines.next().unwrap_or("");
        if !banner.contains(&self.version_token) {
            bail!(
                "schedstat version mismatch: expected {:?}, got {}",
                self.version_token,
                describe_banner(banner)
            );
        }

        self.previous = mem::take(&mut self.current);
        self.delta.clear();

        for line in lines {
            // The file also carries timestamp and per-domain sections;
            // only the cpu lines are of interest here.
            if !line.starts_with("cpu") {
                continue;
            }
            match CpuCounters::parse(line, self.config.max_cpu_index) {
                Ok(sample) => self.current.push(sample),
                Err(e) => {
                    // Never keep a partial generation around.
                    self.clear_all();
                    return Err(e);
                }
            }
        }

        // No baseline yet, nothing to diff against.
        if self.previous.is_empty() {
            return Ok(SampleOutcome::FirstSample);
        }

        if self.previous.len() != self.current.len() {
            info!(
                "CPU list changed between samples ({} -> {}), starting over",
                self.previous.len(),
                self.current.len()
            );
            self.clear_all();
            return Ok(SampleOutcome::BaselineReset);
        }

        if self.previous.iter().zip(&self.current).any(|(p, c)| p.cpu != c.cpu) {
            info!("CPU list reordered between samples, starting over");
            self.clear_all();
            return Ok(SampleOutcome::BaselineReset);
        }

        match diff_generations(&self.previous, &self.current) {
            Ok(delta) => {
                self.delta = delta;
                Ok(SampleOutcome::Delta)
            }
            Err(e) => {
                // Expected now and then (counter reset or overflow);
                // reset the baseline rather than failing the run.
                info!("Stats seem to be moving backward, starting over: {:#}", e);
                self.clear_all();
                Ok(SampleOutcome::BaselineReset)
            }
        }
    }

    /// Drop all three generations back to empty.
    pub fn clear_all(&mut self) {
        self.previous.clear();
        self.current.clear();
        self.delta.clear();
    }

    pub fn previous(&self) -> &[CpuCounters] {
        &self.previous
    }

    pub fn current(&self) -> &[CpuCounters] {
        &self.current
    }

    pub fn delta(&self) -> &[CpuCounters] {
        &self.delta
    }

    /// One text line per CPU in the delta generation; empty output when
    /// no delta has been computed yet.
    pub fn render_delta(&self) -> String {
        let mut out = String::new();
        for sample in &self.delta {
            out.push_str(&format!("{}\n", sample));
        }
        out
    }
}

fn diff_generations(previous: &[CpuCounters], current: &[CpuCounters]) -> Result<Vec<CpuCounters>> {
    current
        .iter()
        .zip(previous)
        .map(|(cur, prev)| cur.delta_since(prev))
        .collect()
}

/// Render a rejected banner for the mismatch error, pulling the version
/// number out when there is one.
fn describe_banner(banner: &str) -> String {
    let observed = Regex::new(r"version\s+(\d+)")
        .ok()
        .and_then(|re| re.captures(banner).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()));
    match observed {
        Some(version) => format!("version {} ({:?})", version, banner),
        None => format!("{:?}", banner),
    }
}
