//! Per-CPU schedstat line parsing and sample arithmetic
//!
//! One line of /proc/schedstat describes one CPU's scheduler counters.
//! The format is positional and part of the kernel ABI, so the parser
//! keeps the raw token order instead of inventing named fields.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// One CPU's scheduler counters at one instant.
///
/// Raw samples carry `delta_ms == 0`; only values produced by
/// [`CpuCounters::delta_since`] have a meaningful elapsed time.
#[derive(Debug, Clone, Serialize)]
pub struct CpuCounters {
    pub cpu: u32,

    /// sys_sched_yield() calls
    pub yld_count: u64,

    /// schedule() calls, and how many of them left the CPU idle
    pub sched_count: u64,
    pub sched_goidle: u64,

    /// try_to_wake_up() calls, and how many stayed on the local CPU
    pub ttwu_count: u64,
    pub ttwu_local: u64,

    /// Monotonic capture time; only compared between samples of the
    /// same CPU, never across CPUs.
    #[serde(skip)]
    sampled_at: Instant,

    pub delta_ms: i64,
}

impl CpuCounters {
    /// Parse one `cpu<N> ...` line into a sample.
    ///
    /// The line must start with the literal `cpu` immediately followed
    /// by the CPU index and a space. `max_cpu_index` is a parsing
    /// sanity bound, not a topology limit.
    pub fn parse(line: &str, max_cpu_index: u32) -> Result<Self> {
        let mut tokens = line.split_whitespace();

        let head = tokens
            .next()
            .with_context(|| format!("empty schedstat line: {:?}", line))?;
        let cpu: u32 = head
            .strip_prefix("cpu")
            .and_then(|idx| idx.parse().ok())
            .with_context(|| format!("not a per-cpu schedstat line: {:?}", line))?;
        if cpu > max_cpu_index {
            bail!("cpu index {} exceeds sanity bound {}: {:?}", cpu, max_cpu_index, line);
        }

        let yld_count = next_counter(&mut tokens, "yld_count", line)?;
        // Slot 1 is a legacy field from the O(1) scheduler; always
        // present, never read.
        tokens
            .next()
            .with_context(|| format!("truncated schedstat line: {:?}", line))?;
        let sched_count = next_counter(&mut tokens, "sched_count", line)?;
        let sched_goidle = next_counter(&mut tokens, "sched_goidle", line)?;
        let ttwu_count = next_counter(&mut tokens, "ttwu_count", line)?;
        let ttwu_local = next_counter(&mut tokens, "ttwu_local", line)?;

        Ok(Self {
            cpu,
            yld_count,
            sched_count,
            sched_goidle,
            ttwu_count,
            ttwu_local,
            sampled_at: Instant::now(),
            delta_ms: 0,
        })
    }

    /// Element-wise difference against an earlier sample of the same CPU.
    ///
    /// Errors if the CPUs differ or if any counter moved backward; a
    /// single regressed field invalidates the whole result.
    pub fn delta_since(&self, earlier: &Self) -> Result<Self> {
        if self.cpu != earlier.cpu {
            bail!(
                "cannot diff samples from different cpus ({} vs {})",
                self.cpu,
                earlier.cpu
            );
        }

        let sub = |name: &str, now: u64, then: u64| -> Result<u64> {
            now.checked_sub(then).with_context(|| {
                format!("{} moved backward on cpu{}: {} -> {}", name, self.cpu, then, now)
            })
        };

        Ok(Self {
            cpu: self.cpu,
            yld_count: sub("yld_count", self.yld_count, earlier.yld_count)?,
            sched_count: sub("sched_count", self.sched_count, earlier.sched_count)?,
            sched_goidle: sub("sched_goidle", self.sched_goidle, earlier.sched_goidle)?,
            ttwu_count: sub("ttwu_count", self.ttwu_count, earlier.ttwu_count)?,
            ttwu_local: sub("ttwu_local", self.ttwu_local, earlier.ttwu_local)?,
            sampled_at: self.sampled_at,
            // Saturates to zero if the clock reads equal, so deltas
            // never go negative.
            delta_ms: self.sampled_at.duration_since(earlier.sampled_at).as_millis() as i64,
        })
    }
}

/// Consume the next token and parse it as a non-negative counter.
///
/// Tokens are parsed as signed integers first so that a negative value
/// is rejected for its sign, not as a generic parse failure.
fn next_counter<'a, I>(tokens: &mut I, name: &str, line: &str) -> Result<u64>
where
    I: Iterator<Item = &'a str>,
{
    let token = tokens
        .next()
        .with_context(|| format!("truncated schedstat line, missing {}: {:?}", name, line))?;
    let value: i64 = token
        .parse()
        .with_context(|| format!("invalid {} {:?} in line: {:?}", name, token, line))?;
    if value < 0 {
        bail!("negative {} ({}) in line: {:?}", name, value, line);
    }
    Ok(value as u64)
}

impl fmt::Display for CpuCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CPU: {} delta_ms: {} yld_count: {} sched_count: {} sched_goidle: {} ttwu_count: {} ttwu_local: {}",
            self.cpu,
            self.delta_ms,
            self.yld_count,
            self.sched_count,
            self.sched_goidle,
            self.ttwu_count,
            self.ttwu_local,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_CPU: u32 = 16;

    #[test]
    fn parses_real_schedstat_line() {
        let line = "cpu0 3 0 10 2 5 1 18204 87789 128307";
        let s = CpuCounters::parse(line, MAX_CPU).unwrap();
        assert_eq!(s.cpu, 0);
        assert_eq!(s.yld_count, 3);
        assert_eq!(s.sched_count, 10);
        assert_eq!(s.sched_goidle, 2);
        assert_eq!(s.ttwu_count, 5);
        assert_eq!(s.ttwu_local, 1);
        assert_eq!(s.delta_ms, 0);
    }

    #[test]
    fn rendered_fields_round_trip() {
        let line = "cpu3 7 0 39536349 6522616 21294273 15161519 18204 87789 128307";
        let s = CpuCounters::parse(line, MAX_CPU).unwrap();
        let rendered = s.to_string();
        assert_eq!(
            rendered,
            "CPU: 3 delta_ms: 0 yld_count: 7 sched_count: 39536349 \
             sched_goidle: 6522616 ttwu_count: 21294273 ttwu_local: 15161519"
        );
    }

    #[test]
    fn rejects_bad_prefix() {
        assert!(CpuCounters::parse("domain0 3 0 10 2 5 1", MAX_CPU).is_err());
        assert!(CpuCounters::parse("cpu 3 0 10 2 5 1", MAX_CPU).is_err());
        assert!(CpuCounters::parse("cpuX 3 0 10 2 5 1", MAX_CPU).is_err());
        assert!(CpuCounters::parse("", MAX_CPU).is_err());
    }

    #[test]
    fn rejects_cpu_index_beyond_bound() {
        assert!(CpuCounters::parse("cpu17 3 0 10 2 5 1", MAX_CPU).is_err());
        assert!(CpuCounters::parse("cpu16 3 0 10 2 5 1", MAX_CPU).is_ok());
    }

    #[test]
    fn rejects_non_numeric_field() {
        assert!(CpuCounters::parse("cpu0 3 0 abc 2 5 1", MAX_CPU).is_err());
    }

    #[test]
    fn rejects_negative_field() {
        assert!(CpuCounters::parse("cpu0 3 0 10 -2 5 1", MAX_CPU).is_err());
    }

    #[test]
    fn rejects_truncated_line() {
        assert!(CpuCounters::parse("cpu0 3 0 10", MAX_CPU).is_err());
    }

    #[test]
    fn delta_subtracts_every_field() {
        let b = CpuCounters::parse("cpu0 3 0 10 2 5 1", MAX_CPU).unwrap();
        let a = CpuCounters::parse("cpu0 5 0 14 2 9 3", MAX_CPU).unwrap();
        let d = a.delta_since(&b).unwrap();
        assert_eq!(d.cpu, 0);
        assert_eq!(d.yld_count, 2);
        assert_eq!(d.sched_count, 4);
        assert_eq!(d.sched_goidle, 0);
        assert_eq!(d.ttwu_count, 4);
        assert_eq!(d.ttwu_local, 2);
        assert!(d.delta_ms >= 0);
    }

    #[test]
    fn delta_rejects_single_regressed_field() {
        // Only ttwu_count went backward; the others all advanced.
        let earlier = CpuCounters::parse("cpu0 3 0 10 2 5 1", MAX_CPU).unwrap();
        let later = CpuCounters::parse("cpu0 9 0 20 8 4 7", MAX_CPU).unwrap();
        assert!(later.delta_since(&earlier).is_err());
    }

    #[test]
    fn delta_rejects_mismatched_cpus() {
        let a = CpuCounters::parse("cpu0 3 0 10 2 5 1", MAX_CPU).unwrap();
        let b = CpuCounters::parse("cpu1 3 0 10 2 5 1", MAX_CPU).unwrap();
        assert!(a.delta_since(&b).is_err());
    }
}
