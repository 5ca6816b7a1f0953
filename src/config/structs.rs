use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sched: SchedConfig,
    #[serde(default)]
    pub sample: SampleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sched: SchedConfig::default(),
            sample: SampleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedConfig {
    /// Counter source pseudo-file
    pub schedstat_path: PathBuf,
    /// Kernel switch that turns counter collection on and off
    pub control_path: PathBuf,
    /// Schedstat format version this build understands
    pub expected_version: u32,
    /// Parsing sanity bound for cpu indices, not a topology limit
    pub max_cpu_index: u32,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            schedstat_path: PathBuf::from("/proc/schedstat"),
            control_path: PathBuf::from("/proc/sys/kernel/sched_schedstats"),
            expected_version: 15,
            max_cpu_index: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleConfig {
    /// Wait between the two samples in milliseconds
    pub interval_ms: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_proc() {
        let config = Config::default();
        assert_eq!(config.sched.schedstat_path, PathBuf::from("/proc/schedstat"));
        assert_eq!(config.sched.expected_version, 15);
        assert_eq!(config.sched.max_cpu_index, 16);
        assert_eq!(config.sample.interval_ms, 1000);
    }

    #[test]
    fn parses_full_toml() {
        let config: Config = toml::from_str(
            r#"
            [sched]
            schedstat_path = "/tmp/schedstat"
            control_path = "/tmp/sched_schedstats"
            expected_version = 16
            max_cpu_index = 128

            [sample]
            interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.sched.expected_version, 16);
        assert_eq!(config.sched.max_cpu_index, 128);
        assert_eq!(config.sample.interval_ms, 250);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str("[sample]\ninterval_ms = 50\n").unwrap();
        assert_eq!(config.sched.expected_version, 15);
        assert_eq!(config.sample.interval_ms, 50);
    }
}
