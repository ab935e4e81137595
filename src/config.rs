use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::actors::SupervisorConfig;
use crate::process::{EntryPoint, ProcessTimeouts};

// ============================================================================
// Configuration - read once from the environment at startup
// ============================================================================

pub(crate) const DEFAULT_TRAINER_CMD: &str = "python3 -u learner.py";
pub(crate) const DEFAULT_SIMULATOR_CMD: &str = "python3 -u worker.py";
pub(crate) const DEFAULT_RUN_NAME: &str = "Normal-astra";
pub(crate) const DEFAULT_REWARDS_PATH: &str = "static/saves/rewards.json";
// The simulator's rollout client expects the trainer's parameter endpoint to be up.
pub(crate) const DEFAULT_SETTLE_DELAY_MS: u64 = 5_000;
pub(crate) const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_HEALTH_INTERVAL_MS: u64 = 1_000;
pub(crate) const DEFAULT_OUTPUT_GRACE_MS: u64 = 500;
pub(crate) const DEFAULT_UI_HOST: &str = "127.0.0.1";
pub(crate) const DEFAULT_UI_PORT: u16 = 5000;
pub(crate) const DEFAULT_LOG_CAPACITY: usize = 2_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub trainer: EntryPoint,
    pub simulator: EntryPoint,
    pub run_name: String,
    pub rewards_path: PathBuf,
    pub settle_delay: Duration,
    pub stop_timeout: Duration,
    pub health_interval: Duration,
    pub output_grace: Duration,
    pub ui_host: String,
    pub ui_port: u16,
    pub log_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let workdir = lookup("ASTRA_WORKDIR")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let entry_point = |name: &str, default: &str| -> anyhow::Result<EntryPoint> {
            let command_line = read_string(&lookup, name, default);
            let entry = EntryPoint::parse(&command_line)
                .with_context(|| format!("{} must name a program to run", name))?;
            Ok(match &workdir {
                Some(dir) => entry.working_dir(dir.clone()),
                None => entry,
            })
        };

        Ok(Self {
            trainer: entry_point("ASTRA_TRAINER_CMD", DEFAULT_TRAINER_CMD)?,
            simulator: entry_point("ASTRA_SIMULATOR_CMD", DEFAULT_SIMULATOR_CMD)?,
            run_name: read_string(&lookup, "ASTRA_RUN_NAME", DEFAULT_RUN_NAME),
            rewards_path: PathBuf::from(read_string(&lookup, "ASTRA_REWARDS_PATH", DEFAULT_REWARDS_PATH)),
            settle_delay: Duration::from_millis(read_u64_allow_zero(
                &lookup,
                "ASTRA_SETTLE_DELAY_MS",
                DEFAULT_SETTLE_DELAY_MS,
            )),
            stop_timeout: Duration::from_millis(read_u64(&lookup, "ASTRA_STOP_TIMEOUT_MS", DEFAULT_STOP_TIMEOUT_MS)),
            health_interval: Duration::from_millis(read_u64(
                &lookup,
                "ASTRA_HEALTH_INTERVAL_MS",
                DEFAULT_HEALTH_INTERVAL_MS,
            )),
            output_grace: Duration::from_millis(read_u64(&lookup, "ASTRA_OUTPUT_GRACE_MS", DEFAULT_OUTPUT_GRACE_MS)),
            ui_host: read_string(&lookup, "ASTRA_UI_HOST", DEFAULT_UI_HOST),
            ui_port: read_u16(&lookup, "ASTRA_UI_PORT", DEFAULT_UI_PORT),
            log_capacity: read_usize(&lookup, "ASTRA_LOG_CAPACITY", DEFAULT_LOG_CAPACITY),
        })
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            run_name: self.run_name.clone(),
            trainer: self.trainer.clone(),
            simulator: self.simulator.clone(),
            settle_delay: self.settle_delay,
            health_interval: self.health_interval,
            timeouts: ProcessTimeouts {
                stop: self.stop_timeout,
                output_grace: self.output_grace,
            },
        }
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_u64_allow_zero(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_u16(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u16) -> u16 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_usize(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: usize) -> usize {
    lookup(name)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.trainer, EntryPoint::new("python3").args(["-u", "learner.py"]));
        assert_eq!(config.simulator, EntryPoint::new("python3").args(["-u", "worker.py"]));
        assert_eq!(config.run_name, "Normal-astra");
        assert_eq!(config.rewards_path, PathBuf::from("static/saves/rewards.json"));
        assert_eq!(config.settle_delay, Duration::from_secs(5));
        assert_eq!(config.stop_timeout, Duration::from_secs(10));
        assert_eq!(config.ui_port, 5000);
        assert_eq!(config.log_capacity, 2000);
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = config_from(&[
            ("ASTRA_TRAINER_CMD", "./train --fast"),
            ("ASTRA_WORKDIR", "/srv/astra"),
            ("ASTRA_SETTLE_DELAY_MS", "0"),
            ("ASTRA_STOP_TIMEOUT_MS", "0"),
            ("ASTRA_UI_PORT", "not-a-port"),
            ("ASTRA_RUN_NAME", "  "),
        ])
        .unwrap();

        assert_eq!(
            config.trainer,
            EntryPoint::new("./train").args(["--fast"]).working_dir("/srv/astra")
        );
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.stop_timeout, Duration::from_secs(10));
        assert_eq!(config.ui_port, 5000);
        assert_eq!(config.run_name, "Normal-astra");

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.timeouts.stop, Duration::from_secs(10));
        assert_eq!(supervisor.settle_delay, Duration::ZERO);
    }

    #[test]
    fn test_blank_command_falls_back_to_default() {
        let config = config_from(&[("ASTRA_SIMULATOR_CMD", "   ")]).unwrap();
        assert_eq!(config.simulator.program(), "python3");
    }
}
