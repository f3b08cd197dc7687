//! Configuration data model and validation

use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host the ping train is aimed at
    #[serde(default = "default_ping_host")]
    pub ping_host: String,

    /// Number of samples in the ping train
    #[serde(default = "default_ping_samples")]
    pub ping_samples: u32,

    /// Delay between two consecutive ping samples
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Per-sample reachability timeout
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Timeout for site, censorship and protocol probes
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Timeout for per-DNS-server queries
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    /// Worker pool size for independent probes
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Soft time budget for the whole run
    #[serde(default = "default_run_budget_secs")]
    pub run_budget_secs: u64,

    /// URL fetched once for the speed estimate
    #[serde(default = "default_speed_test_url")]
    pub speed_test_url: String,

    /// JSON catalog overriding the built-in one
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// JSON network snapshot used instead of querying the host
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Use the reduced probe profile even without an active VPN
    #[serde(default)]
    pub force_quick: bool,

    /// Print the structured report as JSON
    #[serde(default)]
    pub output_json: bool,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping_host: default_ping_host(),
            ping_samples: default_ping_samples(),
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            dns_timeout_ms: default_dns_timeout_ms(),
            concurrency: default_concurrency(),
            run_budget_secs: default_run_budget_secs(),
            speed_test_url: default_speed_test_url(),
            catalog_path: None,
            snapshot_path: None,
            force_quick: false,
            output_json: false,
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

/// Timeouts and train shape actually used by one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeProfile {
    pub ping_samples: u32,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub probe_timeout: Duration,
    pub dns_timeout: Duration,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_secs)
    }

    /// Resolve the probe profile; `quick` caps every figure at the reduced
    /// profile used while a VPN tunnel is up.
    pub fn profile(&self, quick: bool) -> ProbeProfile {
        use crate::defaults::*;

        if quick {
            ProbeProfile {
                ping_samples: self.ping_samples.min(QUICK_PING_SAMPLES),
                ping_interval: Duration::from_millis(self.ping_interval_ms.min(QUICK_PING_INTERVAL_MS)),
                ping_timeout: Duration::from_millis(self.ping_timeout_ms.min(QUICK_PING_TIMEOUT_MS)),
                probe_timeout: Duration::from_millis(self.probe_timeout_ms.min(QUICK_PROBE_TIMEOUT_MS)),
                dns_timeout: Duration::from_millis(self.dns_timeout_ms.min(QUICK_DNS_TIMEOUT_MS)),
            }
        } else {
            ProbeProfile {
                ping_samples: self.ping_samples,
                ping_interval: Duration::from_millis(self.ping_interval_ms),
                ping_timeout: Duration::from_millis(self.ping_timeout_ms),
                probe_timeout: Duration::from_millis(self.probe_timeout_ms),
                dns_timeout: Duration::from_millis(self.dns_timeout_ms),
            }
        }
    }

    /// Validate the configuration and return the first hard error
    pub fn validate(&self) -> Result<()> {
        if self.ping_host.trim().is_empty() {
            return Err(AppError::config("Ping host cannot be empty"));
        }

        if self.ping_samples == 0 {
            return Err(AppError::config("Ping sample count must be greater than 0"));
        }

        if self.ping_samples > 50 {
            return Err(AppError::config("Ping sample count cannot exceed 50"));
        }

        if self.ping_interval_ms == 0 {
            return Err(AppError::config("Ping interval must be greater than 0"));
        }

        for (name, value) in [
            ("Ping interval", self.ping_interval_ms),
            ("Ping timeout", self.ping_timeout_ms),
            ("Probe timeout", self.probe_timeout_ms),
            ("DNS timeout", self.dns_timeout_ms),
        ] {
            if value == 0 || value > 60_000 {
                return Err(AppError::config(format!(
                    "{} must be between 1 and 60000 ms, got {}",
                    name, value
                )));
            }
        }

        if self.concurrency == 0 || self.concurrency > 16 {
            return Err(AppError::config(format!(
                "Concurrency must be between 1 and 16, got {}",
                self.concurrency
            )));
        }

        if self.run_budget_secs == 0 || self.run_budget_secs > 600 {
            return Err(AppError::config(format!(
                "Run budget must be between 1 and 600 seconds, got {}",
                self.run_budget_secs
            )));
        }

        if let Err(e) = url::Url::parse(&self.speed_test_url) {
            return Err(AppError::config(format!(
                "Invalid speed test URL '{}': {}",
                self.speed_test_url, e
            )));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    /// Merge values from an arbitrary key lookup using the environment
    /// variable names
    pub fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PING_HOST") {
            let host = host.trim();
            if !host.is_empty() {
                self.ping_host = host.to_string();
            }
        }

        if let Some(value) = lookup("PING_SAMPLES") {
            self.ping_samples = parse_env("PING_SAMPLES", &value)?;
        }
        if let Some(value) = lookup("PING_INTERVAL_MS") {
            self.ping_interval_ms = parse_env("PING_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("PING_TIMEOUT_MS") {
            self.ping_timeout_ms = parse_env("PING_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("PROBE_TIMEOUT_MS") {
            self.probe_timeout_ms = parse_env("PROBE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("DNS_TIMEOUT_MS") {
            self.dns_timeout_ms = parse_env("DNS_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CONCURRENCY") {
            self.concurrency = parse_env("CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("RUN_BUDGET_SECS") {
            self.run_budget_secs = parse_env("RUN_BUDGET_SECS", &value)?;
        }
        if let Some(url) = lookup("SPEED_TEST_URL") {
            self.speed_test_url = url.trim().to_string();
        }
        if let Some(path) = lookup("CATALOG_PATH") {
            let path = path.trim();
            if !path.is_empty() {
                self.catalog_path = Some(path.to_string());
            }
        }
        if let Some(value) = lookup("ENABLE_COLOR") {
            self.enable_color = parse_env("ENABLE_COLOR", &value)?;
        }

        Ok(())
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}

// Default value functions for serde
fn default_ping_host() -> String {
    crate::defaults::DEFAULT_PING_HOST.to_string()
}

fn default_ping_samples() -> u32 {
    crate::defaults::DEFAULT_PING_SAMPLES
}

fn default_ping_interval_ms() -> u64 {
    crate::defaults::DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout_ms() -> u64 {
    crate::defaults::DEFAULT_PING_TIMEOUT_MS
}

fn default_probe_timeout_ms() -> u64 {
    crate::defaults::DEFAULT_PROBE_TIMEOUT_MS
}

fn default_dns_timeout_ms() -> u64 {
    crate::defaults::DEFAULT_DNS_TIMEOUT_MS
}

fn default_concurrency() -> usize {
    crate::defaults::DEFAULT_CONCURRENCY
}

fn default_run_budget_secs() -> u64 {
    crate::defaults::DEFAULT_RUN_BUDGET_SECS
}

fn default_speed_test_url() -> String {
    crate::defaults::DEFAULT_SPEED_TEST_URL.to_string()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ping_samples, 10);
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.ping_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_bounds() {
        let mut config = Config::default();
        config.ping_samples = 0;
        assert!(config.validate().is_err());
        config.ping_samples = 51;
        assert!(config.validate().is_err());
        config.ping_samples = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = Config::default();
        config.concurrency = 0;
        assert!(config.validate().is_err());
        config.concurrency = 17;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_speed_url() {
        let mut config = Config::default();
        config.speed_test_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quick_profile_caps_values() {
        let config = Config::default();
        let normal = config.profile(false);
        assert_eq!(normal.ping_samples, 10);
        assert_eq!(normal.probe_timeout, Duration::from_millis(3000));

        let quick = config.profile(true);
        assert_eq!(quick.ping_samples, 5);
        assert_eq!(quick.ping_interval, Duration::from_millis(100));
        assert_eq!(quick.ping_timeout, Duration::from_millis(800));
        assert_eq!(quick.probe_timeout, Duration::from_millis(1500));
        assert_eq!(quick.dns_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_quick_profile_keeps_smaller_user_values() {
        let mut config = Config::default();
        config.ping_samples = 3;
        assert_eq!(config.profile(true).ping_samples, 3);
    }

    #[test]
    fn test_merge_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PING_HOST", "1.1.1.1"),
            ("PING_SAMPLES", "7"),
            ("CONCURRENCY", " 2 "),
            ("ENABLE_COLOR", "false"),
            ("CATALOG_PATH", "/tmp/catalog.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .merge_from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ping_host, "1.1.1.1");
        assert_eq!(config.ping_samples, 7);
        assert_eq!(config.concurrency, 2);
        assert!(!config.enable_color);
        assert_eq!(config.catalog_path.as_deref(), Some("/tmp/catalog.json"));
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let mut config = Config::default();
        let result = config.merge_from_lookup(|key| {
            (key == "PING_SAMPLES").then(|| "ten".to_string())
        });
        let error = result.unwrap_err();
        assert!(error.to_string().contains("PING_SAMPLES"));
    }
}
