//! Configuration parsing from CLI arguments and environment variables

use crate::{cli::Cli, config::env::EnvManager, error::Result, models::Config};

/// Combines defaults, `.env`, environment variables and CLI arguments
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Build a configuration from CLI arguments alone, ignoring the environment
    pub fn parse_cli_only(&self) -> Result<Config> {
        let mut config = Config::default();
        self.apply_cli_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(count) = cli.count {
            config.ping_samples = count;
        }
        if let Some(interval) = cli.interval_ms {
            config.ping_interval_ms = interval;
        }
        if let Some(timeout) = cli.timeout_ms {
            config.probe_timeout_ms = timeout;
        }
        if let Some(concurrency) = cli.concurrency {
            config.concurrency = concurrency as usize;
        }
        if let Some(budget) = cli.budget {
            config.run_budget_secs = budget;
        }
        if let Some(ref host) = cli.ping_host {
            config.ping_host = host.clone();
        }
        if let Some(ref catalog) = cli.catalog {
            config.catalog_path = Some(catalog.clone());
        }
        if let Some(ref snapshot) = cli.snapshot {
            config.snapshot_path = Some(snapshot.clone());
        }
        if cli.no_color || cli.json {
            config.enable_color = false;
        }

        config.force_quick = cli.quick;
        config.output_json = cli.json;
        config.verbose = cli.verbose;
        config.debug = cli.debug;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Configuration summary for debug output
pub fn display_config_summary(config: &Config) -> String {
    let summary = [
        format!("Ping Host: {}", config.ping_host),
        format!(
            "Ping Train: {} samples, {}ms apart, {}ms timeout",
            config.ping_samples, config.ping_interval_ms, config.ping_timeout_ms
        ),
        format!("Probe Timeout: {}ms", config.probe_timeout_ms),
        format!("DNS Timeout: {}ms", config.dns_timeout_ms),
        format!("Concurrency: {}", config.concurrency),
        format!("Run Budget: {}s", config.run_budget_secs),
        format!("Speed Test URL: {}", config.speed_test_url),
        format!("Catalog: {}", config.catalog_path.as_deref().unwrap_or("built-in")),
        format!("Snapshot: {}", config.snapshot_path.as_deref().unwrap_or("host")),
        format!("Quick Mode: {}", config.force_quick),
        format!("Color Output: {}", config.enable_color),
        format!("Verbose: {}", config.verbose),
        format!("Debug: {}", config.debug),
    ];

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "netautopsy",
            "--count", "6",
            "--timeout-ms", "2000",
            "--concurrency", "2",
            "--ping-host", "1.1.1.1",
            "--quick",
            "--no-color",
            "--verbose",
        ]);
        let config = ConfigParser::new(cli).parse_cli_only().unwrap();

        assert_eq!(config.ping_samples, 6);
        assert_eq!(config.probe_timeout_ms, 2000);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.ping_host, "1.1.1.1");
        assert!(config.force_quick);
        assert!(!config.enable_color);
        assert!(config.verbose);
        assert!(!config.debug);
    }

    #[test]
    fn test_json_disables_color() {
        let cli = Cli::parse_from(["netautopsy", "--json"]);
        let config = ConfigParser::new(cli).parse_cli_only().unwrap();
        assert!(config.output_json);
        assert!(!config.enable_color);
    }

    #[test]
    fn test_defaults_survive_without_flags() {
        let cli = Cli::parse_from(["netautopsy"]);
        let config = ConfigParser::new(cli).parse_cli_only().unwrap();
        assert_eq!(config.ping_samples, crate::defaults::DEFAULT_PING_SAMPLES);
        assert_eq!(config.run_budget_secs, crate::defaults::DEFAULT_RUN_BUDGET_SECS);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_display_config_summary() {
        let summary = display_config_summary(&Config::default());
        assert!(summary.contains("Ping Train: 10 samples, 200ms apart, 1000ms timeout"));
        assert!(summary.contains("Catalog: built-in"));
    }
}
