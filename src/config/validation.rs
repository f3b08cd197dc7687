//! Soft validation rules for configuration and catalog
//!
//! Hard errors live in `Config::validate` and `Catalog::validate`; the rules
//! here only produce warnings a user may want to see before a run.

use crate::{
    error::Result,
    models::{Catalog, Config},
};
use std::net::IpAddr;

/// Configuration validator with advanced validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration and catalog, returning warnings
    pub fn validate_comprehensive(config: &Config, catalog: &Catalog) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();

        config.validate()?;
        catalog.validate()?;

        warnings.extend(Self::validate_ping_settings(config));
        warnings.extend(Self::validate_timeouts(config));
        warnings.extend(Self::validate_dns_servers(&catalog.dns_servers));
        warnings.extend(Self::validate_run_budget(config, catalog));

        Ok(warnings)
    }

    fn validate_ping_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.ping_samples < 5 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Ping train of {} samples may not give reliable loss figures (recommended: 5-10)",
                    config.ping_samples
                ),
            ));
        } else if config.ping_samples > 10 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Ping train of {} samples will lengthen the run", config.ping_samples),
            ));
        }

        if config.ping_interval_ms < 50 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Ping interval of {}ms is close to a burst; jitter will be understated",
                    config.ping_interval_ms
                ),
            ));
        }

        warnings
    }

    fn validate_timeouts(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.probe_timeout_ms < 500 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Probe timeout of {}ms will classify slow but open hosts as TIMEOUT_BLOCK",
                    config.probe_timeout_ms
                ),
            ));
        } else if config.probe_timeout_ms > 15_000 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Long probe timeout of {}ms will slow down failure detection", config.probe_timeout_ms),
            ));
        }

        if config.ping_timeout_ms > config.probe_timeout_ms {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Ping sample timeout exceeds the probe timeout".to_string(),
            ));
        }

        warnings
    }

    fn validate_dns_servers(servers: &[IpAddr]) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for server in servers {
            if server.is_loopback() || server.is_unspecified() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("DNS server {} is a local address and will not reveal upstream filtering", server),
                ));
            } else if !Self::is_known_public_dns(server) {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!("DNS server {} is not a well-known public resolver", server),
                ));
            }
        }

        warnings
    }

    /// Warn when the worst case clearly exceeds the soft budget
    fn validate_run_budget(config: &Config, catalog: &Catalog) -> Vec<ValidationWarning> {
        let pairs: usize = catalog
            .protocols
            .iter()
            .map(|p| catalog.hosts_for(p).len() * p.ports.len())
            .sum();
        let pooled = catalog.test_sites.len()
            + catalog.dns_servers.len()
            + catalog.censorship_sites.len()
            + pairs
            + catalog.protocol_domains.len()
            + catalog.sni_domains.len()
            + catalog.dpi_domains.len();

        let waves = pooled.div_ceil(config.concurrency.max(1)) as u64;
        let ping_ms = u64::from(config.ping_samples) * (config.ping_timeout_ms + config.ping_interval_ms);
        let worst_ms = waves * config.probe_timeout_ms + ping_ms;
        let budget_ms = config.run_budget_secs * 1000;

        if worst_ms > budget_ms {
            vec![ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Worst case of ~{}s for {} probes exceeds the {}s budget; late sections may be UNTESTED",
                    worst_ms / 1000,
                    pooled,
                    config.run_budget_secs
                ),
            )]
        } else {
            Vec::new()
        }
    }

    fn is_known_public_dns(ip: &IpAddr) -> bool {
        const KNOWN_DNS: [&str; 14] = [
            "8.8.8.8",
            "8.8.4.4",
            "1.1.1.1",
            "1.0.0.1",
            "9.9.9.9",
            "149.112.112.112",
            "208.67.222.222",
            "208.67.220.220",
            "77.88.8.8",
            "77.88.8.1",
            "2001:4860:4860::8888",
            "2606:4700:4700::1111",
            "2620:fe::fe",
            "2a02:6b8::feed:0ff",
        ];

        KNOWN_DNS
            .iter()
            .filter_map(|known| known.parse::<IpAddr>().ok())
            .any(|known| known == *ip)
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    pub fn format(&self, use_color: bool) -> String {
        if use_color {
            use colored::Colorize;
            let tag = match self.level {
                ValidationLevel::Info => self.level.as_str().blue(),
                ValidationLevel::Warning => self.level.as_str().yellow(),
                ValidationLevel::Error => self.level.as_str().red(),
            };
            format!("[{}] {}", tag, self.message)
        } else {
            format!("[{}] {}", self.level.as_str(), self.message)
        }
    }
}

/// Convenience function for comprehensive validation
pub fn validate_config(config: &Config, catalog: &Catalog) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config, catalog)
}
