//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env from the current directory if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Example .env file content
    pub fn create_example_env_content() -> String {
        let mut content = String::from(
            "# Network Autopsy Configuration\n\
             #\n\
             # Values here are defaults; command-line arguments override them.\n\n",
        );
        for (var, description, example) in Self::get_supported_env_vars() {
            content.push_str(&format!("# {}\n# {}={}\n\n", description, var, example));
        }
        content
    }

    /// Validate one environment variable before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "PING_SAMPLES" => {
                let count = parse_number(key, value)?;
                if count == 0 || count > 50 {
                    return Err(AppError::config(format!("PING_SAMPLES must be between 1 and 50, got: {}", count)));
                }
            }
            "PING_INTERVAL_MS" | "PING_TIMEOUT_MS" | "PROBE_TIMEOUT_MS" | "DNS_TIMEOUT_MS" => {
                let ms = parse_number(key, value)?;
                if ms == 0 || ms > 60_000 {
                    return Err(AppError::config(format!("{} must be between 1 and 60000, got: {}", key, ms)));
                }
            }
            "CONCURRENCY" => {
                let workers = parse_number(key, value)?;
                if workers == 0 || workers > 16 {
                    return Err(AppError::config(format!("CONCURRENCY must be between 1 and 16, got: {}", workers)));
                }
            }
            "RUN_BUDGET_SECS" => {
                let secs = parse_number(key, value)?;
                if secs == 0 || secs > 600 {
                    return Err(AppError::config(format!("RUN_BUDGET_SECS must be between 1 and 600, got: {}", secs)));
                }
            }
            "SPEED_TEST_URL" => {
                url::Url::parse(value)
                    .map_err(|e| AppError::config(format!("Invalid SPEED_TEST_URL '{}': {}", value, e)))?;
            }
            "ENABLE_COLOR" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Supported variables as (name, description, example)
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("PING_HOST", "Host the ping train is aimed at", "8.8.8.8"),
            ("PING_SAMPLES", "Samples per ping train (1-50)", "10"),
            ("PING_INTERVAL_MS", "Delay between ping samples in ms", "200"),
            ("PING_TIMEOUT_MS", "Per-sample timeout in ms", "1000"),
            ("PROBE_TIMEOUT_MS", "Site and protocol probe timeout in ms", "3000"),
            ("DNS_TIMEOUT_MS", "Per-resolver query timeout in ms", "2000"),
            ("CONCURRENCY", "Parallel probes (1-16)", "4"),
            ("RUN_BUDGET_SECS", "Soft time budget for one run (1-600)", "180"),
            ("SPEED_TEST_URL", "URL fetched for the speed estimate", "https://www.google.com/generate_204"),
            ("CATALOG_PATH", "JSON catalog file", "catalog.json"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Help text listing variables and precedence
    pub fn display_env_help() -> String {
        let mut help = String::from("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<18} {}\n", var, description));
            help.push_str(&format!("  {:<18} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate the lines of a .env file, returning one warning per bad line
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let warnings = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value)
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect();

        Ok(Some(warnings))
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}
