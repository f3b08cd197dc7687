//! Command-line interface

use clap::Parser;

/// Network Autopsy - probe reachability and classify censorship or VPN-protocol blocking
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "netautopsy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Number of samples in the ping train (1-50)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub count: Option<u32>,

    /// Delay between ping samples in milliseconds
    #[arg(long, value_name = "MS", value_parser = parse_millis)]
    pub interval_ms: Option<u64>,

    /// Probe timeout in milliseconds
    #[arg(short, long, value_name = "MS", value_parser = parse_millis)]
    pub timeout_ms: Option<u64>,

    /// Number of probes run in parallel (1-16)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=16))]
    pub concurrency: Option<u64>,

    /// Soft time budget for the whole run in seconds
    #[arg(long, value_name = "SECS", value_parser = parse_budget)]
    pub budget: Option<u64>,

    /// Host the ping train is aimed at
    #[arg(long)]
    pub ping_host: Option<String>,

    /// JSON catalog replacing the built-in test catalog
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<String>,

    /// JSON network snapshot used instead of reading the host
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<String>,

    /// Use the reduced probe profile
    #[arg(long)]
    pub quick: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Print the effective catalog as JSON and exit
    #[arg(long)]
    pub print_catalog: bool,
}

impl Cli {
    /// Whether the report should be colored
    pub fn use_colors(&self) -> bool {
        !self.no_color && !self.json && supports_color()
    }

    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Configuration Summary:\n");
        if let Some(count) = self.count {
            summary.push_str(&format!("  Ping samples: {}\n", count));
        }
        if let Some(timeout) = self.timeout_ms {
            summary.push_str(&format!("  Probe timeout: {}ms\n", timeout));
        }
        if let Some(ref catalog) = self.catalog {
            summary.push_str(&format!("  Catalog: {}\n", catalog));
        }
        if let Some(ref snapshot) = self.snapshot {
            summary.push_str(&format!("  Snapshot: {}\n", snapshot));
        }
        summary.push_str(&format!("  Quick mode: {}\n", self.quick));
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        summary
    }
}

fn parse_millis(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|ms| {
            if ms == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if ms > 60_000 {
                Err("Duration cannot exceed 60000 ms".to_string())
            } else {
                Ok(ms)
            }
        })
}

fn parse_budget(s: &str) -> Result<u64, String> {
    s.parse::<u64>()
        .map_err(|_| format!("Invalid budget: {}", s))
        .and_then(|secs| {
            if secs == 0 || secs > 600 {
                Err("Budget must be between 1 and 600 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    cfg!(unix)
}
