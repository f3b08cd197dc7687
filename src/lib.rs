//! Network Autopsy
//!
//! On-device network self-test: probes reachability of a catalog of sites,
//! DNS servers and VPN-protocol endpoints, classifies failures into ordinary
//! unreachability versus DNS/TCP/HTTP/SNI-style blocking, and summarizes the
//! run as a deterministic diagnostic report.

pub mod analyzer;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod platform;
pub mod probe;
pub mod report;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Catalog, Config};
pub use diagnostics::NetworkDiagnostics;
pub use report::{DiagnosticReport, ReportBuilder};
pub use probe::{NetworkProber, Prober, ScriptedProber};
pub use output::{OutputFormatter, OutputFormatterFactory, PlainFormatter, ColoredFormatter, JsonFormatter};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_PING_HOST: &str = "8.8.8.8";
    pub const DEFAULT_PING_SAMPLES: u32 = 10;
    pub const DEFAULT_PING_INTERVAL_MS: u64 = 200;
    pub const DEFAULT_PING_TIMEOUT_MS: u64 = 1000;
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;
    pub const DEFAULT_DNS_TIMEOUT_MS: u64 = 2000;
    pub const DEFAULT_CONCURRENCY: usize = 4;
    pub const DEFAULT_RUN_BUDGET_SECS: u64 = 180;
    pub const DEFAULT_SPEED_TEST_URL: &str = "https://www.google.com/generate_204";
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// Reduced profile used while a VPN tunnel is up
    pub const QUICK_PING_SAMPLES: u32 = 5;
    pub const QUICK_PING_INTERVAL_MS: u64 = 100;
    pub const QUICK_PING_TIMEOUT_MS: u64 = 800;
    pub const QUICK_PROBE_TIMEOUT_MS: u64 = 1500;
    pub const QUICK_DNS_TIMEOUT_MS: u64 = 1000;

    pub const USER_AGENT: &str = "Mozilla/5.0 (network-autopsy)";
}
