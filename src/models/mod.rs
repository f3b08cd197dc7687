//! Data models and structures for network autopsy

pub mod catalog;
pub mod config;
pub mod metrics;
pub mod probe;

// Re-export main model types
pub use catalog::{Catalog, ProtocolEntry};
pub use config::{Config, ProbeProfile};
pub use metrics::{PingStatistics, ProtocolBlockingSummary, SpeedEstimate};
pub use probe::{BlockVerdict, DnsLookup, HttpOutcome, HttpProbeRequest, ProbeOutcome, ProbeTarget};
