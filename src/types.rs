//! Type definitions shared across the probe, classifier and report layers

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Why a single probe attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The probe succeeded
    None,
    /// Name resolution failed or returned no address
    DnsFailure,
    /// The remote side actively refused the connection
    ConnectionRefused,
    /// No route to the network or host
    NetworkUnreachable,
    /// The connection was reset or aborted mid-flight
    ConnectionReset,
    /// No answer before the probe deadline
    Timeout,
    /// The HTTP exchange failed after transport succeeded
    HttpError,
    /// Anything the transport error text does not identify
    Unknown,
}

impl FailureKind {
    /// Stable upper-case name used in reports and evidence strings
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::None => "NONE",
            FailureKind::DnsFailure => "DNS_FAILURE",
            FailureKind::ConnectionRefused => "CONNECTION_REFUSED",
            FailureKind::NetworkUnreachable => "NETWORK_UNREACHABLE",
            FailureKind::ConnectionReset => "CONNECTION_RESET",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::HttpError => "HTTP_ERROR",
            FailureKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blocking taxonomy assigned to one target per evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictKind {
    NotBlocked,
    DnsBlock,
    TcpBlock,
    TimeoutBlock,
    HttpBlock,
    SniBlock,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::NotBlocked => "NOT_BLOCKED",
            VerdictKind::DnsBlock => "DNS_BLOCK",
            VerdictKind::TcpBlock => "TCP_BLOCK",
            VerdictKind::TimeoutBlock => "TIMEOUT_BLOCK",
            VerdictKind::HttpBlock => "HTTP_BLOCK",
            VerdictKind::SniBlock => "SNI_BLOCK",
        }
    }

    /// Whether this verdict counts toward blocked tallies
    pub fn is_blocked(&self) -> bool {
        !matches!(self, VerdictKind::NotBlocked)
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-protocol blocking severity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    NotBlocked,
    SomeBlocking,
    PartiallyBlocked,
    HeavilyBlocked,
}

impl Severity {
    /// Bucket a blocked percentage: >70 heavy, >30 partial, >0 some, else none
    pub fn from_percent(blocked_percent: f64) -> Self {
        if blocked_percent > 70.0 {
            Self::HeavilyBlocked
        } else if blocked_percent > 30.0 {
            Self::PartiallyBlocked
        } else if blocked_percent > 0.0 {
            Self::SomeBlocking
        } else {
            Self::NotBlocked
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::NotBlocked => "NOT BLOCKED",
            Severity::SomeBlocking => "SOME BLOCKING",
            Severity::PartiallyBlocked => "PARTIALLY BLOCKED",
            Severity::HeavilyBlocked => "HEAVILY BLOCKED",
        }
    }
}

/// Aggregate blocking bucket across every analyzer sub-test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallBlocking {
    /// More than half of all sub-tests blocked
    Critical,
    /// More than a fifth blocked
    Moderate,
    /// Anything less
    Minimal,
}

impl OverallBlocking {
    pub fn from_percent(blocked_percent: f64) -> Self {
        if blocked_percent > 50.0 {
            Self::Critical
        } else if blocked_percent > 20.0 {
            Self::Moderate
        } else {
            Self::Minimal
        }
    }
}

/// HTTP method used by the HTTP probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Head,
    Get,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Get => reqwest::Method::GET,
        }
    }
}

/// Whether a scheduled check actually ran before the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Completed,
    Untested,
}

/// How much trust to put into a speed figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeedConfidence {
    /// Derived from a single round-trip time bucket
    Low,
    /// Derived from an actual timed transfer
    Medium,
    /// The timed request failed
    Unavailable,
}

impl SpeedConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedConfidence::Low => "low",
            SpeedConfidence::Medium => "medium",
            SpeedConfidence::Unavailable => "unavailable",
        }
    }
}

/// Active network transport as reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkType {
    Wifi,
    Mobile,
    Ethernet,
    Vpn,
    Bluetooth,
    Unknown,
    /// No active network at all
    Disconnected,
}

impl NetworkType {
    pub fn display_name(&self) -> &'static str {
        match self {
            NetworkType::Wifi => "Wi-Fi",
            NetworkType::Mobile => "Mobile Data",
            NetworkType::Ethernet => "Ethernet",
            NetworkType::Vpn => "VPN",
            NetworkType::Bluetooth => "Bluetooth",
            NetworkType::Unknown => "Unknown",
            NetworkType::Disconnected => "None",
        }
    }
}
