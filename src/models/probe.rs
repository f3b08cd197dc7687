//! Probe targets, raw probe outcomes and verdicts

use crate::types::{FailureKind, HttpMethod, VerdictKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// What a probe is aimed at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

impl ProbeTarget {
    /// Bare host, used for DNS and reachability checks
    pub fn host<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            port: None,
            scheme: None,
        }
    }

    pub fn with_port<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            scheme: None,
        }
    }

    /// Target built from a URL; falls back to the raw text as host
    pub fn from_url(raw: &str) -> Self {
        match url::Url::parse(raw) {
            Ok(parsed) => Self {
                host: parsed.host_str().unwrap_or(raw).to_string(),
                port: parsed.port_or_known_default(),
                scheme: Some(parsed.scheme().to_string()),
            },
            Err(_) => Self::host(raw),
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// Result of one probe attempt
///
/// `latency_ms` is only set when `succeeded` is true; a failed outcome always
/// carries a failure kind other than `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub target: ProbeTarget,
    pub succeeded: bool,
    pub latency_ms: Option<f64>,
    pub failure_kind: FailureKind,
    /// Underlying transport error text, for logs and evidence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn success(target: ProbeTarget, latency: Duration) -> Self {
        Self {
            target,
            succeeded: true,
            latency_ms: Some(duration_ms(latency)),
            failure_kind: FailureKind::None,
            detail: None,
        }
    }

    pub fn failure(target: ProbeTarget, kind: FailureKind, detail: Option<String>) -> Self {
        let kind = if kind == FailureKind::None {
            FailureKind::Unknown
        } else {
            kind
        };
        Self {
            target,
            succeeded: false,
            latency_ms: None,
            failure_kind: kind,
            detail,
        }
    }
}

/// Name resolution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsLookup {
    pub host: String,
    pub addresses: Vec<IpAddr>,
    pub latency_ms: Option<f64>,
    pub failure_kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DnsLookup {
    /// A lookup with an empty answer is a DNS failure
    pub fn resolved<S: Into<String>>(host: S, addresses: Vec<IpAddr>, latency: Duration) -> Self {
        let host = host.into();
        if addresses.is_empty() {
            return Self::failed(host, FailureKind::DnsFailure, Some("empty answer".to_string()));
        }
        Self {
            host,
            addresses,
            latency_ms: Some(duration_ms(latency)),
            failure_kind: FailureKind::None,
            detail: None,
        }
    }

    pub fn failed<S: Into<String>>(host: S, kind: FailureKind, detail: Option<String>) -> Self {
        Self {
            host: host.into(),
            addresses: Vec::new(),
            latency_ms: None,
            failure_kind: kind,
            detail,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure_kind == FailureKind::None && !self.addresses.is_empty()
    }
}

/// One HTTP probe request
#[derive(Debug, Clone)]
pub struct HttpProbeRequest {
    pub url: String,
    pub method: HttpMethod,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
}

impl HttpProbeRequest {
    pub fn new<S: Into<String>>(url: S, method: HttpMethod, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method,
            timeout,
            headers: Vec::new(),
        }
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// HTTP probe result; any received status counts as `succeeded`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpOutcome {
    pub outcome: ProbeOutcome,
    pub status_code: Option<u16>,
    /// First bytes of the body, lossy UTF-8
    pub body_prefix: Option<String>,
    pub body_bytes: usize,
    pub method_used: HttpMethod,
}

impl HttpOutcome {
    pub fn failed(outcome: ProbeOutcome, method_used: HttpMethod) -> Self {
        Self {
            outcome,
            status_code: None,
            body_prefix: None,
            body_bytes: 0,
            method_used,
        }
    }
}

/// Classified verdict for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVerdict {
    pub target: ProbeTarget,
    pub kind: VerdictKind,
    pub evidence: String,
}

impl BlockVerdict {
    pub fn new<S: Into<String>>(target: ProbeTarget, kind: VerdictKind, evidence: S) -> Self {
        Self {
            target,
            kind,
            evidence: evidence.into(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.kind.is_blocked()
    }
}

/// Milliseconds with sub-millisecond precision
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
