//! Verdict classifier: raw probe outcomes to blocking taxonomy
//!
//! Rules are applied in strict priority order and the first match wins, so
//! the same outcome tuple always yields the same single verdict.

use crate::{
    error::{AppError, Result},
    models::{BlockVerdict, DnsLookup, HttpOutcome, ProbeOutcome, ProbeTarget},
    types::{FailureKind, VerdictKind},
};
use cidr::IpCidr;
use std::fmt;
use std::net::IpAddr;

/// HTTP statuses treated as a blocking signature
pub const BLOCKING_STATUSES: [u16; 2] = [403, 451];

/// Body keywords treated as a blocking signature, matched case-insensitively
pub const BLOCKING_KEYWORDS: [&str; 2] = ["blocked", "forbidden"];

/// Ranges a censoring resolver typically answers with
pub const DEFAULT_SINKHOLES: [&str; 10] = [
    "127.0.0.0/8",
    "0.0.0.0/32",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "100.64.0.0/10",
    "198.18.0.0/15",
    "::1/128",
    "::/128",
];

/// One CIDR range; a bare address is a single-host range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr(IpCidr);

impl Cidr {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let range = if text.contains('/') {
            text.parse::<IpCidr>()
                .map_err(|e| AppError::parse(format!("Invalid sinkhole range '{}': {}", text, e)))?
        } else {
            let address: IpAddr = text
                .parse()
                .map_err(|_| AppError::parse(format!("Invalid sinkhole range '{}'", text)))?;
            IpCidr::new_host(address)
        };
        Ok(Self(range))
    }

    pub fn contains(&self, address: IpAddr) -> bool {
        self.0.contains(&normalize(address))
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IPv4-mapped IPv6 answers are matched against the IPv4 ranges
fn normalize(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// Address ranges a censoring resolver answers with instead of the real host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkholeList {
    ranges: Vec<Cidr>,
}

impl SinkholeList {
    pub fn from_cidrs<S: AsRef<str>>(ranges: &[S]) -> Result<Self> {
        let ranges = ranges
            .iter()
            .map(|r| Cidr::parse(r.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ranges })
    }

    /// First range containing `address`
    pub fn matching(&self, address: IpAddr) -> Option<&Cidr> {
        self.ranges.iter().find(|range| range.contains(address))
    }

    pub fn contains(&self, address: IpAddr) -> bool {
        self.matching(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl Default for SinkholeList {
    fn default() -> Self {
        Self {
            ranges: DEFAULT_SINKHOLES
                .iter()
                .filter_map(|range| Cidr::parse(range).ok())
                .collect(),
        }
    }
}

/// Raw outcomes gathered for one target
#[derive(Debug, Clone, Default)]
pub struct RawOutcomes<'a> {
    pub dns: Option<&'a DnsLookup>,
    pub tcp: Option<&'a ProbeOutcome>,
    pub http: Option<&'a HttpOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct VerdictClassifier {
    sinkholes: SinkholeList,
}

impl VerdictClassifier {
    pub fn new(sinkholes: SinkholeList) -> Self {
        Self { sinkholes }
    }

    pub fn sinkholes(&self) -> &SinkholeList {
        &self.sinkholes
    }

    /// First sinkholed address of a lookup, with its range.
    /// Literal IP hosts never went through DNS and are skipped.
    pub fn sinkholed<'a>(&'a self, lookup: &DnsLookup) -> Option<(IpAddr, &'a Cidr)> {
        if lookup.host.parse::<IpAddr>().is_ok() {
            return None;
        }
        lookup
            .addresses
            .iter()
            .find_map(|address| self.sinkholes.matching(*address).map(|range| (*address, range)))
    }

    pub fn classify(&self, target: &ProbeTarget, raw: RawOutcomes<'_>) -> BlockVerdict {
        let verdict = |kind, evidence: String| BlockVerdict::new(target.clone(), kind, evidence);

        if let Some(dns) = raw.dns {
            if let Some((address, range)) = self.sinkholed(dns) {
                return verdict(
                    VerdictKind::DnsBlock,
                    format!("DNS answer {} is inside sinkhole range {}", address, range),
                );
            }
        }

        if let Some(tcp) = raw.tcp.filter(|tcp| !tcp.succeeded) {
            match tcp.failure_kind {
                FailureKind::ConnectionRefused | FailureKind::NetworkUnreachable | FailureKind::ConnectionReset => {
                    return verdict(VerdictKind::TcpBlock, format!("TCP connect failed: {}", tcp.failure_kind));
                }
                FailureKind::Timeout => {
                    return verdict(VerdictKind::TimeoutBlock, "TCP connect timed out with no response".to_string());
                }
                _ => {}
            }
        }

        if let Some(http) = raw.http {
            if let Some(evidence) = http_signature(http) {
                return verdict(VerdictKind::HttpBlock, evidence);
            }
        }

        verdict(VerdictKind::NotBlocked, not_blocked_evidence(&raw))
    }

    /// SNI heuristic over a bare TCP connect to 443
    ///
    /// A plain connect cannot tell SNI filtering from ordinary TCP blocking,
    /// so the verdict is only ever a *possible* signal.
    pub fn classify_sni(&self, target: &ProbeTarget, tcp: &ProbeOutcome) -> BlockVerdict {
        if tcp.succeeded {
            return BlockVerdict::new(target.clone(), VerdictKind::NotBlocked, "TLS port reachable");
        }

        match tcp.failure_kind {
            FailureKind::ConnectionReset | FailureKind::ConnectionRefused | FailureKind::Timeout => BlockVerdict::new(
                target.clone(),
                VerdictKind::SniBlock,
                format!("possible SNI filtering ({})", tcp.failure_kind),
            ),
            other => BlockVerdict::new(
                target.clone(),
                VerdictKind::NotBlocked,
                format!("SNI check inconclusive ({})", other),
            ),
        }
    }

    /// Domain-blocking check: unresolvable, sinkholed or unreachable
    pub fn classify_domain(&self, target: &ProbeTarget, dns: &DnsLookup, reach: Option<&ProbeOutcome>) -> BlockVerdict {
        if !dns.succeeded() {
            return BlockVerdict::new(
                target.clone(),
                VerdictKind::DnsBlock,
                format!("domain does not resolve ({})", dns.failure_kind),
            );
        }
        if let Some((address, range)) = self.sinkholed(dns) {
            return BlockVerdict::new(
                target.clone(),
                VerdictKind::DnsBlock,
                format!("DNS answer {} is inside sinkhole range {}", address, range),
            );
        }

        match reach {
            Some(outcome) if !outcome.succeeded => {
                // The reachability check resolves again; a failure there is still DNS
                let kind = match outcome.failure_kind {
                    FailureKind::Timeout => VerdictKind::TimeoutBlock,
                    FailureKind::DnsFailure => VerdictKind::DnsBlock,
                    _ => VerdictKind::TcpBlock,
                };
                BlockVerdict::new(
                    target.clone(),
                    kind,
                    format!("domain resolves but is unreachable ({})", outcome.failure_kind),
                )
            }
            _ => BlockVerdict::new(target.clone(), VerdictKind::NotBlocked, "domain resolves and answers"),
        }
    }
}

fn http_signature(http: &HttpOutcome) -> Option<String> {
    if let Some(status) = http.status_code.filter(|s| BLOCKING_STATUSES.contains(s)) {
        return Some(format!("HTTP status {}", status));
    }

    let body = http.body_prefix.as_deref()?.to_lowercase();
    BLOCKING_KEYWORDS
        .iter()
        .find(|keyword| body.contains(*keyword))
        .map(|keyword| format!("HTTP body contains '{}'", keyword))
}

fn not_blocked_evidence(raw: &RawOutcomes<'_>) -> String {
    if let Some(dns) = raw.dns.filter(|d| !d.succeeded()) {
        return format!("no blocking signature; resolution failed ({})", dns.failure_kind);
    }
    if let Some(tcp) = raw.tcp.filter(|t| !t.succeeded) {
        return format!("no blocking signature; connect failed ({})", tcp.failure_kind);
    }
    "no blocking signature".to_string()
}
