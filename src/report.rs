//! Report builder: one immutable, ordered result per diagnostic run
//!
//! Sections keep catalog declaration order. Everything that depends on the
//! clock lives in `duration_ms`, `generated_at` and `run_id`; the canonical
//! text rendering only prints the first of these.

use crate::{
    analyzer::ProtocolBlockingReport,
    error::AppError,
    models::{BlockVerdict, DnsLookup, HttpOutcome, PingStatistics, ProbeOutcome, SpeedEstimate},
    platform::{NetworkSnapshot, TrafficCounters},
    types::{CheckStatus, SpeedConfidence},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Loss above this percentage is an issue
pub const LOSS_ISSUE_PERCENT: f64 = 5.0;
/// Average ping above this many milliseconds is an issue
pub const LATENCY_ISSUE_MS: f64 = 150.0;
/// Download below this many Mbps is an issue
pub const SPEED_ISSUE_MBPS: f64 = 2.0;

pub const STATUS_GOOD: &str = "[GOOD] Network is stable and fast";
pub const RECOMMENDATION_NONE: &str = "No issues detected";
pub const RECOMMENDATION_CHECK: &str = "Check network settings";
pub const RECOMMENDATION_RERUN: &str = "Run the diagnostic again to complete the untested checks";

/// Raw outcomes and the verdict for one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteCheck {
    pub target: String,
    pub status: CheckStatus,
    pub dns: Option<DnsLookup>,
    /// Reachability for test sites, a port-80 connect for censorship checks
    pub tcp: Option<ProbeOutcome>,
    pub http: Option<HttpOutcome>,
    pub verdict: Option<BlockVerdict>,
}

impl SiteCheck {
    pub fn untested<S: Into<String>>(target: S) -> Self {
        Self {
            target: target.into(),
            status: CheckStatus::Untested,
            dns: None,
            tcp: None,
            http: None,
            verdict: None,
        }
    }

    pub fn completed<S: Into<String>>(
        target: S,
        dns: Option<DnsLookup>,
        tcp: Option<ProbeOutcome>,
        http: Option<HttpOutcome>,
        verdict: BlockVerdict,
    ) -> Self {
        Self {
            target: target.into(),
            status: CheckStatus::Completed,
            dns,
            tcp,
            http,
            verdict: Some(verdict),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict.as_ref().is_some_and(BlockVerdict::is_blocked)
    }

    pub fn reachable_latency_ms(&self) -> Option<f64> {
        self.tcp.as_ref().filter(|t| t.succeeded).and_then(|t| t.latency_ms)
    }
}

/// One DNS server queried directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsServerCheck {
    pub server: IpAddr,
    pub status: CheckStatus,
    pub lookup: Option<DnsLookup>,
    /// Answered with at least one address outside the sinkhole ranges
    pub working: bool,
}

impl DnsServerCheck {
    pub fn untested(server: IpAddr) -> Self {
        Self {
            server,
            status: CheckStatus::Untested,
            lookup: None,
            working: false,
        }
    }

    pub fn completed(server: IpAddr, lookup: DnsLookup, working: bool) -> Self {
        Self {
            server,
            status: CheckStatus::Completed,
            lookup: Some(lookup),
            working,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    PacketLoss,
    HighLatency,
    SlowSpeed,
    ProtocolBlocking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind, message: String) -> Self {
        Self { kind, message }
    }
}

/// Immutable result of one diagnostic run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// Correlation id shared with the run's log lines
    pub run_id: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    /// Set when the run aborted; the sections hold whatever completed
    pub error: Option<String>,
    /// Process exit code: 0, or the aborting error's code
    pub exit_code: i32,
    pub connection: Option<NetworkSnapshot>,
    pub vpn_active: bool,
    pub quick_mode: bool,
    pub ping_host: String,
    pub sites: Vec<SiteCheck>,
    pub censorship: Vec<SiteCheck>,
    pub ping: Option<PingStatistics>,
    pub dns_servers: Vec<DnsServerCheck>,
    pub protocol_blocking: Option<ProtocolBlockingReport>,
    pub speed: Option<SpeedEstimate>,
    pub traffic: Option<TrafficCounters>,
    pub issues: Vec<Issue>,
    pub issue_count: usize,
    /// Checks and whole sections that never produced a result
    pub untested_checks: usize,
    pub recommendations: Vec<String>,
    pub status_line: String,
    pub duration_ms: u64,
}

impl DiagnosticReport {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Every scheduled check ran and nothing aborted the run
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.untested_checks == 0
    }

    /// Censorship targets with a blocking verdict
    pub fn censored_count(&self) -> usize {
        self.censorship.iter().filter(|c| c.is_blocked()).count()
    }

    /// Checks scheduled but never run, across every pooled section
    pub fn untested_count(&self) -> usize {
        let site_like = self
            .sites
            .iter()
            .chain(self.censorship.iter())
            .filter(|c| c.status == CheckStatus::Untested)
            .count();
        let dns = self
            .dns_servers
            .iter()
            .filter(|c| c.status == CheckStatus::Untested)
            .count();
        site_like + dns
    }

    /// Pooled checks, protocol pairs and sections missing altogether
    fn count_untested_checks(&self) -> usize {
        let missing_sections = [
            self.connection.is_none(),
            self.ping.is_none(),
            self.protocol_blocking.is_none(),
            self.speed.is_none(),
        ]
        .iter()
        .filter(|missing| **missing)
        .count();
        let protocol_checks = self.protocol_blocking.as_ref().map_or(0, |p| {
            let checks = p
                .domain_checks
                .iter()
                .chain(p.sni_checks.iter())
                .chain(p.dpi_checks.iter())
                .filter(|c| c.status == CheckStatus::Untested)
                .count();
            p.untested_pairs() as usize + checks
        });

        self.untested_count() + protocol_checks + missing_sections
    }
}

/// Issues in their fixed order
pub fn derive_issues(
    ping: Option<&PingStatistics>,
    speed: Option<&SpeedEstimate>,
    protocols: Option<&ProtocolBlockingReport>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    if let Some(ping) = ping {
        if ping.loss_percent > LOSS_ISSUE_PERCENT {
            issues.push(Issue::new(
                IssueKind::PacketLoss,
                format!("Packet loss: {:.1}%", ping.loss_percent),
            ));
        }
        if ping.avg_ms > LATENCY_ISSUE_MS {
            issues.push(Issue::new(
                IssueKind::HighLatency,
                format!("High latency: {:.1}ms", ping.avg_ms),
            ));
        }
    }

    // A failed speed request measured nothing
    let measured = speed.filter(|s| s.confidence != SpeedConfidence::Unavailable);
    if let Some(speed) = measured.filter(|s| s.download_mbps < SPEED_ISSUE_MBPS) {
        issues.push(Issue::new(
            IssueKind::SlowSpeed,
            format!("Slow speed: {:.1} Mbps", speed.download_mbps),
        ));
    }

    if let Some(protocols) = protocols {
        let blocked = protocols.summaries.iter().filter(|s| s.blocked_count > 0).count();
        if blocked > 0 {
            issues.push(Issue::new(
                IssueKind::ProtocolBlocking,
                format!("VPN protocol blocking detected on {} protocol(s)", blocked),
            ));
        }
    }

    issues
}

/// Status line; a run with untested checks or an error never reports `[GOOD]`
pub fn status_line(issue_count: usize, untested: usize, aborted: bool) -> String {
    match (aborted || untested > 0, issue_count) {
        (false, 0) => STATUS_GOOD.to_string(),
        (false, issues) => format!("[WARNING] {} issues detected", issues),
        (true, 0) if untested == 0 => "[INCOMPLETE] Diagnostic did not finish".to_string(),
        (true, 0) => format!("[INCOMPLETE] {} checks untested", untested),
        (true, issues) => format!("[INCOMPLETE] {} checks untested, {} issues detected", untested, issues),
    }
}

/// Summary recommendations followed by the protocol bucket's table entries
pub fn recommendations(
    issue_count: usize,
    complete: bool,
    protocols: Option<&ProtocolBlockingReport>,
) -> Vec<String> {
    let mut lines = Vec::new();
    if !complete {
        lines.push(RECOMMENDATION_RERUN.to_string());
    }
    if issue_count > 0 {
        lines.push(RECOMMENDATION_CHECK.to_string());
    } else if complete {
        lines.push(RECOMMENDATION_NONE.to_string());
    }

    lines.extend(protocols.into_iter().flat_map(|p| p.recommendations.iter().cloned()));
    lines
}

/// Collects sections as the run produces them
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    run_id: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    error: Option<String>,
    exit_code: i32,
    connection: Option<NetworkSnapshot>,
    quick_mode: bool,
    ping_host: String,
    sites: Vec<SiteCheck>,
    censorship: Vec<SiteCheck>,
    ping: Option<PingStatistics>,
    dns_servers: Vec<DnsServerCheck>,
    protocol_blocking: Option<ProtocolBlockingReport>,
    speed: Option<SpeedEstimate>,
    duration: Duration,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report for a run that could not start; only the error marker is set
    pub fn failed(error: &AppError) -> DiagnosticReport {
        Self::new().error(error).build()
    }

    pub fn run_id<S: Into<String>>(mut self, run_id: S) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    pub fn error(mut self, error: &AppError) -> Self {
        self.error = Some(error.to_string());
        self.exit_code = error.exit_code();
        self
    }

    pub fn connection(mut self, snapshot: NetworkSnapshot) -> Self {
        self.connection = Some(snapshot);
        self
    }

    pub fn quick_mode(mut self, quick: bool) -> Self {
        self.quick_mode = quick;
        self
    }

    pub fn ping_host<S: Into<String>>(mut self, host: S) -> Self {
        self.ping_host = host.into();
        self
    }

    pub fn sites(mut self, sites: Vec<SiteCheck>) -> Self {
        self.sites = sites;
        self
    }

    pub fn censorship(mut self, checks: Vec<SiteCheck>) -> Self {
        self.censorship = checks;
        self
    }

    pub fn ping(mut self, ping: Option<PingStatistics>) -> Self {
        self.ping = ping;
        self
    }

    pub fn dns_servers(mut self, checks: Vec<DnsServerCheck>) -> Self {
        self.dns_servers = checks;
        self
    }

    pub fn protocol_blocking(mut self, report: Option<ProtocolBlockingReport>) -> Self {
        self.protocol_blocking = report;
        self
    }

    pub fn speed(mut self, speed: Option<SpeedEstimate>) -> Self {
        self.speed = speed;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn build(self) -> DiagnosticReport {
        let issues = derive_issues(self.ping.as_ref(), self.speed.as_ref(), self.protocol_blocking.as_ref());
        let issue_count = issues.len();

        let mut report = DiagnosticReport {
            vpn_active: self.connection.as_ref().is_some_and(NetworkSnapshot::vpn_active),
            traffic: self.connection.as_ref().and_then(|c| c.traffic),
            run_id: self.run_id,
            generated_at: self.generated_at,
            error: self.error,
            exit_code: self.exit_code,
            connection: self.connection,
            quick_mode: self.quick_mode,
            ping_host: self.ping_host,
            sites: self.sites,
            censorship: self.censorship,
            ping: self.ping,
            dns_servers: self.dns_servers,
            protocol_blocking: self.protocol_blocking,
            speed: self.speed,
            issues,
            issue_count,
            untested_checks: 0,
            recommendations: Vec::new(),
            status_line: String::new(),
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        };

        report.untested_checks = report.count_untested_checks();
        report.status_line = status_line(issue_count, report.untested_checks, report.has_error());
        report.recommendations = recommendations(issue_count, report.is_complete(), report.protocol_blocking.as_ref());
        report
    }
}
