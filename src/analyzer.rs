//! Protocol blocking analyzer
//!
//! Sweeps every (host, port) pair of the catalog's protocol table, then the
//! protocol-ecosystem domains, the SNI list and the DPI canaries, and folds
//! the verdicts into per-protocol severities and one overall bucket.

use crate::{
    classifier::{RawOutcomes, VerdictClassifier},
    executor::{BoundedPool, RunBudget},
    logging::ProbeLogger,
    models::{BlockVerdict, Catalog, ProbeTarget, ProtocolBlockingSummary},
    probe::Prober,
    types::{CheckStatus, OverallBlocking},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Port the TLS-based advice lines are decided on
pub const TLS_ADVICE_PORT: u16 = 443;
const FALLBACK_WIREGUARD_PORT: u16 = 51820;
const FALLBACK_SHADOWSOCKS_PORTS: [u16; 3] = [8388, 1080, 443];
/// Shadowsocks counts as blocked once this many of its ports are
const SHADOWSOCKS_BLOCKED_PORTS: usize = 2;

/// Verdict for one swept target; `None` when the run ended first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCheck {
    pub target: String,
    pub status: CheckStatus,
    pub verdict: Option<BlockVerdict>,
}

impl TargetCheck {
    fn new(target: &str, verdict: Option<BlockVerdict>) -> Self {
        Self {
            target: target.to_string(),
            status: if verdict.is_some() {
                CheckStatus::Completed
            } else {
                CheckStatus::Untested
            },
            verdict,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict.as_ref().is_some_and(BlockVerdict::is_blocked)
    }
}

/// One fixed advice line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAdvice {
    pub protocol: String,
    /// `None` when the reference probes it depends on never ran
    pub advice: Option<String>,
}

/// Everything the analyzer found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolBlockingReport {
    pub summaries: Vec<ProtocolBlockingSummary>,
    pub domain_checks: Vec<TargetCheck>,
    pub sni_checks: Vec<TargetCheck>,
    pub dpi_checks: Vec<TargetCheck>,
    /// `None` when too few canaries ran to decide
    pub dpi_detected: Option<bool>,
    pub overall_tested: u32,
    pub overall_blocked: u32,
    pub overall_percent: f64,
    pub overall: OverallBlocking,
    pub recommendations: Vec<String>,
    pub protocol_advice: Vec<ProtocolAdvice>,
}

impl ProtocolBlockingReport {
    /// Whether any protocol had at least one blocked pair
    pub fn any_protocol_blocked(&self) -> bool {
        self.summaries.iter().any(|s| s.blocked_count > 0)
    }

    pub fn untested_pairs(&self) -> u32 {
        self.summaries.iter().map(|s| s.untested_count).sum()
    }
}

/// Headline for an overall bucket
pub fn overall_headline(overall: OverallBlocking) -> &'static str {
    match overall {
        OverallBlocking::Critical => "[CRITICAL] Heavy VPN protocol blocking detected!",
        OverallBlocking::Moderate => "[WARNING] Moderate VPN protocol blocking",
        OverallBlocking::Minimal => "[GOOD] Minimal VPN protocol blocking",
    }
}

/// Fixed recommendation table per overall bucket
pub fn recommendations_for(overall: OverallBlocking) -> Vec<String> {
    let lines: &[&str] = match overall {
        OverallBlocking::Critical => &[
            "Use obfuscated protocols (VLESS over gRPC/WebSocket)",
            "Try different ports (8080, 8443, 2053)",
            "Use CDN masking (Cloudflare Workers)",
        ],
        OverallBlocking::Moderate => &["Switch to less common ports", "Enable TLS/SSL encryption"],
        OverallBlocking::Minimal => &[],
    };
    lines.iter().map(|l| l.to_string()).collect()
}

pub struct ProtocolBlockingAnalyzer<'a> {
    catalog: &'a Catalog,
    classifier: &'a VerdictClassifier,
    pool: BoundedPool,
    probe_timeout: Duration,
    dns_timeout: Duration,
    logger: ProbeLogger,
}

impl<'a> ProtocolBlockingAnalyzer<'a> {
    pub fn new(
        catalog: &'a Catalog,
        classifier: &'a VerdictClassifier,
        pool: BoundedPool,
        probe_timeout: Duration,
        dns_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            classifier,
            pool,
            probe_timeout,
            dns_timeout,
            logger: ProbeLogger::silent(),
        }
    }

    pub fn with_logger(mut self, logger: ProbeLogger) -> Self {
        self.logger = logger;
        self
    }

    pub async fn analyze(&self, prober: &dyn Prober, budget: &RunBudget) -> ProtocolBlockingReport {
        let summaries = self.sweep_ports(prober, budget).await;
        let domain_checks = self.domain_sweep(prober, &self.catalog.protocol_domains, budget).await;
        let sni_checks = self.sni_sweep(prober, budget).await;
        let dpi_checks = self.domain_sweep(prober, &self.catalog.dpi_domains, budget).await;
        let dpi_detected = dpi_decision(&dpi_checks, self.catalog.dpi_threshold);
        let protocol_advice = self.advise(prober, budget).await;

        let pair_tested: u32 = summaries.iter().map(|s| s.tested_count).sum();
        let pair_blocked: u32 = summaries.iter().map(|s| s.blocked_count).sum();
        // SNI and DPI checks are reported on their own and stay out of the total
        let (check_tested, check_blocked) = tally(domain_checks.iter());

        let overall_tested = pair_tested + check_tested;
        let overall_blocked = pair_blocked + check_blocked;
        let overall_percent = percent(overall_blocked, overall_tested);
        let overall = OverallBlocking::from_percent(overall_percent);

        ProtocolBlockingReport {
            summaries,
            domain_checks,
            sni_checks,
            dpi_checks,
            dpi_detected,
            overall_tested,
            overall_blocked,
            overall_percent,
            overall,
            recommendations: recommendations_for(overall),
            protocol_advice,
        }
    }

    /// Connect to every (host, port) pair, tallied per protocol in catalog order
    async fn sweep_ports(&self, prober: &dyn Prober, budget: &RunBudget) -> Vec<ProtocolBlockingSummary> {
        let mut pairs = Vec::new();
        for (index, entry) in self.catalog.protocols.iter().enumerate() {
            for host in self.catalog.hosts_for(entry) {
                for port in &entry.ports {
                    pairs.push((index, host.clone(), *port));
                }
            }
        }

        let timeout = self.probe_timeout;
        let outcomes = self
            .pool
            .run_all(
                pairs.clone(),
                |(_, host, port)| async move { prober.connect_port(&host, port, budget.clamp(timeout)).await },
                budget,
            )
            .await;

        // (tested, blocked, untested) per protocol
        let mut tallies = vec![(0u32, 0u32, 0u32); self.catalog.protocols.len()];
        for ((index, host, port), outcome) in pairs.iter().zip(outcomes) {
            let tally = &mut tallies[*index];
            let Some(outcome) = outcome else {
                tally.2 += 1;
                continue;
            };

            let target = ProbeTarget::with_port(host.as_str(), *port);
            let verdict = self.classifier.classify(
                &target,
                RawOutcomes {
                    tcp: Some(&outcome),
                    ..Default::default()
                },
            );
            self.logger.log_verdict(&verdict).await;

            tally.0 += 1;
            if verdict.is_blocked() {
                tally.1 += 1;
            }
        }

        self.catalog
            .protocols
            .iter()
            .zip(tallies)
            .map(|(entry, (tested, blocked, untested))| {
                ProtocolBlockingSummary::from_counts(entry.name.as_str(), tested, blocked, untested)
            })
            .collect()
    }

    /// Resolve then reach every domain
    async fn domain_sweep(&self, prober: &dyn Prober, domains: &[String], budget: &RunBudget) -> Vec<TargetCheck> {
        let (dns_timeout, probe_timeout) = (self.dns_timeout, self.probe_timeout);
        let classifier = self.classifier;

        let verdicts = self
            .pool
            .run_all(
                domains.to_vec(),
                |domain| async move {
                    let target = ProbeTarget::host(domain.as_str());
                    let lookup = prober.resolve_host(&domain, budget.clamp(dns_timeout)).await;
                    if !lookup.succeeded() || classifier.sinkholed(&lookup).is_some() {
                        return classifier.classify_domain(&target, &lookup, None);
                    }
                    let reach = prober.reachability_probe(&domain, budget.clamp(probe_timeout)).await;
                    classifier.classify_domain(&target, &lookup, Some(&reach))
                },
                budget,
            )
            .await;

        self.checks(domains, verdicts).await
    }

    /// Bare TCP connect to the TLS port of every SNI domain
    async fn sni_sweep(&self, prober: &dyn Prober, budget: &RunBudget) -> Vec<TargetCheck> {
        let domains = &self.catalog.sni_domains;
        let timeout = self.probe_timeout;
        let classifier = self.classifier;

        let verdicts = self
            .pool
            .run_all(
                domains.clone(),
                |domain| async move {
                    let target = ProbeTarget::with_port(domain.as_str(), TLS_ADVICE_PORT);
                    let outcome = prober.connect_port(&domain, TLS_ADVICE_PORT, budget.clamp(timeout)).await;
                    classifier.classify_sni(&target, &outcome)
                },
                budget,
            )
            .await;

        self.checks(domains, verdicts).await
    }

    async fn checks(&self, names: &[String], verdicts: Vec<Option<BlockVerdict>>) -> Vec<TargetCheck> {
        let mut checks = Vec::with_capacity(names.len());
        for (name, verdict) in names.iter().zip(verdicts) {
            if let Some(verdict) = &verdict {
                self.logger.log_verdict(verdict).await;
            }
            checks.push(TargetCheck::new(name, verdict));
        }
        checks
    }

    /// Fixed advice lines decided by probes against the reference host
    async fn advise(&self, prober: &dyn Prober, budget: &RunBudget) -> Vec<ProtocolAdvice> {
        let wireguard_port = self
            .catalog
            .protocol("WIREGUARD")
            .and_then(|p| p.ports.first().copied())
            .unwrap_or(FALLBACK_WIREGUARD_PORT);
        let shadowsocks_ports: Vec<u16> = self
            .catalog
            .protocol("SHADOWSOCKS")
            .map(|p| p.ports.clone())
            .unwrap_or_else(|| FALLBACK_SHADOWSOCKS_PORTS.to_vec());

        let mut ports = vec![TLS_ADVICE_PORT, wireguard_port];
        for port in &shadowsocks_ports {
            if !ports.contains(port) {
                ports.push(*port);
            }
        }

        let host = self.catalog.reference_host.as_str();
        let timeout = self.probe_timeout;
        let classifier = self.classifier;
        let results = self
            .pool
            .run_all(
                ports.clone(),
                |port| async move {
                    let outcome = prober.connect_port(host, port, budget.clamp(timeout)).await;
                    let verdict = classifier.classify(
                        &ProbeTarget::with_port(host, port),
                        RawOutcomes {
                            tcp: Some(&outcome),
                            ..Default::default()
                        },
                    );
                    verdict.is_blocked()
                },
                budget,
            )
            .await;
        let blocked: BTreeMap<u16, Option<bool>> = ports.into_iter().zip(results).collect();
        let port_blocked = |port: u16| blocked.get(&port).copied().flatten();

        let shadowsocks = shadowsocks_ports
            .iter()
            .map(|port| port_blocked(*port))
            .collect::<Option<Vec<bool>>>()
            .map(|states| states.into_iter().filter(|b| *b).count() >= SHADOWSOCKS_BLOCKED_PORTS);

        let tls = port_blocked(TLS_ADVICE_PORT);
        vec![
            advice("VLESS/VMESS with TLS", tls, "May be blocked", "Should work"),
            advice("VLESS/VMESS with gRPC", tls, "Try different port", "Recommended"),
            advice("Trojan", tls, "May need obfuscation", "Good option"),
            advice("Shadowsocks", shadowsocks, "Often blocked", "Works fine"),
            advice("WireGuard", port_blocked(wireguard_port), "Port often blocked", "Good speed"),
        ]
    }
}

fn advice(protocol: &str, blocked: Option<bool>, when_blocked: &str, when_open: &str) -> ProtocolAdvice {
    ProtocolAdvice {
        protocol: protocol.to_string(),
        advice: blocked.map(|b| (if b { when_blocked } else { when_open }).to_string()),
    }
}

/// DPI verdict from the canary checks; undecided while untested canaries
/// could still tip it either way
pub fn dpi_decision(checks: &[TargetCheck], threshold: usize) -> Option<bool> {
    let blocked = checks.iter().filter(|c| c.is_blocked()).count();
    let untested = checks.iter().filter(|c| c.status == CheckStatus::Untested).count();

    if blocked >= threshold {
        Some(true)
    } else if blocked + untested < threshold {
        Some(false)
    } else {
        None
    }
}

fn tally<'c, I: Iterator<Item = &'c TargetCheck>>(checks: I) -> (u32, u32) {
    checks.fold((0, 0), |(tested, blocked), check| match check.status {
        CheckStatus::Completed => (tested + 1, blocked + u32::from(check.is_blocked())),
        CheckStatus::Untested => (tested, blocked),
    })
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * f64::from(part) / f64::from(whole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CancelSignal;
    use crate::models::ProtocolEntry;
    use crate::probe::scripted::{ScriptedProber, Step};
    use crate::types::{FailureKind, Severity, VerdictKind};

    fn small_catalog() -> Catalog {
        Catalog {
            protocol_hosts: vec!["a.example".to_string(), "b.example".to_string()],
            protocols: vec![
                ProtocolEntry {
                    name: "VLESS".to_string(),
                    hosts: Vec::new(),
                    ports: vec![443, 8443, 2053, 2083, 2087],
                },
                ProtocolEntry {
                    name: "WIREGUARD".to_string(),
                    hosts: Vec::new(),
                    ports: vec![51820],
                },
            ],
            protocol_domains: vec!["v2ray.com".to_string(), "wireguard.com".to_string()],
            sni_domains: vec!["www.cloudflare.com".to_string()],
            dpi_domains: vec![
                "api.v2ray.com".to_string(),
                "api.shadowsocks.org".to_string(),
                "api.wireguard.com".to_string(),
            ],
            ..Catalog::default()
        }
    }

    fn analyzer<'a>(catalog: &'a Catalog, classifier: &'a VerdictClassifier) -> ProtocolBlockingAnalyzer<'a> {
        ProtocolBlockingAnalyzer::new(
            catalog,
            classifier,
            BoundedPool::new(4),
            Duration::from_millis(3000),
            Duration::from_millis(2000),
        )
    }

    #[tokio::test]
    async fn test_eight_of_ten_pairs_is_heavily_blocked() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        // 10 VLESS pairs; only 443 answers on both hosts
        let prober = ScriptedProber::healthy(20.0)
            .host("a.example", Step::Fail(FailureKind::ConnectionReset))
            .host("b.example", Step::Fail(FailureKind::Timeout))
            .connect("a.example", 443, Step::Answer(30.0))
            .connect("b.example", 443, Step::Answer(30.0));

        let report = analyzer(&catalog, &classifier).analyze(&prober, &RunBudget::unbounded()).await;
        let vless = &report.summaries[0];
        assert_eq!(vless.protocol, "VLESS");
        assert_eq!(vless.tested_count, 10);
        assert_eq!(vless.blocked_count, 8);
        assert_eq!(vless.blocked_percent, 80.0);
        assert_eq!(vless.severity, Severity::HeavilyBlocked);

        let wireguard = &report.summaries[1];
        assert_eq!(wireguard.tested_count, 2);
        assert_eq!(wireguard.blocked_count, 2);
        assert!(report.any_protocol_blocked());
    }

    #[tokio::test]
    async fn test_clean_network_is_minimal() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        let prober = ScriptedProber::healthy(20.0);

        let report = analyzer(&catalog, &classifier).analyze(&prober, &RunBudget::unbounded()).await;
        assert!(!report.any_protocol_blocked());
        assert_eq!(report.overall_blocked, 0);
        // 10 + 2 pairs, 2 domains
        assert_eq!(report.overall_tested, 14);
        assert_eq!(report.overall, OverallBlocking::Minimal);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.dpi_detected, Some(false));
        assert!(report
            .protocol_advice
            .iter()
            .all(|a| a.advice.is_some()));
        assert_eq!(report.protocol_advice[1].advice.as_deref(), Some("Recommended"));
    }

    #[tokio::test]
    async fn test_dpi_flag_needs_two_of_three() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        let prober = ScriptedProber::healthy(20.0)
            .dns_failure("api.v2ray.com")
            .reachability("api.wireguard.com", vec![Step::Fail(FailureKind::Timeout)]);

        let report = analyzer(&catalog, &classifier).analyze(&prober, &RunBudget::unbounded()).await;
        assert_eq!(report.dpi_detected, Some(true));
        assert_eq!(report.dpi_checks[0].verdict.as_ref().unwrap().kind, VerdictKind::DnsBlock);
        assert_eq!(report.dpi_checks[2].verdict.as_ref().unwrap().kind, VerdictKind::TimeoutBlock);
        assert!(!report.dpi_checks[1].is_blocked());
    }

    #[tokio::test]
    async fn test_sinkholed_domain_skips_reachability() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        let prober = ScriptedProber::healthy(20.0).dns("v2ray.com", &["127.0.0.1"]);

        let report = analyzer(&catalog, &classifier).analyze(&prober, &RunBudget::unbounded()).await;
        assert_eq!(report.domain_checks[0].verdict.as_ref().unwrap().kind, VerdictKind::DnsBlock);
        assert!(!prober.calls().contains(&"reach v2ray.com".to_string()));
    }

    #[tokio::test]
    async fn test_sni_reset_is_possible_block() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        let prober = ScriptedProber::healthy(20.0).connect("www.cloudflare.com", 443, Step::Fail(FailureKind::ConnectionReset));

        let report = analyzer(&catalog, &classifier).analyze(&prober, &RunBudget::unbounded()).await;
        let verdict = report.sni_checks[0].verdict.as_ref().unwrap();
        assert_eq!(verdict.kind, VerdictKind::SniBlock);
        assert!(verdict.evidence.starts_with("possible SNI filtering"));
    }

    #[tokio::test]
    async fn test_reference_host_blocked_advice() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        let prober = ScriptedProber::healthy(20.0)
            .connect("google.com", 443, Step::Fail(FailureKind::ConnectionRefused))
            .connect("google.com", 8388, Step::Fail(FailureKind::Timeout))
            .connect("google.com", 51820, Step::Fail(FailureKind::Timeout));

        let report = analyzer(&catalog, &classifier).analyze(&prober, &RunBudget::unbounded()).await;
        let lines: Vec<(&str, Option<&str>)> = report
            .protocol_advice
            .iter()
            .map(|a| (a.protocol.as_str(), a.advice.as_deref()))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("VLESS/VMESS with TLS", Some("May be blocked")),
                ("VLESS/VMESS with gRPC", Some("Try different port")),
                ("Trojan", Some("May need obfuscation")),
                ("Shadowsocks", Some("Often blocked")),
                ("WireGuard", Some("Port often blocked")),
            ]
        );
    }

    #[tokio::test]
    async fn test_sni_failures_stay_out_of_overall_percentage() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        let prober = ScriptedProber::healthy(20.0).connect("www.cloudflare.com", 443, Step::Fail(FailureKind::Timeout));

        let report = analyzer(&catalog, &classifier).analyze(&prober, &RunBudget::unbounded()).await;
        assert_eq!(report.sni_checks[0].verdict.as_ref().unwrap().kind, VerdictKind::SniBlock);
        assert_eq!(report.overall_blocked, 0);
        assert_eq!(report.overall_tested, 14);
        assert_eq!(report.overall, OverallBlocking::Minimal);
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_budget_marks_everything_untested() {
        let catalog = small_catalog();
        let classifier = VerdictClassifier::default();
        let prober = ScriptedProber::healthy(20.0);
        let budget = RunBudget::new(Duration::ZERO, CancelSignal::never());

        let report = analyzer(&catalog, &classifier).analyze(&prober, &budget).await;
        assert_eq!(report.overall_tested, 0);
        assert_eq!(report.overall_percent, 0.0);
        assert_eq!(report.untested_pairs(), 12);
        assert_eq!(report.summaries[0].tested_count, 0);
        assert!(report.domain_checks.iter().all(|c| c.status == CheckStatus::Untested));
        assert_eq!(report.dpi_detected, None);
        assert!(report.protocol_advice.iter().all(|a| a.advice.is_none()));
        assert!(prober.calls().is_empty());
    }

    #[test]
    fn test_dpi_decision_with_untested_canaries() {
        let blocked = TargetCheck::new(
            "a",
            Some(BlockVerdict::new(ProbeTarget::host("a"), VerdictKind::DnsBlock, "x")),
        );
        let open = TargetCheck::new(
            "b",
            Some(BlockVerdict::new(ProbeTarget::host("b"), VerdictKind::NotBlocked, "x")),
        );
        let untested = TargetCheck::new("c", None);

        assert_eq!(dpi_decision(&[blocked.clone(), open.clone(), untested.clone()], 2), None);
        assert_eq!(dpi_decision(&[open.clone(), open.clone(), untested.clone()], 2), Some(false));
        assert_eq!(dpi_decision(&[blocked.clone(), blocked, untested], 2), Some(true));
    }

    #[test]
    fn test_recommendation_table() {
        assert_eq!(recommendations_for(OverallBlocking::Critical).len(), 3);
        assert_eq!(
            recommendations_for(OverallBlocking::Moderate),
            vec!["Switch to less common ports", "Enable TLS/SSL encryption"]
        );
        assert!(recommendations_for(OverallBlocking::Minimal).is_empty());
    }
}
