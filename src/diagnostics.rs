//! Diagnostic run orchestrator
//!
//! Issues the probes section by section, feeds raw outcomes to the verdict
//! classifier and hands everything to the report builder. A run never fails
//! as a whole: the budget or a cancel leaves the remaining checks UNTESTED,
//! and a missing network snapshot yields the error-marker report.

use crate::{
    analyzer::ProtocolBlockingAnalyzer,
    classifier::{RawOutcomes, VerdictClassifier},
    error::{AppError, Result},
    executor::{BoundedPool, CancelSignal, RunBudget},
    logging::{Logger, LoggerFactory, ProbeLogger},
    models::{config::ProbeProfile, Catalog, Config, HttpProbeRequest, ProbeTarget},
    platform::NetworkStateProvider,
    probe::Prober,
    report::{DiagnosticReport, DnsServerCheck, ReportBuilder, SiteCheck},
    stats::{PingTrain, SpeedEstimator},
    types::HttpMethod,
};
use chrono::Utc;
use std::{net::IpAddr, sync::Arc};
use tokio::time::Instant;

/// Port used for the censorship TCP check
pub const CENSORSHIP_PORT: u16 = 80;

/// One configured diagnostic engine; every `run` is independent
pub struct NetworkDiagnostics {
    config: Config,
    catalog: Catalog,
    prober: Arc<dyn Prober>,
    classifier: VerdictClassifier,
    probe_logger: ProbeLogger,
}

impl NetworkDiagnostics {
    pub fn new(config: Config, catalog: Catalog, prober: Arc<dyn Prober>) -> Result<Self> {
        let classifier = VerdictClassifier::new(catalog.sinkhole_list()?);
        Ok(Self {
            config,
            catalog,
            prober,
            classifier,
            probe_logger: ProbeLogger::silent(),
        })
    }

    /// Share the probe logger handed to the prober so its events carry the run id
    pub fn with_probe_logger(mut self, logger: ProbeLogger) -> Self {
        self.probe_logger = logger;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run every section within the configured budget
    pub async fn run(&self, provider: &dyn NetworkStateProvider) -> DiagnosticReport {
        self.run_with_cancel(provider, CancelSignal::never()).await
    }

    /// Like [`run`](Self::run), stopping early once `cancel` fires
    pub async fn run_with_cancel(&self, provider: &dyn NetworkStateProvider, cancel: CancelSignal) -> DiagnosticReport {
        let started = Instant::now();
        let factory = LoggerFactory::new(self.config.clone());
        let logger = factory.create_logger("DIAGNOSTICS").await;
        self.probe_logger.set_run_id(factory.run_id()).await;

        let budget = RunBudget::new(self.config.run_budget(), cancel);
        let builder = ReportBuilder::new()
            .run_id(factory.run_id())
            .generated_at(Utc::now())
            .ping_host(&self.config.ping_host);

        let snapshot = match provider.snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                logger
                    .error("Network snapshot unavailable")
                    .error_info(&error)
                    .location(file!(), line!())
                    .log()
                    .await;
                return self.untested(builder).error(&error).duration(started.elapsed()).build();
            }
        };

        let quick = self.config.force_quick || snapshot.vpn_active();
        let profile = self.config.profile(quick);
        let pool = BoundedPool::new(self.config.concurrency);
        let prober = self.prober.as_ref();
        logger.add_context_field("quick_mode", quick).await;

        logger
            .info("Diagnostic run started")
            .field("network_type", snapshot.network_type)
            .field("vpn_active", snapshot.vpn_active())
            .field("concurrency", pool.limit())
            .log()
            .await;

        let sites = self.check_sites(prober, &pool, &profile, &budget).await;
        let ping = PingTrain::from_profile(&profile)
            .run(prober, &self.config.ping_host, &budget)
            .await;
        let dns_servers = self.check_dns_servers(prober, &pool, &profile, &budget).await;
        let censorship = self.check_censorship(prober, &pool, &profile, &budget).await;

        let protocol_blocking = if budget.is_exhausted() {
            None
        } else {
            let analyzer = ProtocolBlockingAnalyzer::new(
                &self.catalog,
                &self.classifier,
                pool,
                profile.probe_timeout,
                profile.dns_timeout,
            )
            .with_logger(self.probe_logger.clone());
            Some(analyzer.analyze(prober, &budget).await)
        };

        let estimator = SpeedEstimator::new();
        let speed = tokio::select! {
            biased;
            _ = budget.expired() => None,
            estimate = estimator.estimate(
                prober,
                &self.config.speed_test_url,
                budget.clamp(profile.probe_timeout),
            ) => Some(estimate),
        };

        let report = builder
            .connection(snapshot)
            .quick_mode(quick)
            .sites(sites)
            .ping(ping)
            .dns_servers(dns_servers)
            .censorship(censorship)
            .protocol_blocking(protocol_blocking)
            .speed(speed)
            .duration(started.elapsed())
            .build();

        self.log_finish(&logger, &budget, &report).await;
        report
    }

    /// Synchronous entry point on a private current-thread runtime
    pub fn run_blocking(&self, provider: &dyn NetworkStateProvider) -> DiagnosticReport {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(self.run(provider)),
            Err(error) => ReportBuilder::failed(&AppError::internal(format!(
                "Failed to start async runtime: {}",
                error
            ))),
        }
    }

    /// Every catalog check marked as never run
    fn untested(&self, builder: ReportBuilder) -> ReportBuilder {
        builder
            .sites(self.catalog.test_sites.iter().map(SiteCheck::untested).collect())
            .dns_servers(self.catalog.dns_servers.iter().copied().map(DnsServerCheck::untested).collect())
            .censorship(self.catalog.censorship_sites.iter().map(SiteCheck::untested).collect())
    }

    async fn check_sites(
        &self,
        prober: &dyn Prober,
        pool: &BoundedPool,
        profile: &ProbeProfile,
        budget: &RunBudget,
    ) -> Vec<SiteCheck> {
        let hosts = self.catalog.test_sites.clone();
        let results = pool
            .run_all(hosts.clone(), |host| self.check_site(prober, host, *profile, budget), budget)
            .await;
        fill_untested(hosts, results, SiteCheck::untested)
    }

    /// Resolve, then a reachability probe unless DNS already failed or was sinkholed
    async fn check_site(&self, prober: &dyn Prober, host: String, profile: ProbeProfile, budget: &RunBudget) -> SiteCheck {
        let target = ProbeTarget::host(&host);
        let dns = prober.resolve_host(&host, budget.clamp(profile.dns_timeout)).await;

        let tcp = if dns.succeeded() && self.classifier.sinkholed(&dns).is_none() {
            Some(prober.reachability_probe(&host, budget.clamp(profile.probe_timeout)).await)
        } else {
            None
        };

        let verdict = self.classifier.classify(
            &target,
            RawOutcomes {
                dns: Some(&dns),
                tcp: tcp.as_ref(),
                http: None,
            },
        );
        self.probe_logger.log_verdict(&verdict).await;
        SiteCheck::completed(host, Some(dns), tcp, None, verdict)
    }

    async fn check_dns_servers(
        &self,
        prober: &dyn Prober,
        pool: &BoundedPool,
        profile: &ProbeProfile,
        budget: &RunBudget,
    ) -> Vec<DnsServerCheck> {
        let servers = self.catalog.dns_servers.clone();
        let domain = self.catalog.dns_probe_domain.as_str();
        let timeout = profile.dns_timeout;

        let results = pool
            .run_all(
                servers.clone(),
                |server: IpAddr| async move {
                    let lookup = prober.query_dns_server(server, domain, budget.clamp(timeout)).await;
                    let working = lookup.succeeded() && self.classifier.sinkholed(&lookup).is_none();
                    DnsServerCheck::completed(server, lookup, working)
                },
                budget,
            )
            .await;
        fill_untested(servers, results, DnsServerCheck::untested)
    }

    async fn check_censorship(
        &self,
        prober: &dyn Prober,
        pool: &BoundedPool,
        profile: &ProbeProfile,
        budget: &RunBudget,
    ) -> Vec<SiteCheck> {
        let sites = self.catalog.censorship_sites.clone();
        let results = pool
            .run_all(sites.clone(), |site| self.check_censored(prober, site, *profile, budget), budget)
            .await;
        fill_untested(sites, results, SiteCheck::untested)
    }

    /// DNS, a port-80 connect, then HEAD (GET fallback) while each step still works
    async fn check_censored(&self, prober: &dyn Prober, site: String, profile: ProbeProfile, budget: &RunBudget) -> SiteCheck {
        let target = ProbeTarget::with_port(&site, CENSORSHIP_PORT);
        let dns = prober.resolve_host(&site, budget.clamp(profile.dns_timeout)).await;

        let mut tcp = None;
        let mut http = None;
        if dns.succeeded() && self.classifier.sinkholed(&dns).is_none() {
            let connect = prober
                .connect_port(&site, CENSORSHIP_PORT, budget.clamp(profile.probe_timeout))
                .await;
            if connect.succeeded {
                let request = HttpProbeRequest::new(
                    format!("http://{}/", site),
                    HttpMethod::Head,
                    budget.clamp(profile.probe_timeout),
                );
                http = Some(prober.http_probe(&request).await);
            }
            tcp = Some(connect);
        }

        let verdict = self.classifier.classify(
            &target,
            RawOutcomes {
                dns: Some(&dns),
                tcp: tcp.as_ref(),
                http: http.as_ref(),
            },
        );
        self.probe_logger.log_verdict(&verdict).await;
        SiteCheck::completed(site, Some(dns), tcp, http, verdict)
    }

    async fn log_finish(&self, logger: &Logger, budget: &RunBudget, report: &DiagnosticReport) {
        if let Some(reason) = budget.stop_reason() {
            logger
                .warn("Run stopped before every check completed")
                .field("reason", reason.as_str())
                .field("untested", report.untested_count())
                .log()
                .await;
        }
        logger
            .info("Diagnostic run finished")
            .field("issues", report.issue_count)
            .field("censored", report.censored_count())
            .field("duration_ms", report.duration_ms)
            .log()
            .await;
    }
}

/// Pair pooled results with their inputs, filling unrun slots
fn fill_untested<I, T, F>(inputs: Vec<I>, results: Vec<Option<T>>, untested: F) -> Vec<T>
where
    F: Fn(I) -> T,
{
    inputs
        .into_iter()
        .zip(results)
        .map(|(input, result)| result.unwrap_or_else(|| untested(input)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CancelHandle;
    use crate::models::ProtocolEntry;
    use crate::platform::{NetworkSnapshot, SnapshotFile, StaticNetworkState};
    use crate::probe::scripted::Step;
    use crate::probe::ScriptedProber;
    use crate::types::{CheckStatus, FailureKind, NetworkType, VerdictKind};
    use std::time::Duration;

    fn small_catalog() -> Catalog {
        Catalog {
            test_sites: vec!["google.com".to_string(), "vk.com".to_string()],
            dns_servers: vec!["8.8.8.8".parse().unwrap(), "1.1.1.1".parse().unwrap()],
            censorship_sites: vec!["linkedin.com".to_string()],
            protocol_hosts: vec!["google.com".to_string()],
            protocols: vec![ProtocolEntry {
                name: "OpenVPN".to_string(),
                hosts: Vec::new(),
                ports: vec![1194],
            }],
            protocol_domains: vec!["openvpn.net".to_string()],
            sni_domains: vec!["vpn.com".to_string()],
            ..Catalog::default()
        }
    }

    fn config() -> Config {
        Config {
            ping_samples: 3,
            ping_interval_ms: 100,
            ..Config::default()
        }
    }

    fn engine(prober: ScriptedProber) -> NetworkDiagnostics {
        NetworkDiagnostics::new(config(), small_catalog(), Arc::new(prober)).unwrap()
    }

    fn wifi() -> StaticNetworkState {
        StaticNetworkState::new(NetworkSnapshot::connected(NetworkType::Wifi))
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_run_fills_every_section() {
        let report = engine(ScriptedProber::healthy(20.0)).run(&wifi()).await;

        assert!(!report.has_error());
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.sites.len(), 2);
        assert!(report.sites.iter().all(|s| s.status == CheckStatus::Completed && !s.is_blocked()));
        assert_eq!(report.ping.as_ref().map(|p| p.total_packets), Some(3));
        assert!(report.dns_servers.iter().all(|d| d.working));
        assert!(report.protocol_blocking.is_some());
        assert!(report.speed.is_some());
        assert!(!report.quick_mode);
        assert!(report.run_id.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_site_order_follows_catalog() {
        let report = engine(ScriptedProber::healthy(20.0).with_delay(Duration::from_millis(5)))
            .run(&wifi())
            .await;
        let targets: Vec<&str> = report.sites.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(targets, vec!["google.com", "vk.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sinkholed_site_is_dns_block_without_reachability() {
        let prober = ScriptedProber::healthy(20.0).dns("vk.com", &["127.0.0.1"]);
        let diagnostics = engine(prober);
        let report = diagnostics.run(&wifi()).await;

        let vk = &report.sites[1];
        assert_eq!(vk.verdict.as_ref().map(|v| v.kind), Some(VerdictKind::DnsBlock));
        assert!(vk.tcp.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_censorship_http_block() {
        let prober = ScriptedProber::healthy(20.0).http("http://linkedin.com/", 451, "Unavailable");
        let report = engine(prober).run(&wifi()).await;

        assert_eq!(report.censored_count(), 1);
        assert_eq!(
            report.censorship[0].verdict.as_ref().map(|v| v.kind),
            Some(VerdictKind::HttpBlock)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_censorship_refused_skips_http() {
        let prober = ScriptedProber::healthy(20.0).connect("linkedin.com", 80, Step::Fail(FailureKind::ConnectionRefused));
        let report = engine(prober).run(&wifi()).await;

        let check = &report.censorship[0];
        assert!(check.http.is_none());
        assert_eq!(check.verdict.as_ref().map(|v| v.kind), Some(VerdictKind::TcpBlock));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dns_server_with_sinkhole_answer_is_not_working() {
        let prober = ScriptedProber::healthy(20.0).server_dns("1.1.1.1", "google.com", &["0.0.0.0"]);
        let report = engine(prober).run(&wifi()).await;

        assert!(report.dns_servers[0].working);
        assert!(!report.dns_servers[1].working);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vpn_snapshot_switches_to_quick_mode() {
        let provider = StaticNetworkState::new(NetworkSnapshot::connected(NetworkType::Vpn));
        let report = engine(ScriptedProber::healthy(20.0)).run(&provider).await;

        assert!(report.vpn_active);
        assert!(report.quick_mode);
    }

    #[tokio::test]
    async fn test_missing_snapshot_yields_error_marker() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SnapshotFile::new(dir.path().join("absent.json"));
        let prober = Arc::new(ScriptedProber::healthy(20.0));
        let diagnostics = NetworkDiagnostics::new(config(), small_catalog(), prober.clone()).unwrap();

        let report = diagnostics.run(&provider).await;

        assert!(report.has_error());
        assert_eq!(report.exit_code, 3);
        assert!(report.connection.is_none());
        assert_eq!(report.untested_count(), 5);
        assert!(report.ping.is_none());
        assert!(prober.calls().is_empty());
        assert!(!report.is_complete());
        assert!(report.status_line.starts_with("[INCOMPLETE]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_keeps_report_shape() {
        let (handle, signal) = CancelHandle::new();
        handle.cancel();

        let report = engine(ScriptedProber::healthy(20.0))
            .run_with_cancel(&wifi(), signal)
            .await;

        assert!(!report.has_error());
        assert_eq!(report.untested_count(), 5);
        assert!(report.ping.is_none());
        assert!(report.protocol_blocking.is_none());
        assert!(report.speed.is_none());
        assert!(report.connection.is_some());
        assert_eq!(report.untested_checks, 8);
        assert_eq!(report.status_line, "[INCOMPLETE] 8 checks untested");
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_cut_marks_slow_checks_untested() {
        let mut short = config();
        short.run_budget_secs = 1;
        let prober = ScriptedProber::healthy(20.0).with_delay(Duration::from_millis(700));
        let diagnostics = NetworkDiagnostics::new(short, small_catalog(), Arc::new(prober)).unwrap();

        let report = diagnostics.run(&wifi()).await;

        assert!(report.sites.iter().any(|s| s.status == CheckStatus::Untested));
        assert!(report.speed.is_none());
        assert!(report.duration_ms <= 1100);
    }

    #[test]
    fn test_run_blocking_outside_runtime() {
        let report = engine(ScriptedProber::healthy(1.0)).run_blocking(&wifi());
        assert!(!report.has_error());
        assert_eq!(report.sites.len(), 2);
    }
}
