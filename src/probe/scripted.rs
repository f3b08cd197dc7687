//! Deterministic prober replaying scripted outcomes
//!
//! Unscripted lookups fall back to the prober-wide defaults, so a scenario
//! only needs to spell out the hosts that behave differently.

use super::{Prober, REACHABILITY_PORTS};
use crate::{
    models::{DnsLookup, HttpOutcome, HttpProbeRequest, ProbeOutcome, ProbeTarget},
    types::FailureKind,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr},
    sync::Mutex,
    time::Duration,
};

/// Address unscripted hosts resolve to (TEST-NET-3)
pub const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10));

/// Scripted result of a connect or reachability attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Success after this many milliseconds
    Answer(f64),
    Fail(FailureKind),
}

#[derive(Debug, Clone)]
struct ScriptedHttp {
    status: Option<u16>,
    body: String,
    failure: FailureKind,
}

#[derive(Default)]
struct Script {
    dns: HashMap<String, Result<Vec<IpAddr>, ()>>,
    server_dns: HashMap<(IpAddr, String), Result<Vec<IpAddr>, ()>>,
    connect: HashMap<(String, u16), Step>,
    host_connect: HashMap<String, Step>,
    http: HashMap<String, ScriptedHttp>,
    reachability: HashMap<String, VecDeque<Step>>,
}

/// Map-driven [`Prober`] for tests and replaying recorded runs
pub struct ScriptedProber {
    script: Mutex<Script>,
    default_step: Step,
    default_http_status: u16,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProber {
    /// Every unscripted host resolves and answers after `latency_ms`
    pub fn healthy(latency_ms: f64) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            default_step: Step::Answer(latency_ms),
            default_http_status: 200,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every unscripted host resolves but never answers
    pub fn silent() -> Self {
        let mut prober = Self::healthy(0.0);
        prober.default_step = Step::Fail(FailureKind::Timeout);
        prober
    }

    /// Artificial delay added to every call, bounded by the call's timeout
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dns(self, host: &str, addresses: &[&str]) -> Self {
        let parsed = addresses.iter().filter_map(|a| a.parse().ok()).collect();
        self.edit(|s| {
            s.dns.insert(host.to_string(), Ok(parsed));
        })
    }

    pub fn dns_failure(self, host: &str) -> Self {
        self.edit(|s| {
            s.dns.insert(host.to_string(), Err(()));
        })
    }

    pub fn server_dns(self, server: &str, domain: &str, addresses: &[&str]) -> Self {
        let Ok(server) = server.parse::<IpAddr>() else {
            return self;
        };
        let parsed = addresses.iter().filter_map(|a| a.parse().ok()).collect();
        self.edit(|s| {
            s.server_dns.insert((server, domain.to_string()), Ok(parsed));
        })
    }

    pub fn server_dns_failure(self, server: &str, domain: &str) -> Self {
        let Ok(server) = server.parse::<IpAddr>() else {
            return self;
        };
        self.edit(|s| {
            s.server_dns.insert((server, domain.to_string()), Err(()));
        })
    }

    pub fn connect(self, host: &str, port: u16, step: Step) -> Self {
        self.edit(|s| {
            s.connect.insert((host.to_string(), port), step);
        })
    }

    /// Same step for every port of `host`
    pub fn host(self, host: &str, step: Step) -> Self {
        self.edit(|s| {
            s.host_connect.insert(host.to_string(), step);
        })
    }

    pub fn http(self, url: &str, status: u16, body: &str) -> Self {
        self.edit(|s| {
            s.http.insert(
                url.to_string(),
                ScriptedHttp {
                    status: Some(status),
                    body: body.to_string(),
                    failure: FailureKind::None,
                },
            );
        })
    }

    pub fn http_failure(self, url: &str, kind: FailureKind) -> Self {
        self.edit(|s| {
            s.http.insert(
                url.to_string(),
                ScriptedHttp {
                    status: None,
                    body: String::new(),
                    failure: kind,
                },
            );
        })
    }

    /// Reachability answers consumed one per call; the last one repeats
    pub fn reachability(self, host: &str, steps: Vec<Step>) -> Self {
        self.edit(|s| {
            s.reachability.insert(host.to_string(), steps.into());
        })
    }

    /// Calls made so far, as "op host" strings in call order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn edit<F: FnOnce(&mut Script)>(self, f: F) -> Self {
        f(&mut lock(&self.script));
        self
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }

    /// Sleep the artificial delay; false when the timeout cuts it short
    async fn wait(&self, timeout: Duration) -> bool {
        if self.delay.is_zero() {
            return true;
        }
        if self.delay >= timeout {
            tokio::time::sleep(timeout).await;
            return false;
        }
        tokio::time::sleep(self.delay).await;
        true
    }

    fn lookup(&self, host: &str) -> DnsLookup {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return DnsLookup::resolved(host, vec![ip], Duration::ZERO);
        }
        match lock(&self.script).dns.get(host) {
            Some(Ok(addresses)) => DnsLookup::resolved(host, addresses.clone(), Duration::from_millis(1)),
            Some(Err(())) => DnsLookup::failed(host, FailureKind::DnsFailure, Some("scripted NXDOMAIN".to_string())),
            None => DnsLookup::resolved(host, vec![DEFAULT_ADDRESS], Duration::from_millis(1)),
        }
    }

    fn connect_step(&self, host: &str, port: u16) -> Step {
        let script = lock(&self.script);
        script
            .connect
            .get(&(host.to_string(), port))
            .or_else(|| script.host_connect.get(host))
            .copied()
            .unwrap_or(self.default_step)
    }

    fn reachability_step(&self, host: &str) -> Option<Step> {
        let mut script = lock(&self.script);
        let steps = script.reachability.get_mut(host)?;
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().copied()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn outcome_for(target: ProbeTarget, step: Step, timeout: Duration) -> ProbeOutcome {
    match step {
        Step::Answer(ms) if Duration::from_secs_f64(ms.max(0.0) / 1000.0) < timeout => {
            ProbeOutcome::success(target, Duration::from_secs_f64(ms.max(0.0) / 1000.0))
        }
        Step::Answer(_) => ProbeOutcome::failure(target, FailureKind::Timeout, Some("scripted slow answer".to_string())),
        Step::Fail(kind) => ProbeOutcome::failure(target, kind, Some("scripted failure".to_string())),
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn resolve_host(&self, host: &str, timeout: Duration) -> DnsLookup {
        self.record(format!("resolve {}", host));
        if !self.wait(timeout).await {
            return DnsLookup::failed(host, FailureKind::DnsFailure, Some("timed out".to_string()));
        }
        self.lookup(host)
    }

    async fn query_dns_server(&self, server: IpAddr, domain: &str, timeout: Duration) -> DnsLookup {
        self.record(format!("query {} {}", server, domain));
        if !self.wait(timeout).await {
            return DnsLookup::failed(domain, FailureKind::DnsFailure, Some("timed out".to_string()));
        }
        let scripted = lock(&self.script).server_dns.get(&(server, domain.to_string())).cloned();
        match scripted {
            Some(Ok(addresses)) => DnsLookup::resolved(domain, addresses, Duration::from_millis(1)),
            Some(Err(())) => DnsLookup::failed(domain, FailureKind::DnsFailure, Some("scripted SERVFAIL".to_string())),
            None => self.lookup(domain),
        }
    }

    async fn connect_port(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        self.record(format!("connect {}:{}", host, port));
        let target = ProbeTarget::with_port(host, port);
        if !self.wait(timeout).await {
            return ProbeOutcome::failure(target, FailureKind::Timeout, None);
        }
        if !self.lookup(host).succeeded() {
            return ProbeOutcome::failure(target, FailureKind::DnsFailure, None);
        }
        outcome_for(target, self.connect_step(host, port), timeout)
    }

    async fn http_probe(&self, request: &HttpProbeRequest) -> HttpOutcome {
        self.record(format!("http {}", request.url));
        let target = ProbeTarget::from_url(&request.url);
        if !self.wait(request.timeout).await {
            return HttpOutcome::failed(ProbeOutcome::failure(target, FailureKind::Timeout, None), request.method);
        }

        let scripted = lock(&self.script).http.get(&request.url).cloned();
        let scripted = scripted.unwrap_or(ScriptedHttp {
            status: Some(self.default_http_status),
            body: String::new(),
            failure: FailureKind::None,
        });

        match scripted.status {
            Some(status) => HttpOutcome {
                outcome: ProbeOutcome::success(target, Duration::from_millis(5)),
                status_code: Some(status),
                body_prefix: (!scripted.body.is_empty()).then(|| scripted.body.chars().take(512).collect()),
                body_bytes: scripted.body.len(),
                method_used: request.method,
            },
            None => HttpOutcome::failed(ProbeOutcome::failure(target, scripted.failure, None), request.method),
        }
    }

    async fn reachability_probe(&self, host: &str, timeout: Duration) -> ProbeOutcome {
        self.record(format!("reach {}", host));
        let target = ProbeTarget::host(host);
        if !self.wait(timeout).await {
            return ProbeOutcome::failure(target, FailureKind::Timeout, None);
        }
        if !self.lookup(host).succeeded() {
            return ProbeOutcome::failure(target, FailureKind::DnsFailure, None);
        }

        if let Some(step) = self.reachability_step(host) {
            return outcome_for(target, step, timeout);
        }

        let mut last = ProbeOutcome::failure(target.clone(), FailureKind::Timeout, None);
        for port in REACHABILITY_PORTS {
            match self.connect_step(host, port) {
                Step::Fail(FailureKind::ConnectionRefused) => {
                    return ProbeOutcome::success(target, Duration::from_millis(1));
                }
                step => {
                    last = outcome_for(target.clone(), step, timeout);
                    if last.succeeded {
                        return last;
                    }
                }
            }
        }
        last
    }
}
