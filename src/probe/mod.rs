//! Probe layer: bounded DNS, TCP and HTTP checks
//!
//! Every operation takes an explicit timeout and never returns an error:
//! transport failures are folded into a [`FailureKind`] on the outcome.

pub mod dns;
pub mod http;
pub mod scripted;

pub use dns::DnsProber;
pub use http::HttpProber;
pub use scripted::ScriptedProber;

use crate::{
    error::Result,
    logging::ProbeLogger,
    models::{DnsLookup, HttpOutcome, HttpProbeRequest, ProbeOutcome, ProbeTarget},
    types::FailureKind,
};
use async_trait::async_trait;
use std::{
    io,
    net::{IpAddr, SocketAddr},
    time::{Duration, Instant},
};
use tokio::net::TcpStream;

/// Ports tried, in order, by the reachability probe
pub const REACHABILITY_PORTS: [u16; 2] = [443, 80];

/// Bounded network probes used by every diagnostic section
#[async_trait]
pub trait Prober: Send + Sync {
    /// Resolve `host` through the system resolver
    async fn resolve_host(&self, host: &str, timeout: Duration) -> DnsLookup;

    /// Resolve `domain` through one specific DNS server
    async fn query_dns_server(&self, server: IpAddr, domain: &str, timeout: Duration) -> DnsLookup;

    /// TCP connect; latency covers the handshake only
    async fn connect_port(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome;

    /// HTTP exchange, falling back from HEAD to GET once
    async fn http_probe(&self, request: &HttpProbeRequest) -> HttpOutcome;

    /// Approximates an ICMP echo with TCP connects to well-known ports
    async fn reachability_probe(&self, host: &str, timeout: Duration) -> ProbeOutcome;
}

/// Prober backed by the host network stack
pub struct NetworkProber {
    dns: DnsProber,
    http: HttpProber,
    logger: ProbeLogger,
}

impl NetworkProber {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dns: DnsProber::new()?,
            http: HttpProber::new(crate::defaults::USER_AGENT)?,
            logger: ProbeLogger::silent(),
        })
    }

    pub fn with_logger(mut self, logger: ProbeLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Connect to the first usable address of an already resolved lookup
    async fn connect_resolved(
        &self,
        target: ProbeTarget,
        lookup: &DnsLookup,
        port: u16,
        remaining: Duration,
    ) -> ProbeOutcome {
        let Some(address) = preferred_address(&lookup.addresses) else {
            return ProbeOutcome::failure(target, FailureKind::DnsFailure, lookup.detail.clone());
        };

        connect_with_timeout(target, SocketAddr::new(address, port), remaining).await
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn resolve_host(&self, host: &str, timeout: Duration) -> DnsLookup {
        let lookup = self.dns.resolve(host, timeout).await;
        self.logger.log_lookup(&lookup, "system").await;
        lookup
    }

    async fn query_dns_server(&self, server: IpAddr, domain: &str, timeout: Duration) -> DnsLookup {
        let lookup = self.dns.query_server(server, domain, timeout).await;
        self.logger.log_lookup(&lookup, &server.to_string()).await;
        lookup
    }

    async fn connect_port(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let target = ProbeTarget::with_port(host, port);

        let lookup = self.dns.resolve(host, timeout).await;
        let outcome = if !lookup.succeeded() {
            ProbeOutcome::failure(target, FailureKind::DnsFailure, lookup.detail.clone())
        } else {
            let remaining = timeout.saturating_sub(started.elapsed());
            self.connect_resolved(target, &lookup, port, remaining).await
        };

        self.logger.log_connect(&outcome).await;
        outcome
    }

    async fn http_probe(&self, request: &HttpProbeRequest) -> HttpOutcome {
        let outcome = self.http.probe(request).await;
        self.logger.log_http(&request.url, &outcome).await;
        outcome
    }

    async fn reachability_probe(&self, host: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let target = ProbeTarget::host(host);

        let lookup = self.dns.resolve(host, timeout).await;
        if !lookup.succeeded() {
            let outcome = ProbeOutcome::failure(target, FailureKind::DnsFailure, lookup.detail);
            self.logger.log_connect(&outcome).await;
            return outcome;
        }

        let mut last = ProbeOutcome::failure(target.clone(), FailureKind::Timeout, None);
        for port in REACHABILITY_PORTS {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }

            let attempt_started = Instant::now();
            let attempt = self.connect_resolved(target.clone(), &lookup, port, remaining).await;
            if attempt.succeeded {
                last = attempt;
                break;
            }
            // A refusal is an answer from the host, same as an echo reply
            if attempt.failure_kind == FailureKind::ConnectionRefused {
                last = ProbeOutcome::success(target.clone(), attempt_started.elapsed());
                break;
            }
            last = attempt;
        }

        self.logger.log_connect(&last).await;
        last
    }
}

/// Prefer IPv4; most mobile networks still route it more reliably
fn preferred_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
}

/// TCP connect bounded by `timeout`
pub async fn connect_with_timeout(target: ProbeTarget, address: SocketAddr, timeout: Duration) -> ProbeOutcome {
    if timeout.is_zero() {
        return ProbeOutcome::failure(target, FailureKind::Timeout, Some("no time left".to_string()));
    }

    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => ProbeOutcome::success(target, started.elapsed()),
        Ok(Err(e)) => ProbeOutcome::failure(target, classify_io_error(&e), Some(e.to_string())),
        Err(_) => ProbeOutcome::failure(
            target,
            FailureKind::Timeout,
            Some(format!("connect timed out after {}ms", timeout.as_millis())),
        ),
    }
}

/// Classify a transport error by kind first and message text second
pub fn classify_io_error(error: &io::Error) -> FailureKind {
    use io::ErrorKind;

    match error.kind() {
        ErrorKind::ConnectionRefused => FailureKind::ConnectionRefused,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => FailureKind::ConnectionReset,
        ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => FailureKind::NetworkUnreachable,
        ErrorKind::TimedOut => FailureKind::Timeout,
        _ => classify_error_text(&error.to_string()),
    }
}

/// Classify free-form error text
pub fn classify_error_text(text: &str) -> FailureKind {
    let text = text.to_lowercase();

    if text.contains("refused") {
        FailureKind::ConnectionRefused
    } else if text.contains("reset") || text.contains("aborted") || text.contains("broken pipe") {
        FailureKind::ConnectionReset
    } else if text.contains("unreachable") || text.contains("no route to host") {
        FailureKind::NetworkUnreachable
    } else if text.contains("timed out") || text.contains("timeout") {
        FailureKind::Timeout
    } else if text.contains("dns error")
        || text.contains("failed to lookup")
        || text.contains("name or service not known")
        || text.contains("no such host")
    {
        FailureKind::DnsFailure
    } else {
        FailureKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_classify_io_error_by_kind() {
        let cases = [
            (io::ErrorKind::ConnectionRefused, FailureKind::ConnectionRefused),
            (io::ErrorKind::ConnectionReset, FailureKind::ConnectionReset),
            (io::ErrorKind::ConnectionAborted, FailureKind::ConnectionReset),
            (io::ErrorKind::TimedOut, FailureKind::Timeout),
        ];
        for (kind, expected) in cases {
            let error = io::Error::new(kind, "x");
            assert_eq!(classify_io_error(&error), expected, "{:?}", kind);
        }
    }

    #[test]
    fn test_classify_io_error_falls_back_to_text() {
        let error = io::Error::new(io::ErrorKind::Other, "connect: No route to host (os error 113)");
        assert_eq!(classify_io_error(&error), FailureKind::NetworkUnreachable);

        let error = io::Error::new(io::ErrorKind::Other, "something odd");
        assert_eq!(classify_io_error(&error), FailureKind::Unknown);
    }

    #[test]
    fn test_classify_error_text() {
        assert_eq!(classify_error_text("Connection refused (os error 111)"), FailureKind::ConnectionRefused);
        assert_eq!(classify_error_text("connection reset by peer"), FailureKind::ConnectionReset);
        assert_eq!(classify_error_text("operation timed out"), FailureKind::Timeout);
        assert_eq!(classify_error_text("dns error: failed to lookup address"), FailureKind::DnsFailure);
        assert_eq!(classify_error_text("tls handshake eof"), FailureKind::Unknown);
    }

    #[test]
    fn test_preferred_address() {
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(preferred_address(&[v6, v4]), Some(v4));
        assert_eq!(preferred_address(&[v6]), Some(v6));
        assert_eq!(preferred_address(&[]), None);
    }

    #[tokio::test]
    async fn test_connect_success_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = NetworkProber::new().unwrap();

        let outcome = prober.connect_port("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(outcome.succeeded, "{:?}", outcome);
        assert_eq!(outcome.failure_kind, FailureKind::None);
        assert!(outcome.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_connect_refused_against_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = NetworkProber::new().unwrap();
        let outcome = prober.connect_port("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failure_kind, FailureKind::ConnectionRefused);
        assert!(outcome.latency_ms.is_none());
    }

    #[tokio::test]
    async fn test_zero_timeout_is_timeout() {
        let address: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let outcome = connect_with_timeout(ProbeTarget::with_port("127.0.0.1", 9), address, Duration::ZERO).await;
        assert_eq!(outcome.failure_kind, FailureKind::Timeout);
    }
}
