//! Name resolution through the system resolver or one specific server

use crate::{
    error::Result,
    models::DnsLookup,
    types::FailureKind,
};
use std::{
    net::{IpAddr, SocketAddr},
    time::{Duration, Instant},
};
use trust_dns_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    system_conf, TokioAsyncResolver,
};

/// DNS side of the probe layer
pub struct DnsProber {
    system_config: ResolverConfig,
    system_opts: ResolverOpts,
}

impl DnsProber {
    /// Read the host resolver configuration, falling back to public resolvers
    /// when the host has none
    pub fn new() -> Result<Self> {
        let (system_config, system_opts) = match system_conf::read_system_conf() {
            Ok((config, opts)) if !config.name_servers().is_empty() => (config, opts),
            _ => (ResolverConfig::default(), ResolverOpts::default()),
        };

        Ok(Self {
            system_config,
            system_opts,
        })
    }

    /// Resolve `host` through the system resolver; IP literals resolve to
    /// themselves without a query
    pub async fn resolve(&self, host: &str, timeout: Duration) -> DnsLookup {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return DnsLookup::resolved(host, vec![ip], Duration::ZERO);
        }

        // A fresh resolver per lookup keeps answers out of any cache
        let resolver = TokioAsyncResolver::tokio(
            self.system_config.clone(),
            single_attempt(self.system_opts.clone(), timeout),
        );
        lookup(&resolver, host, timeout).await
    }

    /// Resolve `domain` through `server` only, UDP first then TCP
    pub async fn query_server(&self, server: IpAddr, domain: &str, timeout: Duration) -> DnsLookup {
        let resolver = TokioAsyncResolver::tokio(
            server_config(server),
            single_attempt(ResolverOpts::default(), timeout),
        );
        lookup(&resolver, domain, timeout).await
    }
}

fn single_attempt(mut opts: ResolverOpts, timeout: Duration) -> ResolverOpts {
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.cache_size = 0;
    opts
}

/// Resolver configuration pointing at one server on port 53
pub fn server_config(server: IpAddr) -> ResolverConfig {
    let socket_addr = SocketAddr::new(server, 53);
    let mut config = ResolverConfig::new();
    config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Udp));
    config.add_name_server(NameServerConfig::new(socket_addr, Protocol::Tcp));
    config
}

async fn lookup(resolver: &TokioAsyncResolver, host: &str, timeout: Duration) -> DnsLookup {
    let started = Instant::now();

    match tokio::time::timeout(timeout, resolver.lookup_ip(host)).await {
        Ok(Ok(response)) => {
            let addresses: Vec<IpAddr> = response.iter().collect();
            DnsLookup::resolved(host, addresses, started.elapsed())
        }
        Ok(Err(e)) => DnsLookup::failed(host, FailureKind::DnsFailure, Some(e.to_string())),
        Err(_) => DnsLookup::failed(
            host,
            FailureKind::DnsFailure,
            Some(format!("lookup timed out after {}ms", timeout.as_millis())),
        ),
    }
}
