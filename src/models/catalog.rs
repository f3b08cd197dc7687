//! Test catalog: every host, server, port table and sinkhole range the
//! diagnostic run iterates over
//!
//! Iteration order everywhere follows declaration order here, so report
//! sections come out in a stable order.

use crate::classifier::{SinkholeList, DEFAULT_SINKHOLES};
use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

/// One VPN protocol and the ports it is usually served on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEntry {
    pub name: String,
    /// Hosts swept for this protocol; empty means the shared host list
    #[serde(default)]
    pub hosts: Vec<String>,
    pub ports: Vec<u16>,
}

impl ProtocolEntry {
    fn new(name: &str, ports: &[u16]) -> Self {
        Self {
            name: name.to_string(),
            hosts: Vec::new(),
            ports: ports.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// General reachability targets
    #[serde(default = "default_test_sites")]
    pub test_sites: Vec<String>,

    /// Public resolvers queried one by one
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<IpAddr>,

    /// Name looked up through each resolver
    #[serde(default = "default_reference_host")]
    pub dns_probe_domain: String,

    /// Sites commonly blocked by registry-based filtering
    #[serde(default = "default_censorship_sites")]
    pub censorship_sites: Vec<String>,

    /// Shared host list for protocols without their own
    #[serde(default = "default_protocol_hosts")]
    pub protocol_hosts: Vec<String>,

    #[serde(default = "default_protocols")]
    pub protocols: Vec<ProtocolEntry>,

    /// Protocol-ecosystem domains for the domain-blocking sweep
    #[serde(default = "default_protocol_domains")]
    pub protocol_domains: Vec<String>,

    #[serde(default = "default_sni_domains")]
    pub sni_domains: Vec<String>,

    /// VPN API domains whose joint unreachability flags DPI
    #[serde(default = "default_dpi_domains")]
    pub dpi_domains: Vec<String>,

    #[serde(default = "default_dpi_threshold")]
    pub dpi_threshold: usize,

    /// Well-known host used for the protocol advice probes
    #[serde(default = "default_reference_host")]
    pub reference_host: String,

    /// CIDR ranges treated as censorship sinkholes
    #[serde(default = "default_sinkholes")]
    pub sinkholes: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            test_sites: default_test_sites(),
            dns_servers: default_dns_servers(),
            dns_probe_domain: default_reference_host(),
            censorship_sites: default_censorship_sites(),
            protocol_hosts: default_protocol_hosts(),
            protocols: default_protocols(),
            protocol_domains: default_protocol_domains(),
            sni_domains: default_sni_domains(),
            dpi_domains: default_dpi_domains(),
            dpi_threshold: default_dpi_threshold(),
            reference_host: default_reference_host(),
            sinkholes: default_sinkholes(),
        }
    }
}

impl Catalog {
    /// Parse a JSON catalog; omitted sections keep their built-in values
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::io(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Built-in catalog, or the file named by `path`
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hosts swept for `entry`
    pub fn hosts_for<'a>(&'a self, entry: &'a ProtocolEntry) -> &'a [String] {
        if entry.hosts.is_empty() {
            &self.protocol_hosts
        } else {
            &entry.hosts
        }
    }

    pub fn protocol(&self, name: &str) -> Option<&ProtocolEntry> {
        self.protocols.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn sinkhole_list(&self) -> Result<SinkholeList> {
        SinkholeList::from_cidrs(&self.sinkholes)
    }

    pub fn validate(&self) -> Result<()> {
        let name_lists: [(&str, &[String]); 6] = [
            ("test_sites", &self.test_sites),
            ("censorship_sites", &self.censorship_sites),
            ("protocol_hosts", &self.protocol_hosts),
            ("protocol_domains", &self.protocol_domains),
            ("sni_domains", &self.sni_domains),
            ("dpi_domains", &self.dpi_domains),
        ];
        for (section, names) in name_lists {
            if let Some(position) = names.iter().position(|n| n.trim().is_empty()) {
                return Err(AppError::validation(format!(
                    "Catalog section '{}' has an empty entry at position {}",
                    section, position
                )));
            }
        }

        if self.dns_probe_domain.trim().is_empty() || self.reference_host.trim().is_empty() {
            return Err(AppError::validation("Catalog probe domains cannot be empty"));
        }

        let mut seen = HashSet::new();
        for entry in &self.protocols {
            if entry.name.trim().is_empty() {
                return Err(AppError::validation("Protocol name cannot be empty"));
            }
            if !seen.insert(entry.name.to_uppercase()) {
                return Err(AppError::validation(format!(
                    "Duplicate protocol '{}' in catalog",
                    entry.name
                )));
            }
            if entry.ports.is_empty() || entry.ports.contains(&0) {
                return Err(AppError::validation(format!(
                    "Protocol '{}' needs at least one non-zero port",
                    entry.name
                )));
            }
            if entry.hosts.iter().any(|h| h.trim().is_empty()) {
                return Err(AppError::validation(format!(
                    "Protocol '{}' has an empty host",
                    entry.name
                )));
            }
            if entry.hosts.is_empty() && self.protocol_hosts.is_empty() {
                return Err(AppError::validation(format!(
                    "Protocol '{}' has no hosts to sweep",
                    entry.name
                )));
            }
        }

        if self.dpi_threshold == 0 || self.dpi_threshold > self.dpi_domains.len().max(1) {
            return Err(AppError::validation(format!(
                "DPI threshold {} does not fit {} DPI domains",
                self.dpi_threshold,
                self.dpi_domains.len()
            )));
        }

        self.sinkhole_list()?;
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_test_sites() -> Vec<String> {
    strings(&[
        "google.com",
        "youtube.com",
        "github.com",
        "vk.com",
        "telegram.org",
        "rutracker.org",
        "8.8.8.8",
        "1.1.1.1",
    ])
}

fn default_dns_servers() -> Vec<IpAddr> {
    [
        Ipv4Addr::new(8, 8, 8, 8),
        Ipv4Addr::new(1, 1, 1, 1),
        Ipv4Addr::new(9, 9, 9, 9),
        Ipv4Addr::new(77, 88, 8, 8),
        Ipv4Addr::new(208, 67, 222, 222),
    ]
    .into_iter()
    .map(IpAddr::V4)
    .collect()
}

fn default_censorship_sites() -> Vec<String> {
    strings(&["rutracker.org", "libgen.is", "t.me", "telegram.me"])
}

fn default_protocol_hosts() -> Vec<String> {
    strings(&[
        "v2ray.com",
        "xray.com",
        "trojan-gfw.github.io",
        "shadowsocks.org",
        "wireguard.com",
        "openvpn.net",
        "strongswan.org",
    ])
}

fn default_protocols() -> Vec<ProtocolEntry> {
    vec![
        ProtocolEntry::new("VLESS", &[443, 8443, 2053, 2083, 2087]),
        ProtocolEntry::new("VMESS", &[443, 8443, 2053, 2083, 2087]),
        ProtocolEntry::new("TROJAN", &[443, 8443]),
        ProtocolEntry::new("SHADOWSOCKS", &[8388, 1080, 443]),
        ProtocolEntry::new("WIREGUARD", &[51820]),
        ProtocolEntry::new("OPENVPN", &[1194, 1195, 1196, 1197]),
        ProtocolEntry::new("IPSEC", &[500, 4500]),
        ProtocolEntry::new("SOCKS5", &[1080, 1081]),
        ProtocolEntry::new("HTTP_PROXY", &[8080, 3128]),
    ]
}

fn default_protocol_domains() -> Vec<String> {
    strings(&[
        "v2ray.com",
        "xray.com",
        "trojan-gfw.github.io",
        "shadowsocks.org",
        "wireguard.com",
        "openvpn.net",
    ])
}

fn default_sni_domains() -> Vec<String> {
    strings(&["v2ray.com", "www.cloudflare.com", "www.github.com", "www.google.com"])
}

fn default_dpi_domains() -> Vec<String> {
    strings(&["api.v2ray.com", "api.shadowsocks.org", "api.wireguard.com"])
}

fn default_dpi_threshold() -> usize {
    2
}

fn default_reference_host() -> String {
    "google.com".to_string()
}

fn default_sinkholes() -> Vec<String> {
    strings(&DEFAULT_SINKHOLES)
}
