//! Network-state provider: the read-only connection snapshot a run starts from
//!
//! The diagnostic core never queries the platform itself. It asks a
//! [`NetworkStateProvider`] once per run and treats the answer as a value.

use crate::{
    error::{AppError, Result},
    types::NetworkType,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, UdpSocket};
use std::path::{Path, PathBuf};

/// Capability flags of the active network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCapabilities {
    pub internet: bool,
    pub validated: bool,
    pub metered: bool,
    pub roaming: bool,
}

/// Cumulative byte counters since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    #[serde(default)]
    pub mobile_rx_bytes: Option<u64>,
    #[serde(default)]
    pub mobile_tx_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub network_type: NetworkType,
    pub connected: bool,
    #[serde(default)]
    pub subtype: Option<String>,
    /// Some network carries a VPN transport, active or not
    #[serde(default)]
    pub vpn_transport: bool,
    #[serde(default)]
    pub capabilities: NetworkCapabilities,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[serde(default)]
    pub traffic: Option<TrafficCounters>,
    /// Carrier or ISP name
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub wifi_ssid: Option<String>,
    /// Configured HTTP proxy, if any
    #[serde(default)]
    pub proxy: Option<String>,
}

impl NetworkSnapshot {
    pub fn disconnected() -> Self {
        Self {
            network_type: NetworkType::Disconnected,
            connected: false,
            subtype: None,
            vpn_transport: false,
            capabilities: NetworkCapabilities::default(),
            ip_addresses: Vec::new(),
            traffic: None,
            provider_name: None,
            wifi_ssid: None,
            proxy: None,
        }
    }

    /// Connected snapshot of the given type with internet capability
    pub fn connected(network_type: NetworkType) -> Self {
        Self {
            network_type,
            connected: true,
            vpn_transport: network_type == NetworkType::Vpn,
            capabilities: NetworkCapabilities {
                internet: true,
                validated: true,
                metered: network_type == NetworkType::Mobile,
                roaming: false,
            },
            ..Self::disconnected()
        }
    }

    pub fn vpn_active(&self) -> bool {
        self.network_type == NetworkType::Vpn || self.vpn_transport
    }
}

/// Source of the connection snapshot
pub trait NetworkStateProvider: Send + Sync {
    fn snapshot(&self) -> Result<NetworkSnapshot>;
}

/// A snapshot handed in by the caller
#[derive(Debug, Clone)]
pub struct StaticNetworkState {
    snapshot: NetworkSnapshot,
}

impl StaticNetworkState {
    pub fn new(snapshot: NetworkSnapshot) -> Self {
        Self { snapshot }
    }
}

impl NetworkStateProvider for StaticNetworkState {
    fn snapshot(&self) -> Result<NetworkSnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// A snapshot recorded as JSON, e.g. exported by a mobile host app
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl NetworkStateProvider for SnapshotFile {
    fn snapshot(&self) -> Result<NetworkSnapshot> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::platform(format!("Failed to read network snapshot {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::platform(format!("Invalid network snapshot {}: {}", self.path.display(), e))
        })
    }
}

/// Byte counters of one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl InterfaceCounters {
    fn active(&self) -> bool {
        self.rx_bytes > 0 || self.tx_bytes > 0
    }
}

/// Best-effort snapshot of the machine the binary runs on
///
/// Linux reads interface counters from `/proc/net/dev`; elsewhere the
/// counters are missing and the type degrades to `Unknown`.
#[derive(Debug, Clone)]
pub struct HostNetworkState {
    counters_path: PathBuf,
}

impl Default for HostNetworkState {
    fn default() -> Self {
        Self::new()
    }
}

impl HostNetworkState {
    pub fn new() -> Self {
        Self {
            counters_path: PathBuf::from("/proc/net/dev"),
        }
    }

    pub fn with_counters_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            counters_path: path.into(),
        }
    }

    fn interfaces(&self) -> Vec<InterfaceCounters> {
        read_counters(&self.counters_path).unwrap_or_default()
    }
}

impl NetworkStateProvider for HostNetworkState {
    fn snapshot(&self) -> Result<NetworkSnapshot> {
        let interfaces = self.interfaces();
        let local_address = outbound_address();
        Ok(build_snapshot(
            &interfaces,
            local_address,
            proxy_from(|key| std::env::var(key).ok()),
        ))
    }
}

fn read_counters(path: &Path) -> Option<Vec<InterfaceCounters>> {
    std::fs::read_to_string(path).ok().map(|content| parse_proc_net_dev(&content))
}

/// Parse the `/proc/net/dev` table; malformed lines are skipped
pub fn parse_proc_net_dev(content: &str) -> Vec<InterfaceCounters> {
    content
        .lines()
        .filter_map(|line| {
            let (name, fields) = line.split_once(':')?;
            let fields: Vec<u64> = fields
                .split_whitespace()
                .map(str::parse)
                .collect::<std::result::Result<_, _>>()
                .ok()?;
            // rx: bytes packets errs drop fifo frame compressed multicast, then tx
            if fields.len() < 16 {
                return None;
            }
            Some(InterfaceCounters {
                name: name.trim().to_string(),
                rx_bytes: fields[0],
                tx_bytes: fields[8],
            })
        })
        .collect()
}

/// Guess the transport from the interface naming conventions of Linux and Android
pub fn classify_interface(name: &str) -> Option<NetworkType> {
    const PREFIXES: [(&str, NetworkType); 17] = [
        ("lo", NetworkType::Unknown),
        ("tun", NetworkType::Vpn),
        ("tap", NetworkType::Vpn),
        ("wg", NetworkType::Vpn),
        ("ppp", NetworkType::Vpn),
        ("ipsec", NetworkType::Vpn),
        ("utun", NetworkType::Vpn),
        ("wlan", NetworkType::Wifi),
        ("wl", NetworkType::Wifi),
        ("rmnet", NetworkType::Mobile),
        ("ccmni", NetworkType::Mobile),
        ("wwan", NetworkType::Mobile),
        ("eth", NetworkType::Ethernet),
        ("en", NetworkType::Ethernet),
        ("bnep", NetworkType::Bluetooth),
        ("bt-pan", NetworkType::Bluetooth),
        ("docker", NetworkType::Unknown),
    ];

    PREFIXES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .and_then(|(_, kind)| (*kind != NetworkType::Unknown).then_some(*kind))
}

/// Assemble a snapshot from interface counters and the outbound address
pub fn build_snapshot(
    interfaces: &[InterfaceCounters],
    local_address: Option<IpAddr>,
    proxy: Option<String>,
) -> NetworkSnapshot {
    let typed: Vec<(&InterfaceCounters, NetworkType)> = interfaces
        .iter()
        .filter(|i| i.active())
        .filter_map(|i| classify_interface(&i.name).map(|kind| (i, kind)))
        .collect();

    let vpn_transport = typed.iter().any(|(_, kind)| *kind == NetworkType::Vpn);
    let physical = [
        NetworkType::Ethernet,
        NetworkType::Wifi,
        NetworkType::Mobile,
        NetworkType::Bluetooth,
    ]
    .into_iter()
    .find(|wanted| typed.iter().any(|(_, kind)| kind == wanted));

    let connected = local_address.is_some();
    let network_type = match (connected, vpn_transport, physical) {
        (false, _, _) => NetworkType::Disconnected,
        (true, true, _) => NetworkType::Vpn,
        (true, false, Some(kind)) => kind,
        (true, false, None) => NetworkType::Unknown,
    };

    let counted = interfaces.iter().filter(|i| i.name != "lo");
    let mobile: Vec<&InterfaceCounters> = typed
        .iter()
        .filter(|(_, kind)| *kind == NetworkType::Mobile)
        .map(|(i, _)| *i)
        .collect();
    let traffic = (!interfaces.is_empty()).then(|| TrafficCounters {
        rx_bytes: counted.clone().map(|i| i.rx_bytes).sum(),
        tx_bytes: counted.map(|i| i.tx_bytes).sum(),
        mobile_rx_bytes: (!mobile.is_empty()).then(|| mobile.iter().map(|i| i.rx_bytes).sum()),
        mobile_tx_bytes: (!mobile.is_empty()).then(|| mobile.iter().map(|i| i.tx_bytes).sum()),
    });

    NetworkSnapshot {
        network_type,
        connected,
        subtype: physical.filter(|_| vpn_transport).map(|kind| format!("over {}", kind.display_name())),
        vpn_transport,
        capabilities: NetworkCapabilities {
            internet: connected,
            validated: false,
            metered: physical == Some(NetworkType::Mobile),
            roaming: false,
        },
        ip_addresses: local_address.into_iter().collect(),
        traffic,
        provider_name: None,
        wifi_ssid: None,
        proxy,
    }
}

/// Source address the kernel would pick for outbound traffic.
/// Connecting a UDP socket only selects a route; nothing is sent.
fn outbound_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:53").ok()?;
    let address = socket.local_addr().ok()?.ip();
    (!address.is_unspecified()).then_some(address)
}

/// First non-empty proxy variable, lower case taking precedence
pub fn proxy_from<F: Fn(&str) -> Option<String>>(lookup: F) -> Option<String> {
    ["http_proxy", "HTTP_PROXY", "https_proxy", "HTTPS_PROXY"]
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
