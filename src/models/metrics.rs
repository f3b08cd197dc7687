//! Aggregated measurement models

use crate::types::{Severity, SpeedConfidence};
use serde::{Deserialize, Serialize};

/// Loss and latency figures for one ping train
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingStatistics {
    pub total_packets: u32,
    pub lost_packets: u32,
    /// Always within 0..=100
    pub loss_percent: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    /// Population standard deviation of successful latencies
    pub jitter_ms: f64,
}

impl PingStatistics {
    /// Aggregate samples where `None` marks a lost sample.
    ///
    /// Latency figures come from the successful subset only and are zero when
    /// nothing answered. An empty train reports 100% loss.
    pub fn from_samples(samples: &[Option<f64>]) -> Self {
        let total = samples.len() as u32;
        let latencies: Vec<f64> = samples.iter().filter_map(|s| *s).collect();
        let lost = total - latencies.len() as u32;

        let loss_percent = if total == 0 {
            100.0
        } else {
            100.0 * f64::from(lost) / f64::from(total)
        };

        if latencies.is_empty() {
            return Self {
                total_packets: total,
                lost_packets: lost,
                loss_percent,
                avg_ms: 0.0,
                max_ms: 0.0,
                jitter_ms: 0.0,
            };
        }

        let count = latencies.len() as f64;
        let avg = latencies.iter().sum::<f64>() / count;
        let max = latencies.iter().copied().fold(f64::MIN, f64::max);
        let variance = latencies.iter().map(|l| (l - avg).powi(2)).sum::<f64>() / count;

        Self {
            total_packets: total,
            lost_packets: lost,
            loss_percent,
            avg_ms: avg,
            max_ms: max,
            jitter_ms: variance.sqrt(),
        }
    }

    pub fn all_lost(&self) -> bool {
        self.lost_packets == self.total_packets
    }
}

/// Coarse bandwidth figure derived from one timed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedEstimate {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub confidence: SpeedConfidence,
}

impl SpeedEstimate {
    pub fn unavailable() -> Self {
        Self {
            download_mbps: 0.0,
            upload_mbps: 0.0,
            confidence: SpeedConfidence::Unavailable,
        }
    }
}

/// Blocking tally for one VPN protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolBlockingSummary {
    pub protocol: String,
    pub tested_count: u32,
    pub blocked_count: u32,
    pub blocked_percent: f64,
    pub severity: Severity,
    /// Pairs the run ended before reaching
    #[serde(default)]
    pub untested_count: u32,
}

impl ProtocolBlockingSummary {
    pub fn from_counts<S: Into<String>>(protocol: S, tested: u32, blocked: u32, untested: u32) -> Self {
        let blocked_percent = if tested == 0 {
            0.0
        } else {
            100.0 * f64::from(blocked) / f64::from(tested)
        };
        Self {
            protocol: protocol.into(),
            tested_count: tested,
            blocked_count: blocked,
            blocked_percent,
            severity: Severity::from_percent(blocked_percent),
            untested_count: untested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_samples() {
        let stats = PingStatistics::from_samples(&[Some(10.0), None, Some(30.0), Some(20.0)]);
        assert_eq!(stats.total_packets, 4);
        assert_eq!(stats.lost_packets, 1);
        assert_eq!(stats.loss_percent, 25.0);
        assert_eq!(stats.avg_ms, 20.0);
        assert_eq!(stats.max_ms, 30.0);
        assert!((stats.jitter_ms - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_all_lost() {
        let stats = PingStatistics::from_samples(&[None, None, None]);
        assert_eq!(stats.loss_percent, 100.0);
        assert_eq!(stats.avg_ms, 0.0);
        assert_eq!(stats.jitter_ms, 0.0);
        assert!(stats.all_lost());
    }

    #[test]
    fn test_empty_train() {
        let stats = PingStatistics::from_samples(&[]);
        assert_eq!(stats.total_packets, 0);
        assert_eq!(stats.loss_percent, 100.0);
    }

    #[test]
    fn test_eight_of_ten_is_heavy() {
        let summary = ProtocolBlockingSummary::from_counts("VLESS", 10, 8, 0);
        assert_eq!(summary.blocked_percent, 80.0);
        assert_eq!(summary.severity, Severity::HeavilyBlocked);
    }

    #[test]
    fn test_nothing_tested() {
        let summary = ProtocolBlockingSummary::from_counts("IPSEC", 0, 0, 14);
        assert_eq!(summary.blocked_percent, 0.0);
        assert_eq!(summary.severity, Severity::NotBlocked);
    }
}
