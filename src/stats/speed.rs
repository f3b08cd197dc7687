//! Coarse bandwidth estimate from one timed GET
//!
//! A response large enough to time gives a measured figure. Anything smaller
//! only tells us the round trip, which is bucketed into a rough class and
//! labelled low confidence.

use crate::{
    models::{HttpOutcome, HttpProbeRequest, SpeedEstimate},
    probe::Prober,
    types::{HttpMethod, SpeedConfidence},
};
use std::time::Duration;

/// Smallest body treated as a real transfer
pub const MEASURED_BODY_MIN_BYTES: usize = 256 * 1024;

/// Round-trip buckets: (upper bound in ms, download Mbps)
const LATENCY_BUCKETS: [(f64, f64); 2] = [(500.0, 25.0), (1500.0, 12.5)];
const SLOWEST_BUCKET_MBPS: f64 = 3.0;

/// Upload is not measured; it is reported as this fraction of download
const UPLOAD_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedEstimator;

impl SpeedEstimator {
    pub fn new() -> Self {
        Self
    }

    pub async fn estimate(&self, prober: &dyn Prober, url: &str, timeout: Duration) -> SpeedEstimate {
        let request = HttpProbeRequest::new(url, HttpMethod::Get, timeout).header("Cache-Control", "no-cache");
        let outcome = prober.http_probe(&request).await;
        Self::from_outcome(&outcome)
    }

    /// Turn one timed response into an estimate; only a 2xx answer is timed
    pub fn from_outcome(outcome: &HttpOutcome) -> SpeedEstimate {
        let successful_status = outcome.status_code.is_some_and(|status| (200..300).contains(&status));
        let latency_ms = match outcome.outcome.latency_ms {
            Some(ms) if outcome.outcome.succeeded && successful_status => ms,
            _ => return SpeedEstimate::unavailable(),
        };

        if outcome.body_bytes >= MEASURED_BODY_MIN_BYTES && latency_ms > 0.0 {
            let megabits = outcome.body_bytes as f64 * 8.0 / 1_000_000.0;
            let download = megabits / (latency_ms / 1000.0);
            return with_upload(download, SpeedConfidence::Medium);
        }

        let download = LATENCY_BUCKETS
            .iter()
            .find(|(bound, _)| latency_ms < *bound)
            .map(|(_, mbps)| *mbps)
            .unwrap_or(SLOWEST_BUCKET_MBPS);
        with_upload(download, SpeedConfidence::Low)
    }
}

fn with_upload(download_mbps: f64, confidence: SpeedConfidence) -> SpeedEstimate {
    SpeedEstimate {
        download_mbps,
        upload_mbps: download_mbps * UPLOAD_RATIO,
        confidence,
    }
}
