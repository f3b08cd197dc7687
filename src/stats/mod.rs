//! Statistics aggregator: sequential ping trains and the speed estimate
//!
//! The pure aggregation lives on [`PingStatistics::from_samples`]; this module
//! drives the probes that feed it.

pub mod speed;

#[cfg(test)]
mod comprehensive_tests;

pub use speed::SpeedEstimator;

use crate::{
    executor::RunBudget,
    models::{config::ProbeProfile, probe::duration_ms, PingStatistics},
    probe::Prober,
};
use std::time::Duration;

/// Fixed-size, evenly spaced train of reachability samples against one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingTrain {
    pub samples: u32,
    /// Pause between consecutive samples; never applied after the last one
    pub interval: Duration,
    pub sample_timeout: Duration,
}

impl PingTrain {
    pub fn new(samples: u32, interval: Duration, sample_timeout: Duration) -> Self {
        Self {
            samples,
            interval,
            sample_timeout,
        }
    }

    pub fn from_profile(profile: &ProbeProfile) -> Self {
        Self::new(profile.ping_samples, profile.ping_interval, profile.ping_timeout)
    }

    /// Upper bound on how long the train can take
    pub fn worst_case(&self) -> Duration {
        let gaps = self.samples.saturating_sub(1);
        self.sample_timeout * self.samples + self.interval * gaps
    }

    /// Run the train one sample at a time.
    ///
    /// Returns `None` when the budget ran out before any sample completed; a
    /// train cut short reports over the samples it did take.
    pub async fn run(&self, prober: &dyn Prober, host: &str, budget: &RunBudget) -> Option<PingStatistics> {
        let samples = self.collect(prober, host, budget).await;
        if samples.is_empty() {
            None
        } else {
            Some(PingStatistics::from_samples(&samples))
        }
    }

    /// Raw samples, `None` for each lost one
    pub async fn collect(&self, prober: &dyn Prober, host: &str, budget: &RunBudget) -> Vec<Option<f64>> {
        let limit_ms = duration_ms(self.sample_timeout);
        let mut samples = Vec::with_capacity(self.samples as usize);

        for index in 0..self.samples {
            if index > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = budget.expired() => break,
                }
            }
            if budget.is_exhausted() {
                break;
            }

            let outcome = prober.reachability_probe(host, budget.clamp(self.sample_timeout)).await;
            if !outcome.succeeded && budget.is_exhausted() {
                // Cut short by the run, not by the network
                break;
            }

            samples.push(match outcome.latency_ms {
                Some(ms) if outcome.succeeded && ms < limit_ms => Some(ms),
                _ => None,
            });
        }

        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CancelSignal;
    use crate::probe::scripted::{ScriptedProber, Step};
    use crate::types::FailureKind;

    fn train(samples: u32) -> PingTrain {
        PingTrain::new(samples, Duration::from_millis(200), Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_train() {
        let prober = ScriptedProber::healthy(10.0).reachability(
            "8.8.8.8",
            vec![Step::Answer(20.0), Step::Fail(FailureKind::Timeout), Step::Answer(40.0)],
        );

        let stats = train(3).run(&prober, "8.8.8.8", &RunBudget::unbounded()).await.unwrap();
        assert_eq!(stats.total_packets, 3);
        assert_eq!(stats.lost_packets, 1);
        assert!((stats.loss_percent - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.avg_ms, 30.0);
        assert_eq!(stats.max_ms, 40.0);
        assert_eq!(stats.jitter_ms, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_are_spaced_and_sequential() {
        let prober = ScriptedProber::healthy(10.0);
        let started = tokio::time::Instant::now();

        let stats = train(4).run(&prober, "example.org", &RunBudget::unbounded()).await.unwrap();

        assert_eq!(stats.total_packets, 4);
        // Three gaps, none after the last sample
        assert_eq!(started.elapsed(), Duration::from_millis(600));
        assert_eq!(prober.calls(), vec!["reach example.org"; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_lost_train() {
        let prober = ScriptedProber::silent();
        let stats = train(5).run(&prober, "10.1.2.3", &RunBudget::unbounded()).await.unwrap();
        assert_eq!(stats.loss_percent, 100.0);
        assert_eq!(stats.avg_ms, 0.0);
        assert_eq!(stats.jitter_ms, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_answer_counts_as_lost() {
        let prober = ScriptedProber::healthy(10.0).reachability("slow.example", vec![Step::Answer(1500.0)]);
        let stats = train(2).run(&prober, "slow.example", &RunBudget::unbounded()).await.unwrap();
        assert!(stats.all_lost());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_cuts_train_short() {
        let prober = ScriptedProber::healthy(10.0);
        let budget = RunBudget::new(Duration::from_millis(300), CancelSignal::never());

        let stats = train(5).run(&prober, "example.org", &budget).await.unwrap();
        assert_eq!(stats.total_packets, 2);
        assert_eq!(stats.loss_percent, 0.0);
    }

    #[tokio::test]
    async fn test_exhausted_budget_yields_nothing() {
        let (handle, signal) = crate::executor::CancelHandle::new();
        handle.cancel();
        let budget = RunBudget::new(Duration::from_secs(10), signal);

        let prober = ScriptedProber::healthy(10.0);
        assert!(train(3).run(&prober, "example.org", &budget).await.is_none());
        assert!(prober.calls().is_empty());
    }

    #[test]
    fn test_worst_case() {
        assert_eq!(train(10).worst_case(), Duration::from_millis(10 * 1000 + 9 * 200));
        assert_eq!(train(0).worst_case(), Duration::ZERO);
    }
}
