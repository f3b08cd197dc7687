//! Comprehensive tests for ping aggregation and blocking tallies
//!
//! Property-based tests over arbitrary sample trains plus edge cases the
//! unit tests next to the models do not cover.

use crate::{
    models::{PingStatistics, ProtocolBlockingSummary},
    types::Severity,
};
use proptest::collection::vec;
use proptest::prelude::*;

/// Property-based test generators
mod generators {
    use super::*;

    /// One sample: lost, or answered within a plausible latency range
    pub fn sample() -> impl Strategy<Value = Option<f64>> {
        prop_oneof![
            1 => Just(None),
            3 => (0.1f64..5000.0).prop_map(Some),
        ]
    }

    /// Trains as long as the configuration allows
    pub fn train() -> impl Strategy<Value = Vec<Option<f64>>> {
        vec(sample(), 1..=50)
    }

    /// (tested, blocked) with blocked never above tested
    pub fn tallies() -> impl Strategy<Value = (u32, u32)> {
        (0u32..200).prop_flat_map(|tested| (Just(tested), 0..=tested))
    }
}

mod property_tests {
    use super::*;

    proptest! {
        /// Loss is a percentage and matches the lost count exactly
        #[test]
        fn loss_percent_in_range(samples in generators::train()) {
            let stats = PingStatistics::from_samples(&samples);
            prop_assert!(stats.loss_percent >= 0.0);
            prop_assert!(stats.loss_percent <= 100.0);

            let lost = samples.iter().filter(|s| s.is_none()).count() as u32;
            prop_assert_eq!(stats.lost_packets, lost);
            prop_assert_eq!(stats.total_packets, samples.len() as u32);
        }

        /// Full loss exactly when nothing answered
        #[test]
        fn full_loss_iff_all_failed(samples in generators::train()) {
            let stats = PingStatistics::from_samples(&samples);
            let all_failed = samples.iter().all(Option::is_none);
            prop_assert_eq!(stats.loss_percent == 100.0, all_failed);
            prop_assert_eq!(stats.all_lost(), all_failed);
        }

        #[test]
        fn jitter_non_negative(samples in generators::train()) {
            let stats = PingStatistics::from_samples(&samples);
            prop_assert!(stats.jitter_ms >= 0.0);
            prop_assert!(stats.jitter_ms.is_finite());
        }

        /// Average sits between the fastest and slowest answered sample
        #[test]
        fn average_between_min_and_max(samples in generators::train()) {
            let stats = PingStatistics::from_samples(&samples);
            let answered: Vec<f64> = samples.iter().filter_map(|s| *s).collect();

            if answered.is_empty() {
                prop_assert_eq!(stats.avg_ms, 0.0);
                prop_assert_eq!(stats.max_ms, 0.0);
            } else {
                let min = answered.iter().copied().fold(f64::INFINITY, f64::min);
                prop_assert!(stats.avg_ms >= min - 1e-9);
                prop_assert!(stats.avg_ms <= stats.max_ms + 1e-9);
            }
        }

        /// Lost samples never move the latency figures
        #[test]
        fn lost_samples_do_not_change_latency(samples in generators::train(), extra in 0usize..10) {
            let base = PingStatistics::from_samples(&samples);
            let mut padded = samples.clone();
            padded.extend(std::iter::repeat(None).take(extra));
            let padded = PingStatistics::from_samples(&padded);

            prop_assert_eq!(base.avg_ms, padded.avg_ms);
            prop_assert_eq!(base.max_ms, padded.max_ms);
            prop_assert_eq!(base.jitter_ms, padded.jitter_ms);
        }

        /// Severity is always the bucket of the computed percentage
        #[test]
        fn severity_follows_percent((tested, blocked) in generators::tallies()) {
            let summary = ProtocolBlockingSummary::from_counts("VLESS", tested, blocked, 0);
            prop_assert!(summary.blocked_percent >= 0.0 && summary.blocked_percent <= 100.0);
            prop_assert_eq!(summary.severity, Severity::from_percent(summary.blocked_percent));
            prop_assert_eq!(summary.severity == Severity::NotBlocked, blocked == 0);
        }
    }
}

/// Test edge cases and boundary conditions
mod edge_case_tests {
    use super::*;

    #[test]
    fn test_single_sample() {
        let stats = PingStatistics::from_samples(&[Some(42.0)]);
        assert_eq!(stats.avg_ms, 42.0);
        assert_eq!(stats.max_ms, 42.0);
        assert_eq!(stats.jitter_ms, 0.0);
        assert_eq!(stats.loss_percent, 0.0);
    }

    #[test]
    fn test_identical_samples_have_no_jitter() {
        let stats = PingStatistics::from_samples(&[Some(25.0); 10]);
        assert_eq!(stats.jitter_ms, 0.0);
        assert_eq!(stats.avg_ms, 25.0);
    }

    #[test]
    fn test_one_survivor_in_long_train() {
        let mut samples = vec![None; 49];
        samples.push(Some(300.0));
        let stats = PingStatistics::from_samples(&samples);
        assert_eq!(stats.loss_percent, 98.0);
        assert_eq!(stats.avg_ms, 300.0);
        assert!(!stats.all_lost());
    }

    #[test]
    fn test_severity_boundaries_through_counts() {
        let cases = [
            (10, 0, Severity::NotBlocked),
            (10, 1, Severity::SomeBlocking),
            (10, 3, Severity::SomeBlocking),
            (10, 4, Severity::PartiallyBlocked),
            (10, 7, Severity::PartiallyBlocked),
            (10, 8, Severity::HeavilyBlocked),
            (0, 0, Severity::NotBlocked),
        ];
        for (tested, blocked, expected) in cases {
            let summary = ProtocolBlockingSummary::from_counts("X", tested, blocked, 0);
            assert_eq!(summary.severity, expected, "{}/{}", blocked, tested);
        }
    }

    #[test]
    fn test_untested_pairs_do_not_dilute_percentage() {
        let summary = ProtocolBlockingSummary::from_counts("WIREGUARD", 2, 1, 5);
        assert_eq!(summary.blocked_percent, 50.0);
        assert_eq!(summary.untested_count, 5);
    }
}
