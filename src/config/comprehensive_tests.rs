//! Additional comprehensive tests for configuration parsing and validation

use super::{validate_config, ConfigParser};
use crate::{
    cli::Cli,
    defaults,
    models::{Catalog, Config},
};
use clap::Parser;
use proptest::prelude::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

/// Test edge cases in configuration parsing
mod config_edge_cases {
    use super::*;

    #[test]
    fn test_boundary_values_accepted() {
        let config = Config {
            ping_samples: 50,
            ping_interval_ms: 60_000,
            probe_timeout_ms: 1,
            concurrency: 16,
            run_budget_secs: 600,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_whitespace_ping_host_rejected() {
        let config = Config {
            ping_host: "   ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ipv6_ping_host_accepted() {
        let config = Config {
            ping_host: "2001:4860:4860::8888".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}

/// Environment lookups without touching the process environment
mod env_parsing_tests {
    use super::*;

    #[test]
    fn test_values_are_trimmed() {
        let mut config = Config::default();
        config
            .merge_from_lookup(lookup_from(&[("PING_SAMPLES", " 7 "), ("PING_HOST", " 1.1.1.1 ")]))
            .unwrap();
        assert_eq!(config.ping_samples, 7);
        assert_eq!(config.ping_host, "1.1.1.1");
    }

    #[test]
    fn test_empty_host_keeps_default() {
        let mut config = Config::default();
        config.merge_from_lookup(lookup_from(&[("PING_HOST", "")])).unwrap();
        assert_eq!(config.ping_host, defaults::DEFAULT_PING_HOST);
    }

    #[test]
    fn test_unparseable_value_names_the_variable() {
        let mut config = Config::default();
        let error = config
            .merge_from_lookup(lookup_from(&[("DNS_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(error.to_string().contains("DNS_TIMEOUT_MS"));
    }
}

/// CLI arguments layered over defaults
mod cli_parsing_tests {
    use super::*;

    #[test]
    fn test_cli_only_overrides() {
        let cli = Cli::parse_from(["netautopsy", "--count", "3", "--timeout-ms", "900", "--quick", "--json"]);
        let config = ConfigParser::new(cli).parse_cli_only().unwrap();

        assert_eq!(config.ping_samples, 3);
        assert_eq!(config.probe_timeout_ms, 900);
        assert!(config.force_quick);
        assert!(config.output_json);
        assert!(!config.enable_color);
    }

    #[test]
    fn test_cli_defaults_untouched() {
        let config = ConfigParser::new(Cli::parse_from(["netautopsy"]))
            .parse_cli_only()
            .unwrap();
        let defaults = Config::default();

        assert_eq!(config.ping_samples, defaults.ping_samples);
        assert_eq!(config.probe_timeout_ms, defaults.probe_timeout_ms);
        assert_eq!(config.ping_host, defaults.ping_host);
        assert!(config.enable_color);
        assert!(!config.force_quick);
    }
}

/// `.env` file inspection
mod env_file_tests {
    use super::super::EnvManager;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_env_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let result = EnvManager::check_env_file(&dir.path().join(".env")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_example_content_is_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, EnvManager::create_example_env_content()).unwrap();

        let warnings = EnvManager::check_env_file(&path).unwrap().unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
    }
}

/// Reduced profile selection
mod quick_profile_tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_quick_profile_values() {
        let profile = Config::default().profile(true);
        assert_eq!(profile.ping_samples, defaults::QUICK_PING_SAMPLES);
        assert_eq!(profile.probe_timeout, Duration::from_millis(defaults::QUICK_PROBE_TIMEOUT_MS));
        assert_eq!(profile.dns_timeout, Duration::from_millis(defaults::QUICK_DNS_TIMEOUT_MS));
    }

    #[test]
    fn test_quick_profile_keeps_tighter_user_values() {
        let config = Config {
            ping_samples: 2,
            probe_timeout_ms: 400,
            ..Config::default()
        };
        let profile = config.profile(true);
        assert_eq!(profile.ping_samples, 2);
        assert_eq!(profile.probe_timeout, Duration::from_millis(400));
    }
}

mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn test_in_range_configs_validate(
            samples in 1u32..=50,
            interval in 1u64..=60_000,
            timeout in 1u64..=60_000,
            concurrency in 1usize..=16,
            budget in 1u64..=600,
        ) {
            let config = Config {
                ping_samples: samples,
                ping_interval_ms: interval,
                probe_timeout_ms: timeout,
                concurrency,
                run_budget_secs: budget,
                ..Config::default()
            };
            prop_assert!(config.validate().is_ok());
            prop_assert!(validate_config(&config, &Catalog::default()).is_ok());
        }

        #[test]
        fn test_quick_profile_never_exceeds_full(
            samples in 1u32..=50,
            ping_timeout in 1u64..=60_000,
            probe_timeout in 1u64..=60_000,
            dns_timeout in 1u64..=60_000,
        ) {
            let config = Config {
                ping_samples: samples,
                ping_timeout_ms: ping_timeout,
                probe_timeout_ms: probe_timeout,
                dns_timeout_ms: dns_timeout,
                ..Config::default()
            };
            let full = config.profile(false);
            let quick = config.profile(true);

            prop_assert!(quick.ping_samples <= full.ping_samples);
            prop_assert!(quick.ping_timeout <= full.ping_timeout);
            prop_assert!(quick.probe_timeout <= full.probe_timeout);
            prop_assert!(quick.dns_timeout <= full.dns_timeout);
        }

        #[test]
        fn test_out_of_range_concurrency_rejected(concurrency in 17usize..1_000) {
            let config = Config { concurrency, ..Config::default() };
            prop_assert!(config.validate().is_err());
        }
    }
}
