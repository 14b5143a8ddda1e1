use chrono::Utc;
use sentinel::core::{Clock, FixedClock};

#[test]
fn reexported_clock_reports_the_fixed_instant() {
    let now = Utc::now();
    let clock = FixedClock(now);
    assert_eq!(clock.now(), now);
}

#[test]
fn reexported_adapter_registry_always_has_no_adapters_until_registered() {
    let registry = sentinel::adapters::AdapterRegistry::new();
    assert!(registry.names().is_empty());
}

#[test]
fn reexported_breaker_config_has_sane_defaults() {
    let config = sentinel::breaker::BreakerConfig::default();
    assert!(config.failure_threshold > 0);
}
