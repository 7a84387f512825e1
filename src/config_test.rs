use super::*;
use std::collections::HashMap;

fn config_from(pairs: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    RelayConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn empty_environment_uses_defaults() {
    let config = config_from(&[]).expect("defaults are valid");
    assert_eq!(config, RelayConfig::default());
    assert_eq!(config.bind.to_string(), "0.0.0.0:8080");
    assert_eq!(config.queue_capacity, 256);
    assert_eq!(config.close_grace, Duration::from_millis(1000));
}

#[test]
fn overrides_are_applied() {
    let config = config_from(&[
        ("BIND_ADDR", "127.0.0.1"),
        ("PORT", "9000"),
        ("STATIC_DIR", "/srv/relay"),
        ("OUTBOUND_QUEUE_CAPACITY", "32"),
        ("SESSION_CLOSE_GRACE_MS", "250"),
    ])
    .expect("valid overrides");

    assert_eq!(config.bind.to_string(), "127.0.0.1:9000");
    assert_eq!(config.static_dir, PathBuf::from("/srv/relay"));
    assert_eq!(config.queue_capacity, 32);
    assert_eq!(config.close_grace, Duration::from_millis(250));
}

#[test]
fn unparseable_values_fall_back() {
    let config = config_from(&[("PORT", "eighty"), ("OUTBOUND_QUEUE_CAPACITY", "-1"), ("BIND_ADDR", "localhost")])
        .expect("fallbacks are valid");
    assert_eq!(config.bind.port(), DEFAULT_PORT);
    assert_eq!(config.bind.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
}

#[test]
fn queue_capacity_below_registration_burst_is_rejected() {
    for raw in ["0", "1", "2"] {
        let got: usize = raw.parse().expect("numeric");
        assert_eq!(
            config_from(&[("OUTBOUND_QUEUE_CAPACITY", raw)]),
            Err(ConfigError::QueueCapacityTooSmall { got, min: MIN_QUEUE_CAPACITY })
        );
    }
}

#[test]
fn minimum_queue_capacity_is_accepted() {
    let config = config_from(&[("OUTBOUND_QUEUE_CAPACITY", "3")]).expect("minimum is valid");
    assert_eq!(config.queue_capacity, MIN_QUEUE_CAPACITY);
}

#[test]
fn empty_static_dir_uses_default() {
    let config = config_from(&[("STATIC_DIR", "")]).expect("valid");
    assert_eq!(config.static_dir, PathBuf::from(DEFAULT_STATIC_DIR));
}
