//! Unit tests for configuration parsing, overrides and validation.

use std::time::Duration;

use cm_controller::config::{GlobalConfig, RuntimeKind};

#[test]
fn empty_file_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config parses");
    assert_eq!(config.http_port, 8787);
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.ports.base, 7877);
    assert_eq!(config.ports.scan_limit, 1000);
    assert_eq!(config.daemon.internal_port, 7878);
    assert_eq!(config.daemon.mount_target, "/opt/controller");
    assert_eq!(config.heartbeat.interval_seconds, 3);
    assert_eq!(config.runtime.kind, RuntimeKind::Cli);
    assert_eq!(config.daemon.status_read_timeout(), Duration::from_millis(1000));
}

#[test]
fn defaults_grant_checkpoint_capabilities() {
    let config = GlobalConfig::default();
    assert!(config
        .daemon
        .required_caps
        .iter()
        .any(|c| c == "cap_checkpoint_restore"));
    assert!(config
        .daemon
        .security_opts
        .iter()
        .any(|o| o == "apparmor=unconfined"));
}

#[test]
fn empty_config_fails_validation() {
    let config = GlobalConfig::from_toml_str("").expect("parses");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("worker_id"));
}

#[test]
fn overrides_fill_identity_and_normalise_manager() {
    let mut config = GlobalConfig::from_toml_str("http_port = 9000").expect("parses");
    config.apply_overrides(Some("w-1".into()), Some("10.0.0.5:8080".into()), None);

    assert_eq!(config.worker_id, "w-1");
    assert_eq!(config.manager_url, "http://10.0.0.5:8080/cm_manager/v1.0");
    assert_eq!(
        config.heartbeat_url(),
        "http://10.0.0.5:8080/cm_manager/v1.0/heartbeat"
    );
    assert_eq!(config.http_port, 9000);
    config.validate().expect("valid after overrides");
}

#[test]
fn port_override_wins_over_file() {
    let mut config = GlobalConfig::from_toml_str("http_port = 9000").expect("parses");
    config.apply_overrides(None, None, Some(9100));
    assert_eq!(config.http_port, 9100);
}

#[test]
fn full_file_round_trips_all_sections() {
    let raw = r#"
worker_id = "worker-7"
manager_url = "http://manager:8080/cm_manager/v1.0/"
services_dir = "/var/lib/cm/services"

[ports]
base = 20000
scan_limit = 50

[daemon]
command = "ff_daemon --verbose"
request_timeout_seconds = 30

[heartbeat]
interval_seconds = 10

[runtime]
kind = "engine"
engine_url = "http://127.0.0.1:2376"
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("parses");
    config.validate().expect("valid");
    assert_eq!(config.manager_url, "http://manager:8080/cm_manager/v1.0");
    assert_eq!(config.ports.base, 20000);
    assert_eq!(config.daemon.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.runtime.kind, RuntimeKind::Engine);
    assert_eq!(config.heartbeat.interval_seconds, 10);
}

#[test]
fn zero_scan_limit_is_rejected() {
    let raw = r#"
worker_id = "w"
manager_url = "m:1"

[ports]
scan_limit = 0
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("parses");
    assert!(config.validate().is_err());
}

#[test]
fn zero_heartbeat_interval_is_rejected() {
    let raw = r#"
worker_id = "w"
manager_url = "m:1"

[heartbeat]
interval_seconds = 0
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("parses");
    assert!(config.validate().is_err());
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("http_port = \"not a number\"").unwrap_err();
    assert!(err.to_string().starts_with("config:"));
}

#[test]
fn load_from_missing_path_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("failed to read config"));
}
