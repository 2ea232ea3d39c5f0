//! Unit tests for wire and domain models.

use cm_controller::models::request::{CheckpointRequest, MountSpec, StartRequest, SubscribeQuery};
use cm_controller::models::service::{Service, ServiceStatus};
use cm_controller::runtime::ContainerState;

#[test]
fn channel_bytes_map_to_fine_grained_statuses() {
    assert_eq!(ServiceStatus::from_channel_byte(b'0'), Some(ServiceStatus::Standby));
    assert_eq!(ServiceStatus::from_channel_byte(b'1'), Some(ServiceStatus::Running));
    assert_eq!(
        ServiceStatus::from_channel_byte(b'2'),
        Some(ServiceStatus::Checkpointed)
    );
    assert_eq!(ServiceStatus::from_channel_byte(b'3'), None);
    assert_eq!(ServiceStatus::from_channel_byte(0), None);
}

#[test]
fn coarse_states_are_recorded_verbatim() {
    assert_eq!(ServiceStatus::from(&ContainerState::Exited), ServiceStatus::Exited);
    assert_eq!(ServiceStatus::from(&ContainerState::Paused), ServiceStatus::Paused);
    assert_eq!(ServiceStatus::from(&ContainerState::Dead), ServiceStatus::Dead);
    assert_eq!(
        ServiceStatus::from(&ContainerState::Unknown("weird".into())),
        ServiceStatus::Error
    );
}

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&ServiceStatus::Checkpointed).expect("serialize");
    assert_eq!(json, "\"checkpointed\"");
    assert_eq!(ServiceStatus::Standby.to_string(), "standby");
}

#[test]
fn new_service_starts_in_new_state() {
    let service = Service::new("svc".into(), "abc123".into(), "img".into(), 7880);
    assert_eq!(service.status, ServiceStatus::New);
    assert_eq!(service.container_ref(), "abc123");

    let json = serde_json::to_value(&service).expect("serialize");
    assert_eq!(json["control_port"], 7880);
    assert_eq!(json["status"], "new");
}

#[test]
fn container_ref_falls_back_to_name() {
    let service = Service::new("svc".into(), String::new(), "img".into(), 7880);
    assert_eq!(service.container_ref(), "svc");
}

#[test]
fn start_request_accepts_runtime_style_mounts() {
    let raw = r#"{
        "container_name": "svc",
        "image": "redis:7",
        "app_ports": ["6379:6379"],
        "mounts": [{"Type": "bind", "Source": "/data", "Target": "/data", "ReadOnly": true}]
    }"#;
    let request: StartRequest = serde_json::from_str(raw).expect("parse");
    assert_eq!(request.mounts.len(), 1);
    assert!(request.mounts[0].read_only);
    assert!(request.envs.is_empty());
    assert!(request.caps.is_empty());
    assert_eq!(
        request.mounts[0].to_cli_arg(),
        "type=bind,source=/data,target=/data,readonly"
    );
}

#[test]
fn mount_accepts_lowercase_keys_and_defaults_to_bind() {
    let mount: MountSpec =
        serde_json::from_str(r#"{"source": "/a", "target": "/b"}"#).expect("parse");
    assert_eq!(mount, MountSpec::bind("/a", "/b"));
}

#[test]
fn leave_running_is_read_from_raw_body() {
    assert!(CheckpointRequest::leave_running_from(
        br#"{"leave_running": true, "num_shards": 4}"#
    ));
    assert!(!CheckpointRequest::leave_running_from(br#"{"image_url": "s3://b/k"}"#));
    assert!(!CheckpointRequest::leave_running_from(b"not json"));
    assert!(!CheckpointRequest::leave_running_from(b""));
}

#[test]
fn leave_running_ignores_daemon_field_types() {
    for body in [
        br#"{"leave_running": true, "cpu_budget": 0.5}"#.as_slice(),
        br#"{"leave_running": true, "preserved_paths": ["/data"]}"#.as_slice(),
        br#"{"leave_running": true, "verbose": 300}"#.as_slice(),
        br#"{"leave_running": true, "num_shards": -1, "envs": {"A": "1"}}"#.as_slice(),
    ] {
        assert!(
            CheckpointRequest::leave_running_from(body),
            "{}",
            String::from_utf8_lossy(body)
        );
    }
    assert!(!CheckpointRequest::leave_running_from(
        br#"{"leave_running": "yes"}"#
    ));
}

#[test]
fn subscribe_query_requires_port() {
    let query: SubscribeQuery =
        serde_json::from_str(r#"{"container_name": "svc", "daemon_port": 7881}"#).expect("parse");
    assert_eq!(query.daemon_port, 7881);
    assert!(query.container_id.is_empty());
    assert!(serde_json::from_str::<SubscribeQuery>(r#"{"container_name": "svc"}"#).is_err());
}
