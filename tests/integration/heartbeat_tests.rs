//! Integration tests for the heartbeat towards the fleet manager.

use std::time::Duration;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use cm_controller::config::normalize_manager_url;
use cm_controller::heartbeat::{heartbeat_client, send_heartbeat, spawn_heartbeat_task};

use super::test_helpers::spawn_fake_manager;

fn manager_url(port: u16) -> String {
    format!("{}/heartbeat", normalize_manager_url(&format!("127.0.0.1:{port}")))
}

#[tokio::test]
async fn heartbeat_posts_worker_id() {
    let manager = spawn_fake_manager(StatusCode::OK).await;
    let client = heartbeat_client(Duration::from_secs(1)).expect("client");

    send_heartbeat(&client, &manager_url(manager.port), "worker-7")
        .await
        .expect("heartbeat");

    let requests = manager.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "/cm_manager/v1.0/heartbeat");
    let body: serde_json::Value = serde_json::from_str(&requests[0].1).expect("json body");
    assert_eq!(body, serde_json::json!({ "worker_id": "worker-7" }));
}

#[tokio::test]
async fn non_success_reply_is_an_error() {
    let manager = spawn_fake_manager(StatusCode::SERVICE_UNAVAILABLE).await;
    let client = heartbeat_client(Duration::from_secs(1)).expect("client");

    let result = send_heartbeat(&client, &manager_url(manager.port), "w").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn task_keeps_beating_through_failures_and_stops_on_cancel() {
    let manager = spawn_fake_manager(StatusCode::INTERNAL_SERVER_ERROR).await;
    let ct = CancellationToken::new();

    let handle = spawn_heartbeat_task(
        heartbeat_client(Duration::from_secs(1)).expect("client"),
        manager_url(manager.port),
        "worker-7".into(),
        Duration::from_millis(50),
        ct.clone(),
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    ct.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("task stops after cancel")
        .expect("task does not panic");

    assert!(
        manager.requests().len() >= 3,
        "failed heartbeats must not stop the loop"
    );
}

#[tokio::test]
async fn unreachable_manager_does_not_stop_the_task() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let ct = CancellationToken::new();
    let handle = spawn_heartbeat_task(
        heartbeat_client(Duration::from_millis(200)).expect("client"),
        manager_url(port),
        "w".into(),
        Duration::from_millis(50),
        ct.clone(),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!handle.is_finished());
    ct.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("task stops after cancel")
        .expect("task does not panic");
}
