//! Integration tests for forwarding run/checkpoint commands to the daemon.

use axum::http::StatusCode;

use cm_controller::models::service::ServiceStatus;
use cm_controller::proxy::DaemonOperation;
use cm_controller::AppError;

use super::test_helpers::{spawn_fake_daemon, Harness};

#[tokio::test]
async fn run_forwards_body_and_marks_running() {
    let h = Harness::new().await;
    let daemon = spawn_fake_daemon(StatusCode::OK, "restored from s3://bucket/img").await;
    h.lifecycle
        .subscribe("svc", "id-svc", "img", daemon.port)
        .await
        .expect("subscribe");

    let body = br#"{"image_url":"s3://bucket/img"}"#.to_vec();
    let reply = h
        .proxy
        .dispatch(DaemonOperation::Run, "svc", body)
        .await
        .expect("dispatch");

    assert_eq!(reply, "restored from s3://bucket/img");
    assert_eq!(
        daemon.requests(),
        vec![("/run".to_owned(), r#"{"image_url":"s3://bucket/img"}"#.to_owned())]
    );
    assert_eq!(
        h.registry.get("svc").await.expect("get").status,
        ServiceStatus::Running
    );
}

#[tokio::test]
async fn checkpoint_without_leave_running_marks_checkpointed() {
    let h = Harness::new().await;
    let daemon = spawn_fake_daemon(StatusCode::OK, "ok").await;
    h.lifecycle
        .subscribe("svc", "id-svc", "img", daemon.port)
        .await
        .expect("subscribe");

    h.proxy
        .dispatch(
            DaemonOperation::Checkpoint,
            "svc",
            br#"{"leave_running": false, "num_shards": 4}"#.to_vec(),
        )
        .await
        .expect("dispatch");

    assert_eq!(daemon.requests()[0].0, "/checkpoint");
    assert_eq!(
        h.registry.get("svc").await.expect("get").status,
        ServiceStatus::Checkpointed
    );
}

#[tokio::test]
async fn checkpoint_with_leave_running_marks_running() {
    let h = Harness::new().await;
    let daemon = spawn_fake_daemon(StatusCode::OK, "ok").await;
    h.lifecycle
        .subscribe("svc", "id-svc", "img", daemon.port)
        .await
        .expect("subscribe");

    h.proxy
        .dispatch(
            DaemonOperation::Checkpoint,
            "svc",
            br#"{"leave_running": true, "cpu_budget": 0.5, "preserved_paths": ["/data"]}"#.to_vec(),
        )
        .await
        .expect("dispatch");

    assert_eq!(
        h.registry.get("svc").await.expect("get").status,
        ServiceStatus::Running
    );
    assert_eq!(
        daemon.requests()[0].1,
        r#"{"leave_running": true, "cpu_budget": 0.5, "preserved_paths": ["/data"]}"#
    );
}

#[tokio::test]
async fn unsubscribed_service_never_reaches_a_daemon() {
    let h = Harness::new().await;
    let daemon = spawn_fake_daemon(StatusCode::OK, "ok").await;

    let err = h
        .proxy
        .dispatch(DaemonOperation::Run, "ghost", b"{}".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(err.to_string().contains("not subscribed"));
    assert!(daemon.requests().is_empty());
}

#[tokio::test]
async fn daemon_rejection_passes_body_through_and_keeps_status() {
    let h = Harness::new().await;
    let daemon =
        spawn_fake_daemon(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"criu failed"}"#).await;
    h.lifecycle
        .subscribe("svc", "id-svc", "img", daemon.port)
        .await
        .expect("subscribe");

    let err = h
        .proxy
        .dispatch(DaemonOperation::Checkpoint, "svc", b"{}".to_vec())
        .await
        .unwrap_err();

    match err {
        AppError::DaemonRejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, r#"{"error":"criu failed"}"#);
        }
        other => panic!("expected DaemonRejected, got {other:?}"),
    }
    assert_eq!(
        h.registry.get("svc").await.expect("get").status,
        ServiceStatus::New
    );
}

#[tokio::test]
async fn unreachable_daemon_is_reported() {
    let h = Harness::new().await;
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    h.lifecycle
        .subscribe("svc", "id-svc", "img", port)
        .await
        .expect("subscribe");

    let err = h
        .proxy
        .dispatch(DaemonOperation::Run, "svc", b"{}".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DaemonUnreachable(_)));
    assert_eq!(
        h.registry.get("svc").await.expect("get").status,
        ServiceStatus::New
    );
}
