//! Integration tests for the engine API runtime adapter.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use cm_controller::runtime::engine::EngineApi;
use cm_controller::runtime::ContainerRuntime;
use cm_controller::AppError;

/// Serve one canned raw HTTP response, then close the connection.
async fn spawn_raw_engine(response: &'static [u8]) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0_u8; 4096];
        let _ = socket.read(&mut buf).await;
        socket.write_all(response).await.expect("write");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn error_reply_body_is_carried_in_the_error() {
    let url = spawn_raw_engine(
        b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 11\r\nconnection: close\r\n\r\nengine down",
    )
    .await;
    let engine = EngineApi::new(&url, Duration::from_secs(5)).expect("client");

    let err = engine.state("svc").await.unwrap_err();
    assert!(matches!(err, AppError::Runtime(_)));
    assert!(err.to_string().contains("engine down"), "{err}");
}

#[tokio::test]
async fn truncated_error_body_is_reported_not_dropped() {
    let url = spawn_raw_engine(
        b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 64\r\nconnection: close\r\n\r\npartial",
    )
    .await;
    let engine = EngineApi::new(&url, Duration::from_secs(5)).expect("client");

    let err = engine.state("svc").await.unwrap_err();
    assert!(matches!(err, AppError::Runtime(_)));
    assert!(err.to_string().contains("unreadable body"), "{err}");
}
