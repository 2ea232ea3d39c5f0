//! Unit tests for the per-service directory layout.

use cm_controller::persistence::service_dir::{ServiceDirs, PORT_FILE, STATUS_PIPE};

fn dirs() -> (tempfile::TempDir, ServiceDirs) {
    let temp = tempfile::tempdir().expect("tempdir");
    let dirs = ServiceDirs::new(temp.path().join("services"));
    (temp, dirs)
}

#[tokio::test]
async fn create_root_is_idempotent() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("first create");
    dirs.create_root().await.expect("second create");
    assert!(dirs.root().is_dir());
}

#[tokio::test]
async fn ensure_creates_directory_and_fifo() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("root");

    let path = dirs.ensure("svc").await.expect("ensure");
    assert!(path.is_absolute());
    assert!(path.is_dir());

    let pipe = path.join(STATUS_PIPE);
    let meta = std::fs::symlink_metadata(&pipe).expect("pipe exists");
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        assert!(meta.file_type().is_fifo(), "status channel must be a FIFO");
    }
    #[cfg(not(unix))]
    let _ = meta;
}

#[tokio::test]
async fn ensure_twice_reuses_directory() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("root");

    let first = dirs.ensure("svc").await.expect("first");
    dirs.write_port("svc", 7900).await.expect("port");
    let second = dirs.ensure("svc").await.expect("second");

    assert_eq!(first, second);
    assert_eq!(dirs.read_port("svc").await.expect("read"), Some(7900));
}

#[tokio::test]
async fn port_file_is_plain_text() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("root");
    let path = dirs.ensure("svc").await.expect("ensure");
    dirs.write_port("svc", 7881).await.expect("write");

    let raw = std::fs::read_to_string(path.join(PORT_FILE)).expect("read file");
    assert_eq!(raw.trim(), "7881");
}

#[tokio::test]
async fn missing_port_file_reads_as_none() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("root");
    dirs.ensure("svc").await.expect("ensure");
    assert_eq!(dirs.read_port("svc").await.expect("read"), None);
}

#[tokio::test]
async fn garbage_port_file_is_an_error() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("root");
    let path = dirs.ensure("svc").await.expect("ensure");
    std::fs::write(path.join(PORT_FILE), "not-a-port").expect("write");
    assert!(dirs.read_port("svc").await.is_err());
}

#[tokio::test]
async fn remove_is_idempotent() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("root");
    let path = dirs.ensure("svc").await.expect("ensure");

    dirs.remove("svc").await.expect("first remove");
    assert!(!path.exists());
    dirs.remove("svc").await.expect("second remove");
}

#[tokio::test]
async fn list_names_returns_only_service_directories() {
    let (_temp, dirs) = dirs();
    dirs.create_root().await.expect("root");
    dirs.ensure("beta").await.expect("beta");
    dirs.ensure("alpha").await.expect("alpha");
    std::fs::write(dirs.root().join("stray.txt"), "x").expect("stray file");

    assert_eq!(
        dirs.list_names().await.expect("list"),
        vec!["alpha".to_owned(), "beta".to_owned()]
    );
}

#[tokio::test]
async fn traversal_names_never_touch_the_filesystem() {
    let (temp, dirs) = dirs();
    dirs.create_root().await.expect("root");

    for name in ["..", "../escape", "a/b", ""] {
        assert!(dirs.ensure(name).await.is_err(), "{name:?} must be rejected");
    }
    assert!(!temp.path().join("escape").exists());
}
