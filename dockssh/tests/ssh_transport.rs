//! ssh transport against a stand-in client program
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use dockssh::errors::DeployError;
use dockssh::models::host::Host;
use dockssh::remote::ssh::{SshOptions, SshSession};
use dockssh::remote::{FileTransfer, RemoteSession};

// Master and control requests succeed at once; client invocations run the
// command after `--` through a local shell
const FAKE_SSH: &str = r#"#!/bin/sh
while [ "$#" -gt 0 ]; do
    case "$1" in
        -M|-O) exit 0 ;;
        --) shift; exec /bin/sh -c "$1" ;;
    esac
    shift
done
exit 255
"#;

fn fake_ssh() -> &'static Path {
    static PROGRAM: OnceLock<PathBuf> = OnceLock::new();
    PROGRAM.get_or_init(|| {
        let path = Path::new(env!("CARGO_TARGET_TMPDIR")).join("dockssh-fake-ssh");
        std::fs::write(&path, FAKE_SSH).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    })
}

fn options(control_dir: &Path) -> SshOptions {
    SshOptions {
        program: fake_ssh().to_string_lossy().to_string(),
        control_dir: control_dir.to_path_buf(),
        ..Default::default()
    }
}

async fn connect(control_dir: &Path) -> SshSession {
    let host = Host::new("lab", "10.0.0.5", Some("ubuntu".into()));
    SshSession::connect(&host, options(control_dir)).await.unwrap()
}

#[tokio::test]
async fn test_run_buffers_output() {
    let dir = tempfile::tempdir().unwrap();
    let session = connect(dir.path()).await;

    let output = session
        .run("printf out; printf err >&2", true)
        .await
        .unwrap();
    assert!(output.success());
    assert_eq!(output.stdout, "out");
    assert_eq!(output.stderr, "err");
}

#[tokio::test]
async fn test_must_succeed_raises_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let session = connect(dir.path()).await;

    let err = session
        .run("echo partial; echo boom >&2; exit 3", true)
        .await
        .unwrap_err();
    match err {
        DeployError::Command {
            command,
            status,
            stdout,
            stderr,
        } => {
            assert!(command.ends_with("exit 3"));
            assert_eq!(status, 3);
            assert_eq!(stdout, "partial\n");
            assert_eq!(stderr, "boom\n");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_tolerant_run_returns_status() {
    let dir = tempfile::tempdir().unwrap();
    let session = connect(dir.path()).await;

    let output = session.run("echo boom >&2; exit 3", false).await.unwrap();
    assert_eq!(output.status, 3);
    assert_eq!(output.stderr, "boom\n");
    assert!(!session.probe("exit 1").await);
    assert!(session.probe("true").await);
}

#[tokio::test]
async fn test_put_writes_exact_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let session = connect(dir.path()).await;
    let target = dir.path().join("it's a file.txt");
    let remote_path = target.to_string_lossy().to_string();

    let content = b"say \"hi\" to C:\\temp\\new, it's $HOME\n\x00\xff tail".to_vec();
    session.put(&content, &remote_path).await.unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), content);

    // Overwritten in place, no leftovers from the longer file
    session.put(b"short", &remote_path).await.unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"short");
}

#[tokio::test]
async fn test_put_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let session = connect(dir.path()).await;
    let remote_path = dir
        .path()
        .join("missing")
        .join("docker-compose.yml")
        .to_string_lossy()
        .to_string();

    let err = session.put(b"services: {}\n", &remote_path).await.unwrap_err();
    match err {
        DeployError::Transfer { path, .. } => assert_eq!(path, remote_path),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_reconnect_keeps_session_usable() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = connect(dir.path()).await;

    session.reconnect().await.unwrap();
    let output = session.run("echo again", true).await.unwrap();
    assert_eq!(output.stdout, "again\n");
}

#[tokio::test]
async fn test_missing_client_is_a_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let options = SshOptions {
        program: dir.path().join("no-such-ssh").to_string_lossy().to_string(),
        control_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let err = SshSession::connect(&Host::new("lab", "10.0.0.5", None), options)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Connection { .. }));
}
