//! Deploy / list / destroy against a mock host

use std::sync::Mutex;

use async_trait::async_trait;
use serde_yaml::Value;

use dockssh::deploy::lifecycle::{Lifecycle, LifecycleOptions};
use dockssh::errors::DeployError;
use dockssh::http::launch::{LaunchResponse, Launcher};
use dockssh::models::deployment::{DeployRequest, Mode};
use dockssh::models::host::Host;
use dockssh::remote::mock::{Call, MockSession};

const IMAGE: &str = "org/experiment:latest";

#[derive(Default)]
struct RecordingLauncher {
    calls: Mutex<Vec<(String, bool)>>,
    fail: bool,
}

#[async_trait]
impl Launcher for RecordingLauncher {
    async fn launch(&self, url: &str, verify_tls: bool) -> Result<LaunchResponse, DeployError> {
        self.calls.lock().unwrap().push((url.to_string(), verify_tls));
        if self.fail {
            return Err(DeployError::LaunchRetryExhausted {
                url: url.to_string(),
                attempts: 10,
                last_error: "status 502 Bad Gateway".to_string(),
            });
        }
        Ok(LaunchResponse {
            recruitment_msg: "Recruitment started".to_string(),
        })
    }
}

fn local_host() -> MockSession {
    MockSession::new(Host::new("local", "localhost", None))
}

fn request() -> DeployRequest {
    DeployRequest {
        image: IMAGE.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_deploy_to_local_host() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());

    let report = lifecycle.deploy(&request()).await.unwrap();
    let id = report.deployment.id.clone();

    assert!(id.starts_with("dlgr-"));
    assert_eq!(id.len(), 13);
    assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(report.deployment.public_hostname, "127.0.0.1.nip.io");

    let fragment = session
        .file_string(&format!("dallinger/caddy.d/{}", id))
        .expect("routing fragment installed");
    assert!(fragment.contains(&format!("{}.127.0.0.1.nip.io", id)));
    assert!(fragment.contains(&format!("reverse_proxy {}_web:5000", id)));

    // Local targets are launched over plain HTTP without certificate checks
    let calls = launcher.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![(format!("http://{}.127.0.0.1.nip.io/launch", id), false)]
    );
    assert_eq!(report.recruitment_msg, "Recruitment started");
    assert_eq!(report.admin_user, "admin");
    assert_eq!(
        report.dashboard_url,
        format!("http://{}.127.0.0.1.nip.io/dashboard", id)
    );
    assert_eq!(
        report.log_command,
        format!(
            "ssh localhost docker-compose -f '~/dallinger/{}/docker-compose.yml' logs -f",
            id
        )
    );

    let manifest = session
        .file_string(&format!("dallinger/{}/docker-compose.yml", id))
        .expect("deployment manifest installed");
    let manifest: Value = serde_yaml::from_str(&manifest).unwrap();
    let env = &manifest["services"]["web"]["environment"];
    assert_eq!(env["mode"], "sandbox");
    assert_eq!(env["ADMIN_USER"], "admin");
    assert!(env["FLASK_SECRET_KEY"].is_string());
    assert_eq!(manifest["services"]["web"]["image"], IMAGE);
}

#[tokio::test]
async fn test_deploy_step_order() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());
    let id = lifecycle.deploy(&request()).await.unwrap().deployment.id;

    let run = |command: String| {
        session
            .position(|call| *call == Call::Run(command.clone()))
            .unwrap_or_else(|| panic!("missing command: {}", command))
    };
    let put = |path: String| {
        session
            .position(|call| *call == Call::Put(path.clone()))
            .unwrap_or_else(|| panic!("missing transfer: {}", path))
    };

    let base_up = run("docker-compose -f 'dallinger/docker-compose.yml' up -d".to_string());
    let stack_up = run(format!(
        "docker-compose -p '{id}' -f 'dallinger/{id}/docker-compose.yml' up -d"
    ));
    let init = run(format!(
        "docker-compose -p '{id}' -f 'dallinger/{id}/docker-compose.yml' exec -T web dallinger-housekeeper initdb"
    ));
    let fragment = put(format!("dallinger/caddy.d/{id}"));
    let reload = run(
        "docker-compose -f 'dallinger/docker-compose.yml' exec -T httpserver caddy reload -config /etc/caddy/Caddyfile"
            .to_string(),
    );

    assert!(put("dallinger/docker-compose.yml".to_string()) < base_up);
    assert!(put("dallinger/Caddyfile".to_string()) < base_up);
    assert!(base_up < stack_up);
    assert!(put(format!("dallinger/{id}/docker-compose.yml")) < stack_up);
    assert!(stack_up < init);
    assert!(init < fragment);
    assert!(fragment < reload);
}

#[tokio::test]
async fn test_deploy_with_overrides_and_live_mode() {
    let session = MockSession::new(Host::new("lab", "203.0.113.7", Some("ubuntu".into())));
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());

    let report = lifecycle
        .deploy(&DeployRequest {
            image: IMAGE.to_string(),
            dns_host: Some("experiments.example.org".to_string()),
            mode: Mode::Live,
            user_config: vec![
                ("title".to_string(), "from file".into()),
                ("host".to_string(), "0.0.0.0".into()),
            ],
            overrides: vec![("title".to_string(), "from flag".to_string())],
        })
        .await
        .unwrap();
    let id = &report.deployment.id;

    let calls = launcher.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![(format!("https://{}.experiments.example.org/launch", id), true)]
    );
    assert!(report.log_command.starts_with("ssh ubuntu@203.0.113.7 "));

    let fragment = session
        .file_string(&format!("dallinger/caddy.d/{}", id))
        .unwrap();
    assert!(fragment.starts_with(&format!("{}.experiments.example.org {{", id)));

    let manifest: Value = serde_yaml::from_str(
        &session
            .file_string(&format!("dallinger/{}/docker-compose.yml", id))
            .unwrap(),
    )
    .unwrap();
    let env = &manifest["services"]["web"]["environment"];
    assert_eq!(env["title"], "from flag");
    assert_eq!(env["mode"], "live");
    assert!(env.get("host").is_none());
}

#[tokio::test]
async fn test_log_command_carries_ssh_flags() {
    let session = MockSession::new(Host::new("lab", "203.0.113.7", Some("ubuntu".into())));
    let launcher = RecordingLauncher::default();
    let options = LifecycleOptions {
        ssh_port: Some(2222),
        ssh_identity_file: Some("/home/op/.ssh/lab key".into()),
        ..Default::default()
    };
    let lifecycle = Lifecycle::new(&session, &launcher, options);

    let report = lifecycle.deploy(&request()).await.unwrap();
    assert_eq!(
        report.log_command,
        format!(
            "ssh -p 2222 -i '/home/op/.ssh/lab key' ubuntu@203.0.113.7 docker-compose -f '~/dallinger/{}/docker-compose.yml' logs -f",
            report.deployment.id
        )
    );
}

#[tokio::test]
async fn test_list_after_deploy() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());

    assert!(lifecycle.list().await.unwrap().is_empty());

    let id = lifecycle.deploy(&request()).await.unwrap().deployment.id;
    let first = lifecycle.list().await.unwrap();
    let second = lifecycle.list().await.unwrap();
    assert_eq!(first, vec![id]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_destroy_unknown_id_changes_nothing() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());
    lifecycle.deploy(&request()).await.unwrap();

    let files_before = session.files();
    session.clear_calls();

    let err = lifecycle.destroy("dlgr-deadbeef").await.unwrap_err();
    assert!(matches!(err, DeployError::NotFound(_)));
    assert_eq!(session.files(), files_before);
    assert_eq!(
        session.commands(),
        vec!["test -f 'dallinger/caddy.d/dlgr-deadbeef'"]
    );
}

#[tokio::test]
async fn test_destroy_rejects_unsafe_ids() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());

    for id in ["../../etc", "dlgr-1; rm -rf ~", ""] {
        let err = lifecycle.destroy(id).await.unwrap_err();
        assert!(matches!(err, DeployError::NotFound(_)), "{id}: {err}");
        assert!(err.to_string().contains("not found"));
    }
    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn test_destroy_unroutes_before_teardown() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());
    let id = lifecycle.deploy(&request()).await.unwrap().deployment.id;
    session.clear_calls();

    lifecycle.destroy(&id).await.unwrap();

    let commands = session.commands();
    let remove = commands
        .iter()
        .position(|c| *c == format!("rm -f 'dallinger/caddy.d/{}'", id))
        .unwrap();
    let reload = commands
        .iter()
        .position(|c| c.contains("caddy reload"))
        .unwrap();
    let down = commands.iter().position(|c| c.ends_with(" down")).unwrap();
    let cleanup = commands
        .iter()
        .position(|c| *c == format!("rm -rf 'dallinger/{}'", id))
        .unwrap();
    assert!(remove < reload);
    assert!(reload < down);
    assert!(down < cleanup);

    assert!(lifecycle.list().await.unwrap().is_empty());
    assert!(session
        .file(&format!("dallinger/{}/docker-compose.yml", id))
        .is_none());
}

#[tokio::test]
async fn test_destroy_tolerates_failed_teardown() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());
    let id = lifecycle.deploy(&request()).await.unwrap().deployment.id;

    session.fail_on(
        &format!("docker-compose -p '{id}' -f 'dallinger/{id}/docker-compose.yml' down"),
        1,
        "no such project",
    );
    lifecycle.destroy(&id).await.unwrap();
    assert!(lifecycle.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_render_error_before_any_remote_call() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let options = LifecycleOptions {
        template: "services:\n  web:\n    image: \"{{tag}}\"\n    environment: {}\n".to_string(),
        ..Default::default()
    };
    let lifecycle = Lifecycle::new(&session, &launcher, options);

    let err = lifecycle.deploy(&request()).await.unwrap_err();
    assert!(matches!(err, DeployError::Render(_)));
    assert!(err.is_pre_flight());
    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn test_stack_failure_leaves_no_route() {
    let session = local_host();
    let launcher = RecordingLauncher::default();
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());
    session.fail_on("docker-compose -p", 1, "pull access denied");

    let err = lifecycle.deploy(&request()).await.unwrap_err();
    match err {
        DeployError::Command { status, stderr, .. } => {
            assert_eq!(status, 1);
            assert_eq!(stderr, "pull access denied");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(lifecycle.list().await.unwrap().is_empty());
    assert!(launcher.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_launch_failure_leaves_deployment_running() {
    let session = local_host();
    let launcher = RecordingLauncher {
        fail: true,
        ..Default::default()
    };
    let lifecycle = Lifecycle::new(&session, &launcher, LifecycleOptions::default());

    let err = lifecycle.deploy(&request()).await.unwrap_err();
    assert!(matches!(err, DeployError::LaunchRetryExhausted { .. }));

    let deployed = lifecycle.list().await.unwrap();
    assert_eq!(deployed.len(), 1);
    assert!(!session.commands().iter().any(|c| c.ends_with(" down")));
}
