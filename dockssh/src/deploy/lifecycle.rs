//! Deployment lifecycle
//!
//! `deploy`, `list` and `destroy` against one host. All state of record lives
//! on the host: the routing fragment directory says what is deployed.
//!
//! Nothing is rolled back. A failure before the routing step leaves no public
//! route behind; a failure after it leaves a running, routed deployment that
//! `destroy` can remove.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::deploy::compose::StackManager;
use crate::deploy::config::{merge, ConfigSource, GeneratedSecrets, SourceKind};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::deploy::hostname::derive_public_hostname;
use crate::deploy::manifest::{self, DEPLOYMENT_TEMPLATE};
use crate::deploy::routing::{render_root_config, RoutingTable};
use crate::errors::DeployError;
use crate::http::launch::Launcher;
use crate::models::deployment::{DeployReport, DeployRequest, Deployment};
use crate::remote::{shell_quote, FileTransfer, RemoteSession};
use crate::storage::layout::RemoteLayout;
use crate::storage::settings::Settings;
use crate::utils::{is_valid_deployment_id, new_deployment_id};

/// Everything the lifecycle needs to know about the remote side
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub layout: RemoteLayout,
    pub stack: StackManager,
    pub init_command: String,
    pub web_port: u16,
    pub proxy_service: String,
    pub proxy_config_path: String,
    pub wildcard_dns_suffix: String,
    pub template: String,
    /// Client flags repeated in the printed log command
    pub ssh_port: Option<u16>,
    pub ssh_identity_file: Option<PathBuf>,
}

impl LifecycleOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let remote = &settings.remote;
        Self {
            layout: remote.layout(),
            stack: remote.stack_manager(),
            init_command: remote.init_command.clone(),
            web_port: remote.web_port,
            proxy_service: remote.proxy_service.clone(),
            proxy_config_path: remote.proxy_config_path.clone(),
            wildcard_dns_suffix: settings.wildcard_dns_suffix.clone(),
            template: DEPLOYMENT_TEMPLATE.to_string(),
            ssh_port: settings.ssh.port,
            ssh_identity_file: settings.ssh.identity_file.clone(),
        }
    }
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Deploy, list and destroy deployments on the session's host
pub struct Lifecycle<'a, S, L> {
    session: &'a S,
    launcher: &'a L,
    options: LifecycleOptions,
}

impl<'a, S, L> Lifecycle<'a, S, L>
where
    S: RemoteSession + FileTransfer,
    L: Launcher,
{
    pub fn new(session: &'a S, launcher: &'a L, options: LifecycleOptions) -> Self {
        Self {
            session,
            launcher,
            options,
        }
    }

    fn routing(&self) -> RoutingTable<'a, S> {
        RoutingTable::new(
            self.session,
            self.options.layout.clone(),
            self.options.stack.clone(),
            self.options.proxy_service.clone(),
            self.options.proxy_config_path.clone(),
            self.options.web_port,
        )
    }

    async fn mkdir(&self, dir: &str) -> Result<(), DeployError> {
        self.session
            .run(&format!("mkdir -p {}", shell_quote(dir)), true)
            .await?;
        Ok(())
    }

    /// Deploy `request.image` as a new deployment
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployReport, DeployError> {
        if request.image.trim().is_empty() {
            return Err(DeployError::ValidationError("image must not be empty".to_string()));
        }
        let host = self.session.host();

        // Pure work first so a bad template fails before touching the network
        let id = new_deployment_id();
        let secrets = GeneratedSecrets::new(request.mode);
        let config = merge(&[
            secrets.to_source(),
            ConfigSource::new(SourceKind::User, request.user_config.clone()),
            ConfigSource::overrides(&request.overrides),
        ]);
        let rendered = manifest::render(&self.options.template, &id, &request.image, &config)?;

        let public_hostname = match &request.dns_host {
            Some(dns_host) => dns_host.clone(),
            None => derive_public_hostname(&host.address, &self.options.wildcard_dns_suffix).await?,
        };
        let use_tls = !host.is_local();
        let scheme = if use_tls { "https" } else { "http" };

        let deployment = Deployment {
            id: id.clone(),
            host: host.name.clone(),
            public_hostname,
            image: request.image.clone(),
            config,
        };
        info!("Deploying {} as {} on {}", deployment.image, id, host.address);

        let mut fsm = DeploymentFsm::new();
        let launch_url = format!("{}://{}/launch", scheme, deployment.fqdn());
        let recruitment_msg = match self
            .provision_and_launch(&deployment, &rendered, use_tls, &launch_url, &mut fsm)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                // Failed is reachable from every state but Failed itself
                let _ = fsm.process(DeploymentEvent::Fail(e.to_string()));
                error!(
                    "Deployment {} failed after reaching {:?} (public route installed: {})",
                    id,
                    fsm.reached(),
                    fsm.is_routed()
                );
                return Err(e);
            }
        };

        let public_url = format!("{}://{}", scheme, deployment.fqdn());
        let log_command = self.log_command(&id);

        Ok(DeployReport {
            dashboard_url: format!("{}/dashboard", public_url),
            public_url,
            admin_user: secrets.admin_user.clone(),
            admin_password: secrets.admin_password,
            recruitment_msg,
            log_command,
            deployed_at: Utc::now(),
            deployment,
        })
    }

    /// Command the operator can paste to follow the deployment's logs
    fn log_command(&self, id: &str) -> String {
        let mut command = vec!["ssh".to_string()];
        if let Some(port) = self.options.ssh_port {
            command.push(format!("-p {}", port));
        }
        if let Some(identity) = &self.options.ssh_identity_file {
            command.push(format!("-i {}", shell_quote(&identity.to_string_lossy())));
        }
        command.push(self.session.host().ssh_target());
        command.push(self.options.stack.logs_follow(
            &format!("~/{}", self.options.layout.deployment_manifest(id)),
            None,
        ));
        command.join(" ")
    }

    async fn provision_and_launch(
        &self,
        deployment: &Deployment,
        rendered: &str,
        use_tls: bool,
        launch_url: &str,
        fsm: &mut DeploymentFsm,
    ) -> Result<String, DeployError> {
        let layout = &self.options.layout;
        let stack = &self.options.stack;
        let id = deployment.id.as_str();

        // Base infrastructure
        self.mkdir(&layout.fragments_dir()).await?;
        self.session
            .put(manifest::server_manifest(), &layout.server_manifest())
            .await?;
        let root_config = render_root_config(&deployment.public_hostname, use_tls);
        self.session
            .put(root_config.as_bytes(), &layout.proxy_config())
            .await?;
        self.session
            .run(&stack.up(&layout.server_manifest(), None), true)
            .await?;
        info!("Base infrastructure is running");

        // Deployment stack
        advance(fsm, DeploymentEvent::Provision)?;
        self.mkdir(&layout.deployment_dir(id)).await?;
        let deployment_manifest = layout.deployment_manifest(id);
        self.session
            .put(rendered.as_bytes(), &deployment_manifest)
            .await?;
        self.session
            .run(&stack.up(&deployment_manifest, Some(id)), true)
            .await?;
        info!("Deployment {} started, initializing database", id);
        self.session
            .run(
                &stack.exec(&deployment_manifest, Some(id), "web", &self.options.init_command),
                true,
            )
            .await?;

        // Public route
        let routing = self.routing();
        routing
            .install(id, &deployment.public_hostname, use_tls)
            .await?;
        routing.reload().await?;
        advance(fsm, DeploymentEvent::Route)?;
        info!("Routing {} to {}_web:{}", deployment.fqdn(), id, self.options.web_port);

        let response = self.launcher.launch(launch_url, use_tls).await?;
        advance(fsm, DeploymentEvent::Launch)?;
        Ok(response.recruitment_msg)
    }

    /// Ids of every deployment on the host
    pub async fn list(&self) -> Result<Vec<String>, DeployError> {
        self.routing().list_installed().await
    }

    /// Unroute and tear down `deployment_id`.
    ///
    /// The route goes first so the hostname stops answering before the
    /// service behind it disappears.
    pub async fn destroy(&self, deployment_id: &str) -> Result<(), DeployError> {
        // Ids that could never have been issued are not looked up remotely
        let routing = self.routing();
        if !is_valid_deployment_id(deployment_id) || !routing.exists(deployment_id).await {
            return Err(DeployError::NotFound(format!(
                "deployment '{}' not found on {}",
                deployment_id,
                self.session.host().name
            )));
        }

        let mut fsm = DeploymentFsm::starting_at(DeploymentState::Live);
        routing.remove(deployment_id).await?;
        routing.reload().await?;

        let layout = &self.options.layout;
        let down = self
            .options
            .stack
            .down(&layout.deployment_manifest(deployment_id), Some(deployment_id));
        let output = self.session.run(&down, false).await?;
        if !output.success() {
            warn!(
                "Stack teardown of {} exited with status {}: {}",
                deployment_id,
                output.status,
                output.stderr.trim()
            );
        }

        self.session
            .run(
                &format!("rm -rf {}", shell_quote(&layout.deployment_dir(deployment_id))),
                true,
            )
            .await?;
        advance(&mut fsm, DeploymentEvent::Destroy)?;
        info!("Deployment {} removed", deployment_id);
        Ok(())
    }
}

fn advance(fsm: &mut DeploymentFsm, event: DeploymentEvent) -> Result<(), DeployError> {
    fsm.process(event).map_err(DeployError::StateError)?;
    debug!("Deployment state is now {:?}", fsm.state());
    Ok(())
}
