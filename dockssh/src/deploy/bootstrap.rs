//! Host bootstrap
//!
//! Makes a host able to run container stacks: installs the container runtime
//! and the stack manager when their probes fail. On a provisioned host only
//! the probes run. Installs need passwordless `sudo` on the remote side.

use tracing::{info, warn};

use crate::deploy::compose::StackManager;
use crate::errors::DeployError;
use crate::remote::{shell_quote, RemoteSession};
use crate::storage::settings::RemoteSettings;

/// How the stack manager got installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallRoute {
    /// Python package installer
    Pip,
    /// Pinned static binary download
    Binary,
}

/// What a bootstrap run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub runtime_installed: bool,
    pub stack_manager_installed: Option<InstallRoute>,
    pub reconnected: bool,
}

impl BootstrapReport {
    /// True when the host was already provisioned
    pub fn is_noop(&self) -> bool {
        !self.runtime_installed && self.stack_manager_installed.is_none()
    }
}

/// Idempotent provisioning of one host
#[derive(Debug, Clone)]
pub struct BootstrapProcedure {
    runtime_command: String,
    runtime_install_script_url: String,
    runtime_group: String,
    stack: StackManager,
    compose_binary_url: String,
    compose_install_path: String,
    pip_bootstrap_url: String,
}

impl BootstrapProcedure {
    pub fn new(settings: &RemoteSettings) -> Self {
        Self {
            runtime_command: settings.runtime_command.clone(),
            runtime_install_script_url: settings.runtime_install_script_url.clone(),
            runtime_group: settings.runtime_group.clone(),
            stack: settings.stack_manager(),
            compose_binary_url: settings.compose_binary_url.clone(),
            compose_install_path: settings.compose_install_path.clone(),
            pip_bootstrap_url: settings.pip_bootstrap_url.clone(),
        }
    }

    fn runtime_probe(&self) -> String {
        format!("{} ps", self.runtime_command)
    }

    /// Probe and, where needed, install the runtime and the stack manager.
    ///
    /// The session is re-established after the runtime install so the new
    /// group membership applies to everything that follows.
    pub async fn run<S: RemoteSession>(&self, session: &mut S) -> Result<BootstrapReport, DeployError> {
        let mut report = BootstrapReport::default();
        let address = session.host().address.clone();

        info!("Checking container runtime on {}", address);
        if session.probe(&self.runtime_probe()).await {
            info!("Container runtime already installed");
        } else {
            self.install_runtime(session).await?;
            report.runtime_installed = true;

            session.reconnect().await?;
            report.reconnected = true;

            if !session.probe(&self.runtime_probe()).await {
                return Err(DeployError::BootstrapFailed(format!(
                    "`{}` still fails on {} after installing the runtime",
                    self.runtime_probe(),
                    address
                )));
            }
            info!("Container runtime installed");
        }

        info!("Checking stack manager on {}", address);
        if session.probe(&self.stack.version()).await {
            info!("Stack manager already installed");
            return Ok(report);
        }

        for route in [InstallRoute::Pip, InstallRoute::Binary] {
            let attempt = match route {
                InstallRoute::Pip => self.install_stack_manager_pip(session).await,
                InstallRoute::Binary => self.install_stack_manager_binary(session).await,
            };
            match attempt {
                Ok(()) if session.probe(&self.stack.version()).await => {
                    info!("Stack manager installed via {:?}", route);
                    report.stack_manager_installed = Some(route);
                    return Ok(report);
                }
                Ok(()) => warn!("Stack manager still missing after {:?} install", route),
                Err(e) => warn!("{:?} install of the stack manager failed: {}", route, e),
            }
        }

        Err(DeployError::BootstrapFailed(format!(
            "could not install `{}` on {}",
            self.stack.program(),
            address
        )))
    }

    async fn install_runtime<S: RemoteSession>(&self, session: &S) -> Result<(), DeployError> {
        info!("Installing container runtime");
        let user = match &session.host().user {
            Some(user) => shell_quote(user),
            None => "$(id -un)".to_string(),
        };
        let steps = [
            format!("wget -O - {} | bash", shell_quote(&self.runtime_install_script_url)),
            format!("sudo adduser {} {}", user, shell_quote(&self.runtime_group)),
        ];
        for step in &steps {
            session.run(step, true).await.map_err(|e| {
                DeployError::BootstrapFailed(format!("runtime install failed: {}", e))
            })?;
        }
        Ok(())
    }

    async fn install_stack_manager_pip<S: RemoteSession>(&self, session: &S) -> Result<(), DeployError> {
        if !session.probe("python3 --version").await {
            return Err(DeployError::BootstrapFailed("python3 is not available".to_string()));
        }

        if !session.probe("python3 -m pip --version").await {
            let get_pip = format!("python3 <(wget -O - {})", shell_quote(&self.pip_bootstrap_url));
            session
                .run(&format!("bash -c {}", shell_quote(&get_pip)), true)
                .await?;
        }

        let program = self.stack.program();
        session
            .run(&format!("python3 -m pip install --user {}", program), true)
            .await?;
        session
            .run(
                &format!(
                    "sudo ln -sf ~/.local/bin/{} {}",
                    program,
                    shell_quote(&self.compose_install_path)
                ),
                true,
            )
            .await?;
        Ok(())
    }

    async fn install_stack_manager_binary<S: RemoteSession>(&self, session: &S) -> Result<(), DeployError> {
        let target = shell_quote(&self.compose_install_path);
        session
            .run(
                &format!("sudo wget {} -O {}", shell_quote(&self.compose_binary_url), target),
                true,
            )
            .await?;
        session.run(&format!("sudo chmod 755 {}", target), true).await?;
        Ok(())
    }
}
