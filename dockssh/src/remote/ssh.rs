//! OpenSSH-backed remote session
//!
//! One `SshSession` owns one multiplexed ControlMaster connection. Commands
//! and transfers are sent over that master, so they share a single login.
//! `reconnect` closes the master and logs in again, which is what makes a
//! freshly added group membership visible to later commands.
//!
//! Host keys are trusted on first use (`StrictHostKeyChecking=accept-new`):
//! an unknown key is accepted and written to `known_hosts` without a prompt,
//! a key that differs from the recorded one is still refused.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::models::host::Host;
use crate::remote::{CommandOutput, RemoteSession};
use crate::storage::settings::SshSettings;

/// Options handed to the ssh client when a session is built
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// ssh client binary
    pub program: String,

    /// Remote port, client default when unset
    pub port: Option<u16>,

    /// Private key to authenticate with, agent/default keys when unset
    pub identity_file: Option<PathBuf>,

    /// Client log verbosity (`QUIET`, `FATAL`, `ERROR`, `INFO`, ...)
    pub log_level: String,

    /// Connection timeout, transport default when unset
    pub connect_timeout: Option<Duration>,

    /// Idle time after which a master left behind by a killed process exits
    pub control_persist: Duration,

    /// Directory holding control sockets
    pub control_dir: PathBuf,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            port: None,
            identity_file: None,
            log_level: "ERROR".to_string(),
            connect_timeout: None,
            control_persist: Duration::from_secs(600),
            control_dir: std::env::temp_dir(),
        }
    }
}

impl From<&SshSettings> for SshOptions {
    fn from(settings: &SshSettings) -> Self {
        Self {
            program: settings.program.clone(),
            port: settings.port,
            identity_file: settings.identity_file.clone(),
            log_level: settings.log_level.clone(),
            connect_timeout: settings.connect_timeout_secs.map(Duration::from_secs),
            control_persist: Duration::from_secs(settings.control_persist_secs),
            ..Default::default()
        }
    }
}

/// A live ssh connection to one host
#[derive(Debug)]
pub struct SshSession {
    host: Host,
    options: SshOptions,
    control_path: PathBuf,
}

impl SshSession {
    /// Open a master connection to `host`
    pub async fn connect(host: &Host, options: SshOptions) -> Result<Self, DeployError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let control_path = options
            .control_dir
            .join(format!("dockssh-{}.sock", &token[..12]));

        let session = Self {
            host: host.clone(),
            options,
            control_path,
        };

        info!("Connecting to {}", session.host.ssh_target());
        session.start_master().await?;
        info!("Connected to {}", session.host.ssh_target());
        Ok(session)
    }

    /// Options shared by the master and every multiplexed client
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.control_path.to_string_lossy().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("LogLevel={}", self.options.log_level),
        ];

        if let Some(timeout) = self.options.connect_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
        }
        if let Some(port) = self.options.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().to_string());
        }
        if let Some(user) = &self.host.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }
        args
    }

    /// Build a client command that runs `remote_command` over the master
    pub(crate) fn client_command(&self, remote_command: &str) -> Command {
        let mut command = Command::new(&self.options.program);
        command
            .args(self.common_args())
            .arg(&self.host.address)
            .arg("--")
            .arg(remote_command)
            .kill_on_drop(true);
        command
    }

    /// Arguments of the background master process
    fn master_args(&self, log_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-M".to_string(),
            "-f".to_string(),
            "-N".to_string(),
            "-o".to_string(),
            format!("ControlPersist={}", self.options.control_persist.as_secs().max(1)),
            "-E".to_string(),
            log_path.to_string_lossy().to_string(),
        ];
        args.extend(self.common_args());
        args.push(self.host.address.clone());
        args
    }

    async fn start_master(&self) -> Result<(), DeployError> {
        // The master forks into the background once authenticated, so its
        // diagnostics go to a file instead of a pipe nobody would close.
        let log_path = self.control_path.with_extension("log");

        let status = Command::new(&self.options.program)
            .args(self.master_args(&log_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| DeployError::Connection {
                host: self.host.address.clone(),
                reason: format!("failed to run {}: {}", self.options.program, e),
            })?;

        let diagnostics = tokio::fs::read_to_string(&log_path)
            .await
            .unwrap_or_default();
        let _ = tokio::fs::remove_file(&log_path).await;

        if !status.success() {
            let reason = match diagnostics.trim() {
                "" => format!("ssh exited with {}", status),
                text => text.to_string(),
            };
            return Err(DeployError::Connection {
                host: self.host.address.clone(),
                reason,
            });
        }

        debug!("ssh master running on {:?}", self.control_path);
        Ok(())
    }

    async fn stop_master(&self) {
        let result = Command::new(&self.options.program)
            .arg("-S")
            .arg(&self.control_path)
            .args(["-O", "exit"])
            .arg(&self.host.address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Err(e) = result {
            warn!("Failed to stop ssh master for {}: {}", self.host.address, e);
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn host(&self) -> &Host {
        &self.host
    }

    async fn run(&self, command: &str, must_succeed: bool) -> Result<CommandOutput, DeployError> {
        debug!("[{}] $ {}", self.host.name, command);

        let output = match self.client_command(command).stdin(Stdio::null()).output().await {
            Ok(output) => CommandOutput {
                status: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Err(e) if must_succeed => {
                return Err(DeployError::Connection {
                    host: self.host.address.clone(),
                    reason: format!("failed to run {}: {}", self.options.program, e),
                });
            }
            Err(e) => CommandOutput {
                status: -1,
                stdout: String::new(),
                stderr: e.to_string(),
            },
        };

        if must_succeed && !output.success() {
            return Err(output.into_error(command));
        }
        Ok(output)
    }

    async fn reconnect(&mut self) -> Result<(), DeployError> {
        info!("Reconnecting to {}", self.host.ssh_target());
        self.stop_master().await;
        self.start_master().await
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let _ = std::process::Command::new(&self.options.program)
            .arg("-S")
            .arg(&self.control_path)
            .args(["-O", "exit"])
            .arg(&self.host.address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}
