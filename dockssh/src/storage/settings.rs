//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deploy::compose::StackManager;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::storage::layout::RemoteLayout;
use crate::utils::CooldownOptions;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Write a log file under the storage `logs/` directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Secure shell client configuration
    #[serde(default)]
    pub ssh: SshSettings,

    /// Remote host layout and tooling
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Launch endpoint retry configuration
    #[serde(default)]
    pub launch: LaunchSettings,

    /// Wildcard DNS service resolving `<ip>.<suffix>` to `<ip>`
    #[serde(default = "default_wildcard_dns_suffix")]
    pub wildcard_dns_suffix: String,

    /// JSON files holding experiment configuration, merged in order
    #[serde(default)]
    pub user_config_files: Vec<PathBuf>,
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_wildcard_dns_suffix() -> String {
    "nip.io".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_to_file: false,
            ssh: SshSettings::default(),
            remote: RemoteSettings::default(),
            launch: LaunchSettings::default(),
            wildcard_dns_suffix: default_wildcard_dns_suffix(),
            user_config_files: Vec::new(),
        }
    }
}

impl Settings {
    /// Read settings, falling back to defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            debug!("No settings file at {:?}, using defaults", file.path());
            return Ok(Self::default());
        }
        file.read_json().await.map_err(|e| {
            DeployError::ConfigError(format!("Unable to read {:?}: {}", file.path(), e))
        })
    }
}

/// Secure shell client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// ssh client binary
    #[serde(default = "default_ssh_program")]
    pub program: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Client log verbosity, quiet unless something is wrong
    #[serde(default = "default_ssh_log_level")]
    pub log_level: String,

    /// Unset keeps the transport's own behaviour
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Idle lifetime of the multiplexing master connection
    #[serde(default = "default_control_persist_secs")]
    pub control_persist_secs: u64,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_ssh_log_level() -> String {
    "ERROR".to_string()
}

fn default_control_persist_secs() -> u64 {
    600
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            program: default_ssh_program(),
            port: None,
            identity_file: None,
            log_level: default_ssh_log_level(),
            connect_timeout_secs: None,
            control_persist_secs: default_control_persist_secs(),
        }
    }
}

/// Remote host layout and tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Directory under the login directory holding all state
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// Container runtime CLI
    #[serde(default = "default_runtime_command")]
    pub runtime_command: String,

    /// Container stack manager CLI
    #[serde(default = "default_compose_command")]
    pub compose_command: String,

    /// Vendor bootstrap script installing the runtime
    #[serde(default = "default_runtime_install_script_url")]
    pub runtime_install_script_url: String,

    /// Group granting access to the runtime daemon
    #[serde(default = "default_runtime_group")]
    pub runtime_group: String,

    /// Pinned static stack manager binary
    #[serde(default = "default_compose_binary_url")]
    pub compose_binary_url: String,

    /// Where the stack manager is installed
    #[serde(default = "default_compose_install_path")]
    pub compose_install_path: String,

    /// pip bootstrap script
    #[serde(default = "default_pip_bootstrap_url")]
    pub pip_bootstrap_url: String,

    /// One-time database initialization, run inside the web service
    #[serde(default = "default_init_command")]
    pub init_command: String,

    /// Internal port of the web service
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Reverse proxy service in the base manifest
    #[serde(default = "default_proxy_service")]
    pub proxy_service: String,

    /// Root proxy configuration path inside the proxy container
    #[serde(default = "default_proxy_config_path")]
    pub proxy_config_path: String,
}

fn default_root_dir() -> String {
    "dallinger".to_string()
}

fn default_runtime_command() -> String {
    "docker".to_string()
}

fn default_compose_command() -> String {
    "docker-compose".to_string()
}

fn default_runtime_install_script_url() -> String {
    "https://get.docker.com".to_string()
}

fn default_runtime_group() -> String {
    "docker".to_string()
}

fn default_compose_binary_url() -> String {
    "https://github.com/docker/compose/releases/download/1.29.1/docker-compose-Linux-x86_64"
        .to_string()
}

fn default_compose_install_path() -> String {
    "/usr/local/bin/docker-compose".to_string()
}

fn default_pip_bootstrap_url() -> String {
    "https://bootstrap.pypa.io/get-pip.py".to_string()
}

fn default_init_command() -> String {
    "dallinger-housekeeper initdb".to_string()
}

fn default_web_port() -> u16 {
    5000
}

fn default_proxy_service() -> String {
    "httpserver".to_string()
}

fn default_proxy_config_path() -> String {
    "/etc/caddy/Caddyfile".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            runtime_command: default_runtime_command(),
            compose_command: default_compose_command(),
            runtime_install_script_url: default_runtime_install_script_url(),
            runtime_group: default_runtime_group(),
            compose_binary_url: default_compose_binary_url(),
            compose_install_path: default_compose_install_path(),
            pip_bootstrap_url: default_pip_bootstrap_url(),
            init_command: default_init_command(),
            web_port: default_web_port(),
            proxy_service: default_proxy_service(),
            proxy_config_path: default_proxy_config_path(),
        }
    }
}

impl RemoteSettings {
    pub fn layout(&self) -> RemoteLayout {
        RemoteLayout::new(&self.root_dir)
    }

    pub fn stack_manager(&self) -> StackManager {
        StackManager::new(&self.compose_command)
    }
}

/// Launch endpoint retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl LaunchSettings {
    pub fn cooldown(&self) -> CooldownOptions {
        CooldownOptions {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: 2.0,
        }
    }
}
