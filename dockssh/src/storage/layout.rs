//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the local storage directory
pub const HOME_ENV_VAR: &str = "DOCKSSH_HOME";

/// Local storage layout for the orchestrator
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the host registry file path
    pub fn hosts_file(&self) -> File {
        File::new(self.base_dir.join("hosts.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        Dir::new(&self.base_dir).create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        if let Some(dir) = std::env::var_os(HOME_ENV_VAR) {
            return Self::new(dir);
        }

        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(home.join(".dockssh"))
    }
}

/// Paths on the remote host, relative to the login directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    root: String,
}

impl RemoteLayout {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base infrastructure manifest
    pub fn server_manifest(&self) -> String {
        format!("{}/docker-compose.yml", self.root)
    }

    /// Root reverse proxy configuration
    pub fn proxy_config(&self) -> String {
        format!("{}/Caddyfile", self.root)
    }

    /// Directory of per-deployment routing fragments
    pub fn fragments_dir(&self) -> String {
        format!("{}/caddy.d", self.root)
    }

    pub fn fragment(&self, deployment_id: &str) -> String {
        format!("{}/{}", self.fragments_dir(), deployment_id)
    }

    pub fn deployment_dir(&self, deployment_id: &str) -> String {
        format!("{}/{}", self.root, deployment_id)
    }

    pub fn deployment_manifest(&self, deployment_id: &str) -> String {
        format!("{}/docker-compose.yml", self.deployment_dir(deployment_id))
    }
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self::new("dallinger")
    }
}
