//! Host registry
//!
//! Known hosts live in `hosts.json` as a name → `{host, user}` object.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::info;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::host::{Host, HostEntry};

/// Key-value store of known hosts
#[async_trait]
pub trait HostRegistry: Send + Sync {
    async fn list(&self) -> Result<BTreeMap<String, HostEntry>, DeployError>;

    async fn add(&self, name: &str, entry: HostEntry) -> Result<(), DeployError>;

    async fn remove(&self, name: &str) -> Result<(), DeployError>;

    /// Look up one host by name
    async fn get(&self, name: &str) -> Result<Host, DeployError> {
        let hosts = self.list().await?;
        let entry = hosts.get(name).ok_or_else(|| {
            let known = hosts.keys().cloned().collect::<Vec<_>>().join(", ");
            DeployError::NotFound(format!(
                "server '{}' is not registered (known: {})",
                name,
                if known.is_empty() { "none" } else { known.as_str() }
            ))
        })?;
        Ok(Host::from_entry(name, entry))
    }
}

/// Registry persisted as a JSON file
#[derive(Debug, Clone)]
pub struct JsonHostRegistry {
    file: File,
}

impl JsonHostRegistry {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    async fn save(&self, hosts: &BTreeMap<String, HostEntry>) -> Result<(), DeployError> {
        let contents = serde_json::to_vec_pretty(hosts)?;
        self.file.write_atomic(&contents).await
    }
}

#[async_trait]
impl HostRegistry for JsonHostRegistry {
    async fn list(&self) -> Result<BTreeMap<String, HostEntry>, DeployError> {
        if !self.file.exists().await {
            return Ok(BTreeMap::new());
        }
        self.file.read_json().await.map_err(|e| {
            DeployError::RegistryError(format!("Unable to read {:?}: {}", self.file.path(), e))
        })
    }

    async fn add(&self, name: &str, entry: HostEntry) -> Result<(), DeployError> {
        if name.trim().is_empty() {
            return Err(DeployError::ValidationError(
                "server name must not be empty".to_string(),
            ));
        }
        let mut hosts = self.list().await?;
        if let Some(previous) = hosts.insert(name.to_string(), entry) {
            info!("Replacing server '{}' (was {})", name, previous.host);
        }
        self.save(&hosts).await
    }

    async fn remove(&self, name: &str) -> Result<(), DeployError> {
        let mut hosts = self.list().await?;
        if hosts.remove(name).is_none() {
            return Err(DeployError::NotFound(format!(
                "server '{}' is not registered",
                name
            )));
        }
        self.save(&hosts).await
    }
}
