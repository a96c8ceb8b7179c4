//! Application state

use crate::errors::DeployError;
use crate::storage::layout::StorageLayout;
use crate::storage::registry::JsonHostRegistry;
use crate::storage::settings::Settings;

/// What every command needs: local storage, settings and the host registry
#[derive(Debug, Clone)]
pub struct AppState {
    pub layout: StorageLayout,
    pub settings: Settings,
    pub registry: JsonHostRegistry,
}

impl AppState {
    /// Load settings from `layout`, creating the storage directories
    pub async fn load(layout: StorageLayout) -> Result<Self, DeployError> {
        layout.setup().await?;
        let settings = Settings::load(&layout.settings_file()).await?;
        let registry = JsonHostRegistry::new(layout.hosts_file());
        Ok(Self {
            layout,
            settings,
            registry,
        })
    }
}
