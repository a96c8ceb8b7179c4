//! Routing table
//!
//! Every deployment owns one fragment file named after its id inside the
//! proxy's fragment directory. A fragment exists exactly when the proxy
//! routes the deployment's hostname, so the directory listing doubles as the
//! record of what is deployed. The proxy only re-reads the directory on an
//! explicit reload.

use tracing::{debug, info};

use crate::deploy::compose::StackManager;
use crate::errors::DeployError;
use crate::remote::{shell_quote, FileTransfer, RemoteSession};
use crate::storage::layout::RemoteLayout;

/// Render the fragment routing `<id>.<hostname>` to the deployment's web service
pub fn render_fragment(deployment_id: &str, public_hostname: &str, port: u16, use_tls: bool) -> String {
    format!(
        "{} {{\n    reverse_proxy {}_web:{}\n}}\n",
        site_address(&format!("{}.{}", deployment_id, public_hostname), use_tls),
        deployment_id,
        port
    )
}

/// Render the root proxy configuration
pub fn render_root_config(public_hostname: &str, use_tls: bool) -> String {
    format!(
        "# Reverse proxy configuration, fragments are managed by dockssh\n\
         {} {{\n    respond /health-check 200\n}}\n\nimport caddy.d/*\n",
        site_address(public_hostname, use_tls)
    )
}

/// Without TLS the site is declared over plain HTTP so no certificate is requested
fn site_address(hostname: &str, use_tls: bool) -> String {
    if use_tls {
        hostname.to_string()
    } else {
        format!("http://{}", hostname)
    }
}

/// Routing fragments of one host
pub struct RoutingTable<'a, S> {
    session: &'a S,
    layout: RemoteLayout,
    stack: StackManager,
    proxy_service: String,
    proxy_config_path: String,
    web_port: u16,
}

impl<'a, S> RoutingTable<'a, S>
where
    S: RemoteSession + FileTransfer,
{
    pub fn new(
        session: &'a S,
        layout: RemoteLayout,
        stack: StackManager,
        proxy_service: impl Into<String>,
        proxy_config_path: impl Into<String>,
        web_port: u16,
    ) -> Self {
        Self {
            session,
            layout,
            stack,
            proxy_service: proxy_service.into(),
            proxy_config_path: proxy_config_path.into(),
            web_port,
        }
    }

    /// Write the fragment for `deployment_id`; takes effect on [`Self::reload`]
    pub async fn install(
        &self,
        deployment_id: &str,
        public_hostname: &str,
        use_tls: bool,
    ) -> Result<(), DeployError> {
        let fragment = render_fragment(deployment_id, public_hostname, self.web_port, use_tls);
        let path = self.layout.fragment(deployment_id);
        self.session.put(fragment.as_bytes(), &path).await?;
        info!("Installed routing fragment {}", path);
        Ok(())
    }

    /// Delete the fragment for `deployment_id`; takes effect on [`Self::reload`]
    pub async fn remove(&self, deployment_id: &str) -> Result<(), DeployError> {
        let path = self.layout.fragment(deployment_id);
        self.session
            .run(&format!("rm -f {}", shell_quote(&path)), true)
            .await?;
        info!("Removed routing fragment {}", path);
        Ok(())
    }

    /// Ask the running proxy to re-read its configuration
    pub async fn reload(&self) -> Result<(), DeployError> {
        let command = self.stack.exec(
            &self.layout.server_manifest(),
            None,
            &self.proxy_service,
            &format!("caddy reload -config {}", self.proxy_config_path),
        );
        self.session.run(&command, true).await?;
        debug!("Reloaded proxy configuration");
        Ok(())
    }

    /// Whether a fragment for `deployment_id` is installed
    pub async fn exists(&self, deployment_id: &str) -> bool {
        let path = self.layout.fragment(deployment_id);
        self.session
            .probe(&format!("test -f {}", shell_quote(&path)))
            .await
    }

    /// Ids of every installed fragment, sorted
    pub async fn list_installed(&self) -> Result<Vec<String>, DeployError> {
        let dir = shell_quote(&self.layout.fragments_dir());
        if !self.session.probe(&format!("test -d {}", dir)).await {
            debug!("No fragment directory on {}", self.session.host().address);
            return Ok(Vec::new());
        }

        let output = self.session.run(&format!("ls -1A {}", dir), true).await?;
        let mut ids: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
