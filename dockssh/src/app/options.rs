//! Command line options

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logs::LogLevel;

#[derive(Debug, Parser)]
#[command(name = "dockssh")]
#[command(about = "Deploy container stacks to a remote host over ssh", long_about = None)]
pub struct Cli {
    /// Log level, overrides the settings file (RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage remote servers deployments can target
    #[command(subcommand)]
    Servers(ServersCommand),

    /// Deploy an experiment image to a server
    Deploy(DeployArgs),

    /// List deployments running on a server
    Apps {
        /// Registered server name
        #[arg(long)]
        server: String,
    },

    /// Tear down a deployment
    Destroy {
        /// Deployment id
        #[arg(long)]
        app: String,

        /// Registered server name
        #[arg(long)]
        server: String,
    },

    /// Print version information
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ServersCommand {
    /// List registered servers
    List,

    /// Prepare a server and register it.
    ///
    /// Missing container tooling is installed with `sudo`, so the user needs
    /// passwordless sudo rights. Ports 80 and 443 must be free.
    Add {
        /// IP address or DNS name
        #[arg(long)]
        host: String,

        /// Login user
        #[arg(long)]
        user: Option<String>,

        /// Registry name, defaults to the host
        #[arg(long)]
        name: Option<String>,
    },

    /// Forget a server; nothing changes on the server itself
    Remove {
        #[arg(long)]
        name: String,
    },

    /// Re-run provisioning on a registered server
    Prepare {
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Container image to deploy
    #[arg(long)]
    pub image: String,

    /// Registered server name
    #[arg(long)]
    pub server: String,

    /// DNS name whose subdomains all resolve to the server
    #[arg(long)]
    pub dns_host: Option<String>,

    /// Configuration override, applied last
    #[arg(short = 'c', long = "config", num_args = 2, value_names = ["KEY", "VALUE"])]
    pub config: Vec<String>,

    /// Extra JSON configuration file
    #[arg(long)]
    pub config_file: Vec<PathBuf>,

    /// Recruit in sandbox mode (default)
    #[arg(long, conflicts_with = "live")]
    pub sandbox: bool,

    /// Recruit for real
    #[arg(long)]
    pub live: bool,
}

impl DeployArgs {
    /// `--config` values as key/value pairs
    pub fn overrides(&self) -> Vec<(String, String)> {
        self.config
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }
}
