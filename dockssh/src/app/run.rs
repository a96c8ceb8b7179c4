//! Command dispatch

use anyhow::Context;
use colored::Colorize;
use secrecy::ExposeSecret;
use tracing::info;

use crate::app::options::{Command, DeployArgs, ServersCommand};
use crate::app::state::AppState;
use crate::deploy::bootstrap::{BootstrapProcedure, BootstrapReport};
use crate::deploy::config::load_user_config;
use crate::deploy::lifecycle::{Lifecycle, LifecycleOptions};
use crate::errors::DeployError;
use crate::http::launch::RetryingLaunchClient;
use crate::models::deployment::{DeployRequest, Mode};
use crate::models::host::Host;
use crate::remote::ssh::{SshOptions, SshSession};
use crate::storage::registry::HostRegistry;
use crate::utils::version_info;

/// Run one command to completion
pub async fn run(command: Command, state: &AppState) -> anyhow::Result<()> {
    match command {
        Command::Servers(command) => servers(command, state).await,
        Command::Deploy(args) => deploy(args, state).await,
        Command::Apps { server } => apps(&server, state).await,
        Command::Destroy { app, server } => destroy(&app, &server, state).await,
        Command::Version => {
            println!("{}", serde_json::to_string_pretty(&version_info())?);
            Ok(())
        }
    }
}

async fn connect(host: &Host, state: &AppState) -> Result<SshSession, DeployError> {
    SshSession::connect(host, SshOptions::from(&state.settings.ssh)).await
}

async fn servers(command: ServersCommand, state: &AppState) -> anyhow::Result<()> {
    match command {
        ServersCommand::List => {
            let hosts = state.registry.list().await?;
            if hosts.is_empty() {
                println!("No server configured. Use `dockssh servers add` to add one");
            }
            for (name, entry) in hosts {
                match entry.user {
                    Some(user) => println!("{}: host: {}, user: {}", name.bold(), entry.host, user),
                    None => println!("{}: host: {}", name.bold(), entry.host),
                }
            }
        }
        ServersCommand::Add { host, user, name } => {
            let name = name.unwrap_or_else(|| host.clone());
            let host = Host::new(name.clone(), host, user);
            prepare(&host, state).await?;
            state.registry.add(&name, host.to_entry()).await?;
            println!("{} server {}", "Added".green(), name.bold());
        }
        ServersCommand::Remove { name } => {
            state.registry.remove(&name).await?;
            println!("{} server {}", "Removed".green(), name.bold());
        }
        ServersCommand::Prepare { name } => {
            let host = state.registry.get(&name).await?;
            prepare(&host, state).await?;
        }
    }
    Ok(())
}

async fn prepare(host: &Host, state: &AppState) -> anyhow::Result<BootstrapReport> {
    let mut session = connect(host, state).await?;
    let report = BootstrapProcedure::new(&state.settings.remote)
        .run(&mut session)
        .await
        .with_context(|| format!("preparing {}", host.address))?;

    if report.is_noop() {
        println!("{} already has the container tooling", host.address);
    } else {
        if report.runtime_installed {
            println!("{} container runtime", "Installed".green());
        }
        if let Some(route) = report.stack_manager_installed {
            println!("{} stack manager ({:?})", "Installed".green(), route);
        }
    }
    Ok(report)
}

async fn deploy(args: DeployArgs, state: &AppState) -> anyhow::Result<()> {
    let host = state.registry.get(&args.server).await?;
    let user_config = load_user_config(&state.settings.user_config_files, &args.config_file).await?;
    let request = DeployRequest {
        image: args.image.clone(),
        dns_host: args.dns_host.clone(),
        mode: if args.live { Mode::Live } else { Mode::Sandbox },
        user_config,
        overrides: args.overrides(),
    };

    let session = connect(&host, state).await?;
    let launcher = RetryingLaunchClient::from_settings(&state.settings.launch);
    let lifecycle = Lifecycle::new(
        &session,
        &launcher,
        LifecycleOptions::from_settings(&state.settings),
    );

    let report = lifecycle.deploy(&request).await?;
    info!("Deployed {} at {}", report.deployment.id, report.deployed_at);

    println!(
        "{} {} ({})",
        "Deployed".green().bold(),
        report.deployment.id.bold(),
        report.public_url
    );
    println!("{}", report.recruitment_msg);
    println!("To display the logs for this experiment you can run:");
    println!("    {}", report.log_command);
    println!(
        "You can now log in to the console at {} as user {} using password {}",
        report.dashboard_url,
        report.admin_user.bold(),
        report.admin_password.expose_secret().bold()
    );
    Ok(())
}

async fn apps(server: &str, state: &AppState) -> anyhow::Result<()> {
    let host = state.registry.get(server).await?;
    let session = connect(&host, state).await?;
    let launcher = RetryingLaunchClient::from_settings(&state.settings.launch);
    let lifecycle = Lifecycle::new(
        &session,
        &launcher,
        LifecycleOptions::from_settings(&state.settings),
    );

    for id in lifecycle.list().await? {
        println!("{}", id);
    }
    Ok(())
}

async fn destroy(app: &str, server: &str, state: &AppState) -> anyhow::Result<()> {
    let host = state.registry.get(server).await?;
    let session = connect(&host, state).await?;
    let launcher = RetryingLaunchClient::from_settings(&state.settings.launch);
    let lifecycle = Lifecycle::new(
        &session,
        &launcher,
        LifecycleOptions::from_settings(&state.settings),
    );

    lifecycle.destroy(app).await?;
    println!("{} {}", "Removed".green(), app.bold());
    Ok(())
}
