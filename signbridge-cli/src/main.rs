//! Signbridge CLI - operator console for a signage CMS backend
//!
//! Authenticates against the configured backend, keeps the credential fresh
//! for the lifetime of the process, and exposes the gated operation catalog.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use signbridge_auth::{AuthError, Orchestrator, OrchestratorConfig};
use signbridge_core::{default_config_path, init_logging, SignbridgeConfig};
use signbridge_ops::OpsClient;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "signbridge")]
#[command(about = "Operator console for a signage CMS backend")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate against the backend and persist the credential
    Login {
        /// Authorization code obtained from an out-of-band browser redirect
        #[arg(long)]
        code: Option<String>,
    },

    /// Show the current authentication state
    Status,

    /// Show the backend's view of the active identity
    Whoami,

    /// List the operations the active identity may invoke
    Ops,

    /// Delete the persisted credential and end the session
    Logout,

    /// List signage displays
    Displays,

    /// List screen layouts
    Layouts,

    /// List library media
    Media,

    /// List campaigns
    Campaigns,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = if config_path.exists() {
        SignbridgeConfig::from_file(&config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?
    } else {
        bail!(
            "No configuration found at {}; create one first",
            config_path.display()
        );
    };

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("logging init failed: {}", e))?;
    config.validate()?;

    let passphrase = std::env::var(&config.auth.passphrase_env).with_context(|| {
        format!(
            "store passphrase not found in ${}",
            config.auth.passphrase_env
        )
    })?;

    let orchestrator =
        Orchestrator::new(OrchestratorConfig::from_config(&config, passphrase)?)?;
    let status = orchestrator.startup().await?;
    debug!(mode = %status.mode, authenticated = status.is_authenticated, "startup complete");

    match cli.command {
        Commands::Login { code } => {
            match orchestrator.login(code.as_deref()).await {
                Ok(permissions) => {
                    println!("Authenticated at level: {}", permissions.level);
                    let operations = orchestrator.available_operations().await;
                    println!("{} operations available", operations.len());
                }
                Err(AuthError::MfaRequired { mfa_token }) => {
                    eprintln!("The backend requires multi-factor completion.");
                    if let Some(token) = mfa_token {
                        eprintln!("Challenge token: {}", token);
                    }
                    std::process::exit(3);
                }
                Err(AuthError::Exhausted { attempts }) => {
                    eprintln!("Every authentication strategy failed:");
                    for attempt in attempts {
                        eprintln!("  {}", attempt);
                    }
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Status => {
            let status = orchestrator.auth_status().await;
            println!("mode:          {}", status.mode);
            println!("authenticated: {}", status.is_authenticated);
            match status.identity {
                Some(identity) => println!("identity:      {}", identity),
                None => println!("identity:      (none)"),
            }
        }
        Commands::Whoami => {
            let ops = OpsClient::new(orchestrator);
            let identity = ops.whoami().await?;
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }
        Commands::Ops => {
            let operations = orchestrator.available_operations().await;
            if operations.is_empty() {
                println!("No operations available; log in first.");
            } else {
                for operation in operations {
                    println!("{}", operation);
                }
            }
        }
        Commands::Logout => {
            orchestrator.logout().await?;
            println!("Logged out.");
        }
        Commands::Displays => {
            let ops = OpsClient::new(orchestrator);
            for display in ops.displays().list().await? {
                let state = match display.logged_in {
                    Some(1) => "online",
                    _ => "offline",
                };
                println!("{:>6}  {:<30} {}", display.display_id, display.display, state);
            }
        }
        Commands::Layouts => {
            let ops = OpsClient::new(orchestrator);
            for layout in ops.layouts().list().await? {
                println!(
                    "{:>6}  {:<30} {}",
                    layout.layout_id,
                    layout.layout,
                    layout.published_status.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Media => {
            let ops = OpsClient::new(orchestrator);
            for item in ops.media().list().await? {
                println!(
                    "{:>6}  {:<30} {}",
                    item.media_id,
                    item.name,
                    item.media_type.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Campaigns => {
            let ops = OpsClient::new(orchestrator);
            for campaign in ops.campaigns().list().await? {
                println!(
                    "{:>6}  {:<30} {} layouts",
                    campaign.campaign_id,
                    campaign.campaign,
                    campaign.num_layouts.unwrap_or(0)
                );
            }
        }
    }

    Ok(())
}
