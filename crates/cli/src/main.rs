//! Command Line Interface for LP Cruise.
use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use cruise_api::{ApiServer, AppState};
use cruise_execution::cruise::{CruiseConfig, CruiseService};
use dotenv::dotenv;
use prettytable::{Table, row};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod wiring;

use config::CruiseFile;

#[derive(Parser)]
#[command(name = "cruise")]
#[command(about = "Autonomous orchestration engine for Solana LP agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator until Ctrl-C
    Run {
        /// Configuration file
        #[arg(short, long, env = "CRUISE_CONFIG", default_value = "cruise.toml")]
        config: PathBuf,

        /// Postgres URL, overrides [storage]
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// Log as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Parse the configuration and print the agent table
    Validate {
        /// Configuration file
        #[arg(short, long, env = "CRUISE_CONFIG", default_value = "cruise.toml")]
        config: PathBuf,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            database_url,
            json,
        } => {
            init_logging(json);
            run(config, database_url).await
        }
        Commands::Validate { config } => validate(config),
    }
}

async fn run(path: PathBuf, database_url: Option<String>) -> Result<()> {
    let file = CruiseFile::load(&path)?;
    info!(config = %path.display(), agents = file.agents.len(), "Configuration loaded");

    let store = wiring::state_store(&file, database_url.as_deref()).await?;
    let ports = wiring::build_ports(&file, store).await?;
    let service = CruiseService::new(ports, file.service.clone());

    for entry in &file.agents {
        let result = service.register_agent(&entry.id, entry.config.clone()).await;
        if result.success {
            info!(agent_id = %entry.id, message = %result.message, "Agent ready");
        } else {
            error!(agent_id = %entry.id, message = %result.message, "Agent not registered");
        }
    }
    service.start().await;

    let (stop_api, api_stopped) = tokio::sync::oneshot::channel::<()>();
    let api = if file.api.enabled {
        let server = ApiServer::new(file.api.clone(), AppState::new(service.clone()));
        Some(tokio::spawn(server.serve(async {
            let _ = api_stopped.await;
        })))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    service.shutdown().await;
    let _ = stop_api.send(());
    if let Some(api) = api {
        match api.await {
            Ok(Err(e)) => warn!(error = %e, "API server exited with an error"),
            Err(e) => warn!(error = %e, "API server task failed"),
            Ok(Ok(())) => {}
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn validate(path: PathBuf) -> Result<()> {
    let file = CruiseFile::load(&path)?;

    let mut table = Table::new();
    table.add_row(row![
        "ID", "Name", "Wallet", "Max pos", "Min bal", "Risk", "Health", "Market", "Optimize",
        "Status"
    ]);

    let mut invalid = 0;
    for entry in &file.agents {
        let config = &entry.config;
        let tolerance = format!("{:?}", config.risk_tolerance).to_lowercase();
        match CruiseConfig::merge(&entry.id, config.clone(), &file.service.defaults) {
            Ok(merged) => {
                table.add_row(row![
                    entry.id,
                    config.name,
                    config.wallet_id,
                    config.max_positions,
                    config.min_balance,
                    tolerance,
                    format!("{}s", merged.health_check_interval.as_secs()),
                    format!("{}s", merged.market_check_interval.as_secs()),
                    format!("{}s", merged.optimization_interval.as_secs()),
                    "ok"
                ]);
            }
            Err(e) => {
                invalid += 1;
                table.add_row(row![
                    entry.id,
                    config.name,
                    config.wallet_id,
                    config.max_positions,
                    config.min_balance,
                    tolerance,
                    "-",
                    "-",
                    "-",
                    e.to_string()
                ]);
            }
        }
    }

    println!("📋 {} ({:?} chain)", path.display(), file.chain.mode);
    table.printstd();

    if invalid > 0 {
        bail!("{invalid} of {} agents are invalid", file.agents.len());
    }
    println!("✅ {} agents valid", file.agents.len());
    Ok(())
}
