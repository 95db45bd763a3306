//! ldap2nc - One-way synchronization of LDAP users into Nextcloud
//!
//! Reads user entries from a directory, maps them through a transformer
//! script and reconciles users, groups and memberships over the Nextcloud
//! OCS provisioning API. Incremental runs only look at entries modified since
//! the last successful run.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod alert;
mod commands;
mod config;
mod error;
mod logging;

use config::AppConfig;
use error::CliResult;
use logging::LogLevel;

/// ldap2nc - LDAP to Nextcloud user synchronization
#[derive(Parser)]
#[command(name = "ldap2nc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (default: $LDAP2NC_CONFIG or ./config/ldap2nc.yaml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Debug logging for the ldap2nc crates
    #[arg(long, global = true)]
    debug: bool,

    /// Trace logging for everything
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize directory users into Nextcloud
    Sync(commands::sync::SyncArgs),

    /// Show the decisions a sync would take, without applying them
    Plan(commands::plan::PlanArgs),

    /// Run the transformer over every entry and print the resulting users
    TestTransform,

    /// List Nextcloud users and groups
    List(commands::list::ListArgs),

    /// Delete every configured group from Nextcloud
    DeleteGroups(commands::delete_groups::DeleteGroupsArgs),

    /// Validate the configuration and compile the transformer script
    CheckConfig,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(LogLevel::from_flags(cli.debug, cli.trace));

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let path = AppConfig::config_path(cli.config);
    tracing::debug!(config = %path.display(), "Loading configuration");
    let config = AppConfig::load(&path)?;

    match cli.command {
        Commands::Sync(args) => commands::sync::execute(&config, args).await,
        Commands::Plan(args) => commands::plan::execute(&config, args).await,
        Commands::TestTransform => commands::test_transform::execute(&config).await,
        Commands::List(args) => commands::list::execute(&config, args).await,
        Commands::DeleteGroups(args) => commands::delete_groups::execute(&config, args).await,
        Commands::CheckConfig => commands::check_config::execute(&config),
    }
}
