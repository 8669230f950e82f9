//! # Command Line Interface
//!
//! `keelson serve` (the default) runs the REST API; `keelson migrate` applies
//! the PostgreSQL schema and exits.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::api::{start_api_server, ApiState};
use crate::config::{load_config, AppConfig};
use crate::observability::{init_observability, log_config_info};
use crate::storage::{
    build_stores, create_pool, list_applied_migrations, run_migrations, sanitize_url,
    MigrationInfo,
};

#[derive(Parser, Debug)]
#[command(name = "keelson")]
#[command(about = "Keelson cluster template control plane")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the REST API server
    Serve,

    /// Apply pending PostgreSQL migrations and exit
    Migrate {
        /// Print the applied migrations afterwards
        #[arg(long)]
        list: bool,
    },
}

/// Parse arguments, load configuration and dispatch.
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    load_dotenv();

    let config = load_config(cli.config.as_deref())?;
    init_observability(&config.observability)?;
    log_config_info(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await?,
        Commands::Migrate { list } => migrate(&config, list).await?,
    }

    Ok(())
}

fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let stores = build_stores(&config.database).await?;

    match &config.bootstrap.admin_token {
        Some(token) => {
            let admin =
                stores.principals.ensure_admin(&config.bootstrap.admin_username, token).await?;
            info!(user_id = %admin.id, username = %admin.username, "bootstrap admin ready");
        }
        None => warn!("no bootstrap admin token configured; only health and docs are usable"),
    }

    let state = ApiState::new(stores.templates, stores.principals, &config.convergence);
    state.clusters.resume_pending().await?;
    start_api_server(&config.server, state).await?;
    Ok(())
}

async fn migrate(config: &AppConfig, list: bool) -> anyhow::Result<()> {
    if !config.database.is_postgresql() {
        anyhow::bail!(
            "migrate needs a postgresql:// database url, got '{}'",
            sanitize_url(&config.database.url)
        );
    }

    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;
    println!("Migrations completed successfully");

    if list {
        print_migrations_table(&list_applied_migrations(&pool).await?);
    }
    Ok(())
}

fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!("{:<16} {:<48} {:<8} Installed", "Version", "Description", "Success");
    for migration in migrations {
        println!(
            "{:<16} {:<48} {:<8} {}",
            migration.version,
            migration.description,
            migration.success,
            migration.installed_on.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["keelson"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["keelson", "migrate", "--list", "--config", "keelson.toml"])
            .unwrap();
        assert_eq!(cli.command, Some(Commands::Migrate { list: true }));
        assert_eq!(cli.config, Some(PathBuf::from("keelson.toml")));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["keelson", "frobnicate"]).is_err());
    }
}
