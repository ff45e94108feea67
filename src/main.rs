//! MySQL Backup Tool
//!
//! Builds and runs mysqldump / innobackupex / xtrabackup pipelines

mod backup;
mod config;
mod errors;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Dump MySQL databases through external backup tools
#[derive(Parser)]
#[command(name = "mysql-dumper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration
    #[arg(short, long, global = true, env = "MYSQL_DUMPER_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Enable debug logging (shows redacted stage scripts)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backup pipeline for every configured database
    Perform,

    /// Validate the configuration and print each pipeline without running it
    Check,
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("mysql_dumper=debug")
        } else {
            EnvFilter::new("mysql_dumper=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::load_from_json(&cli.config)
        .context(format!("Failed to load application configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Perform => {
            println!("🚀 Starting backup for trigger '{}'...", app_config.trigger);
            let artifacts = backup::run_backup_flow(&app_config)
                .await
                .context("Backup process failed")?;
            for artifact in artifacts {
                println!("📦 {}", artifact.display());
            }
        }
        Commands::Check => {
            let plans = backup::plan_backup_flow(&app_config).context("Configuration check failed")?;
            for plan in plans {
                let (scripts, artifact) = plan.describe();
                println!("{} -> {}", plan.label, artifact.display());
                for (index, script) in scripts.iter().enumerate() {
                    println!("  [{}] {}", index + 1, script);
                }
            }
        }
    }
    Ok(())
}
