//! # klk CLI entry point
//!
//! Parses arguments, opens the database and dispatches to the handlers in
//! the library crate.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use klk_api::config::AppConfig;
use klk_cli::accounts::{self, CreateAdminArgs, IssueTokenArgs};
use klk_cli::maintenance;

/// Kids League Kenya operator CLI.
#[derive(Parser, Debug)]
#[command(name = "klk", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// SQLite database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://klk.db?mode=rwc", global = true)]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database if needed and apply migrations.
    Migrate,

    /// Add an administrator account.
    CreateAdmin(CreateAdminArgs),

    /// Insert the default education levels and grades.
    SeedLevels,

    /// Print a bearer token for an existing account.
    IssueToken(IssueTokenArgs),

    /// Recompute statistics for every level and grade.
    RecomputeStats,

    /// Verify the audit log hash chain. Exits 2 when broken.
    VerifyAudit,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let pool = klk_cli::connect(&cli.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            println!("database at {} is up to date", cli.database_url);
        }
        Commands::CreateAdmin(args) => {
            let config = AppConfig::from_env()?;
            let id = accounts::create_admin(&pool, &args, config.password_iterations).await?;
            println!("created administrator {} (id {id})", args.email);
        }
        Commands::SeedLevels => {
            let created = maintenance::seed_levels(&pool).await?;
            println!("created {created} education level(s)");
        }
        Commands::IssueToken(args) => {
            if std::env::var_os("JWT_SECRET").is_none() {
                anyhow::bail!("JWT_SECRET must be set so the server accepts the token");
            }
            let config = AppConfig::from_env()?;
            println!("{}", accounts::issue_token(&pool, &args, &config).await?);
        }
        Commands::RecomputeStats => {
            let (levels, grades) = maintenance::recompute_stats(&pool).await?;
            println!("recomputed {levels} level(s) and {grades} grade(s)");
        }
        Commands::VerifyAudit => {
            let result = maintenance::verify_audit(&pool).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.chain_valid {
                return Ok(2);
            }
        }
    }

    pool.close().await;
    Ok(0)
}
