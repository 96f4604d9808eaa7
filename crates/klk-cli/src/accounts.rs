//! # Account Subcommands
//!
//! `create-admin` adds a staff account with an admin profile; `issue-token`
//! signs a bearer token for an existing account with the server's secret.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use sqlx::SqlitePool;

use klk_api::auth::{hash_password_blocking, TokenService};
use klk_api::config::AppConfig;
use klk_api::db::{profiles, users};
use klk_core::validation::{validate_email, validate_password};
use klk_core::Role;

/// Arguments for `klk create-admin`.
#[derive(Args, Debug)]
pub struct CreateAdminArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    /// Read from `KLK_ADMIN_PASSWORD` when not given.
    #[arg(long, env = "KLK_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Also grant superuser.
    #[arg(long)]
    pub superuser: bool,
}

/// Arguments for `klk issue-token`.
#[derive(Args, Debug)]
pub struct IssueTokenArgs {
    #[arg(long)]
    pub email: String,

    /// Token lifetime; defaults to `JWT_EXPIRATION_HOURS`.
    #[arg(long)]
    pub hours: Option<i64>,
}

/// Create an administrator. Returns the new user id.
pub async fn create_admin(pool: &SqlitePool, args: &CreateAdminArgs, iterations: u32) -> Result<i64> {
    let email = validate_email(&args.email)?;
    validate_password(&args.password)?;
    if args.first_name.trim().is_empty() || args.last_name.trim().is_empty() {
        bail!("first and last name are required");
    }

    let hash = hash_password_blocking(args.password.clone(), iterations).await?;
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    if users::email_exists(&mut tx, &email).await? {
        bail!("an account with email {email} already exists");
    }
    let base = email.split('@').next().unwrap_or("admin");
    let username = users::unique_username(&mut tx, base).await?;
    let id = users::insert_user(
        &mut tx,
        &users::NewUser {
            username: &username,
            email: &email,
            password_hash: &hash,
            first_name: args.first_name.trim(),
            last_name: args.last_name.trim(),
            is_staff: true,
            is_superuser: args.superuser,
        },
        now,
    )
    .await?;
    profiles::insert(&mut tx, id, Role::Admin, &Default::default(), now).await?;
    tx.commit().await?;

    tracing::info!(user_id = id, %username, "administrator created");
    Ok(id)
}

/// Sign a token for the account with `args.email`.
pub async fn issue_token(pool: &SqlitePool, args: &IssueTokenArgs, config: &AppConfig) -> Result<String> {
    let email = validate_email(&args.email)?;
    let mut conn = pool.acquire().await?;
    let account = users::find_account_by_email(&mut conn, &email)
        .await?
        .with_context(|| format!("no account with email {email}"))?;
    if !account.is_active {
        bail!("account {email} is disabled");
    }
    let hours = args.hours.unwrap_or(config.jwt_expiration_hours);
    if hours <= 0 {
        bail!("token lifetime must be positive, got {hours}");
    }
    let tokens = TokenService::new(config.jwt_secret.clone(), hours);
    Ok(tokens.issue(account.id, &account.email, &account.username, Utc::now())?)
}
