use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use usergate::authz::Role;
use usergate::config::{self, Environment};
use usergate::db::{self, users};
use usergate::jwt::TokenCodec;

#[derive(Parser, Debug)]
#[command(author, version, about = "usergate admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Change a user's role; the only way to mint the first master
    SetRole { user_id: i64, role: Role },
    /// Sign a token for a user id with the configured JWT_SECRET
    IssueToken { user_id: i64 },
    /// Verify a token with the configured JWT_SECRET and print its claims
    InspectToken { token: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env(Environment::from_env());

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            match db::rollback_last(&pool, &migrator).await? {
                Some(version) => println!("Rolled back migration {}", version),
                None => println!("No applied migrations, nothing rolled back"),
            }
        }
        Commands::SetRole { user_id, role } => {
            let pool = get_pool().await?;
            users::update_role(&pool, user_id, role)
                .await
                .with_context(|| format!("failed to set role of user {}", user_id))?;
            println!("User {} is now {}", user_id, role);
        }
        Commands::IssueToken { user_id } => {
            let codec = TokenCodec::from_env()?;
            println!("{}", codec.issue(user_id)?);
        }
        Commands::InspectToken { token } => {
            let codec = TokenCodec::from_env()?;
            let claims = codec.verify(token.trim())?;
            let expires = Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| claims.exp.to_string());
            println!("user id: {}", claims.id);
            println!("expires: {}", expires);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?;
    let applied_versions: HashSet<i64> = if has_table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter().filter(|m| !m.migration_type.is_down_migration()) {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when run from the repo root, else the crate's own folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
