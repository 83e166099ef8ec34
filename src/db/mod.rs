use std::time::Duration;

use anyhow::Context;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod users;
pub mod verifications;

pub async fn init() -> anyhow::Result<SqlitePool> {
	let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

	let options = database_url
		.parse::<SqliteConnectOptions>()
		.context("DATABASE_URL is not a valid sqlite url")?
		.create_if_missing(true)
		.foreign_keys(true);

	// Directory lookups inherit this bound; a timed out acquire resolves to no identity.
	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(5))
		.connect_with(options)
		.await
		.context("failed to connect to database")?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	tracing::info!("database ready");

	Ok(pool)
}

/// Reverts the most recently applied migration. Returns its version, or
/// `None` when nothing is applied.
pub async fn rollback_last(pool: &SqlitePool, migrator: &Migrator) -> anyhow::Result<Option<i64>> {
	let has_table: Option<(String,)> =
		sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
			.fetch_optional(pool)
			.await?;
	if has_table.is_none() {
		return Ok(None);
	}

	let applied: Vec<(i64,)> = sqlx::query_as("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version DESC LIMIT 2")
		.fetch_all(pool)
		.await?;

	let Some(&(latest,)) = applied.first() else {
		return Ok(None);
	};

	let reversible = migrator
		.iter()
		.any(|migration| migration.version == latest && migration.migration_type.is_down_migration());
	if !reversible {
		anyhow::bail!("migration {latest} has no down script");
	}

	// `undo` reverts everything above the target, so aim at the one before.
	let target = applied.get(1).map(|&(version,)| version).unwrap_or(0);
	migrator
		.undo(pool, target)
		.await
		.with_context(|| format!("failed to roll back migration {latest}"))?;

	tracing::info!(version = latest, "migration rolled back");

	Ok(Some(latest))
}
