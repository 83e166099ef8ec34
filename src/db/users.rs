use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

use crate::authz::{Role, UserDirectory};
use crate::errors::{AppError, AppResult, EMAIL_ALREADY, NICKNAME_ALREADY};
use crate::models::user::{DbUser, User};
use crate::utils::utc_now;

/// The SQLite-backed user directory consulted by the identity resolver.
#[derive(Debug, Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        find_by_id(&self.pool, id).await?.map(User::try_from).transpose()
    }
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub nickname: &'a str,
    pub role: Role,
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, password_hash, nickname, role, verified, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, password_hash, nickname, role, verified, created_at, updated_at FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<DbUser>> {
    let users = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, password_hash, nickname, role, verified, created_at, updated_at FROM users ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(users)
}

pub async fn email_exists(pool: &SqlitePool, email: &str) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

/// Whether another user holds `nickname`. `except` excludes the caller's own row.
pub async fn nickname_taken(pool: &SqlitePool, nickname: &str, except: Option<i64>) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE nickname = ? AND (? IS NULL OR id <> ?)")
        .bind(nickname)
        .bind(except)
        .bind(except)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn insert(conn: &mut SqliteConnection, user: &NewUser<'_>) -> AppResult<i64> {
    let now = utc_now();

    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, nickname, role, verified, created_at, updated_at) VALUES (?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.nickname)
    .bind(user.role.as_str())
    .bind(now)
    .bind(now)
    .execute(conn)
    .await
    .map_err(unique_violation_to_conflict)?;

    Ok(result.last_insert_rowid())
}

pub async fn update_password(pool: &SqlitePool, id: i64, password_hash: &str) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(utc_now())
        .bind(id)
        .execute(pool)
        .await?;

    ensure_updated(result.rows_affected())
}

pub async fn update_nickname(pool: &SqlitePool, id: i64, nickname: &str) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET nickname = ?, updated_at = ? WHERE id = ?")
        .bind(nickname)
        .bind(utc_now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(unique_violation_to_conflict)?;

    ensure_updated(result.rows_affected())
}

pub async fn update_role(pool: &SqlitePool, id: i64, role: Role) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(utc_now())
        .bind(id)
        .execute(pool)
        .await?;

    ensure_updated(result.rows_affected())
}

pub async fn mark_verified(conn: &mut SqliteConnection, id: i64) -> AppResult<()> {
    let result = sqlx::query("UPDATE users SET verified = 1, updated_at = ? WHERE id = ?")
        .bind(utc_now())
        .bind(id)
        .execute(conn)
        .await?;

    ensure_updated(result.rows_affected())
}

fn ensure_updated(rows: u64) -> AppResult<()> {
    if rows == 0 {
        return Err(AppError::not_found(crate::errors::USER_NOT_FOUND));
    }
    Ok(())
}

// Check-then-insert races still hit the UNIQUE constraints; report them the same way.
fn unique_violation_to_conflict(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            if db.message().contains("nickname") {
                AppError::conflict(NICKNAME_ALREADY)
            } else {
                AppError::conflict(EMAIL_ALREADY)
            }
        }
        _ => AppError::Database(err),
    }
}
