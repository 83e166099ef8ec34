use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::users;
use crate::errors::AppResult;
use crate::models::verification::Verification;
use crate::utils::utc_now;

/// Issues a fresh verification code for `user_id`.
pub async fn create(conn: &mut SqliteConnection, user_id: i64) -> AppResult<String> {
    let code = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO verifications (code, user_id, created_at) VALUES (?, ?, ?)")
        .bind(&code)
        .bind(user_id)
        .bind(utc_now())
        .execute(conn)
        .await?;

    Ok(code)
}

pub async fn find_by_code(conn: &mut SqliteConnection, code: &str) -> AppResult<Option<Verification>> {
    let verification = sqlx::query_as::<_, Verification>(
        "SELECT id, code, user_id, created_at FROM verifications WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(conn)
    .await?;

    Ok(verification)
}

/// Marks the owner of `code` verified and deletes the code, atomically.
/// Returns the verified user's id, or `None` for an unknown code.
pub async fn consume(pool: &SqlitePool, code: &str) -> AppResult<Option<i64>> {
    let mut tx = pool.begin().await?;

    let Some(verification) = find_by_code(&mut *tx, code).await? else {
        return Ok(None);
    };

    users::mark_verified(&mut *tx, verification.user_id).await?;

    sqlx::query("DELETE FROM verifications WHERE id = ?")
        .bind(verification.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(verification.user_id))
}
