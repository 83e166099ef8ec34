use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Pending e-mail verification. One per user, removed once consumed.
#[derive(Debug, Clone, FromRow)]
pub struct Verification {
    pub id: i64,
    pub code: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}
