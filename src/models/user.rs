use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::authz::Role;
use crate::errors::AppError;
use crate::utils::normalize_email;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub role: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let role = value
            .role
            .parse::<Role>()
            .map_err(|err| AppError::internal(format!("user {}: {err}", value.id)))?;

        Ok(User {
            id: value.id,
            email: value.email,
            nickname: value.nickname,
            role,
            verified: value.verified,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[schema(example = "ada@example.com")]
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[schema(example = "ada")]
    #[validate(length(min = 1, max = 32, message = "nickname must be between 1 and 32 characters"))]
    pub nickname: String,
    /// Defaults to `Client`. Anything else needs a master's token.
    pub role: Option<Role>,
}

impl CreateUserRequest {
    /// Lowercases the e-mail and trims the nickname before validation.
    pub fn normalized(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self.nickname = self.nickname.trim().to_string();
        self
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct NicknameQuery {
    /// Nickname to check
    #[validate(length(min = 1, max = 32, message = "nickname must be between 1 and 32 characters"))]
    pub nickname: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NicknameAvailability {
    pub nickname: String,
    pub available: bool,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateNicknameRequest {
    #[schema(example = "countess")]
    #[validate(length(min = 1, max = 32, message = "nickname must be between 1 and 32 characters"))]
    pub nickname: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
