use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::app::AppState;
use crate::authz::{CurrentUser, Identity, MaybeUser, Role};
use crate::db::{users, verifications};
use crate::errors::{AppError, AppResult, CODE_NOT_EXIST, EMAIL_ALREADY, NICKNAME_ALREADY, USER_NOT_FOUND};
use crate::models::user::{
    CreateUserRequest, MessageResponse, NicknameAvailability, NicknameQuery, UpdateNicknameRequest,
    UpdatePasswordRequest, User, VerifyEmailRequest,
};

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created, verification code issued", body = User),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Access is Denied"),
        (status = 409, description = "Email or nickname already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let payload = payload.normalized();
    payload.validate()?;

    let role = payload.role.unwrap_or(Role::Client);
    let caller_is_master = caller.as_ref().is_some_and(|identity| identity.role() == Role::Master);
    if role != Role::Client && !caller_is_master {
        tracing::info!(requested = %role, "signup with elevated role denied");
        return Err(AppError::access_denied());
    }

    let email = payload.email.as_str();
    let nickname = payload.nickname.as_str();

    if users::email_exists(&state.pool, email).await? {
        return Err(AppError::conflict(EMAIL_ALREADY));
    }
    if users::nickname_taken(&state.pool, nickname, None).await? {
        return Err(AppError::conflict(NICKNAME_ALREADY));
    }

    let password_hash = state.passwords.hash(&payload.password)?;

    let mut tx = state.pool.begin().await?;
    let user_id = users::insert(
        &mut *tx,
        &users::NewUser {
            email,
            password_hash: &password_hash,
            nickname,
            role,
        },
    )
    .await?;
    verifications::create(&mut *tx, user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id, role = %role, "user created");

    let user = fetch_user(&state.pool, user_id).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/users/check-nickname",
    tag = "Users",
    params(NicknameQuery),
    responses((status = 200, description = "Availability", body = NicknameAvailability))
)]
pub async fn check_nickname(
    State(state): State<AppState>,
    MaybeUser(identity): MaybeUser,
    Query(query): Query<NicknameQuery>,
) -> AppResult<Json<NicknameAvailability>> {
    let query = NicknameQuery {
        nickname: query.nickname.trim().to_string(),
    };
    query.validate()?;
    let nickname = query.nickname.as_str();

    // A signed-in caller's own nickname counts as available to them.
    let except = identity.as_ref().map(Identity::subject_id);
    let taken = users::nickname_taken(&state.pool, nickname, except).await?;

    Ok(Json(NicknameAvailability {
        nickname: nickname.to_string(),
        available: !taken,
    }))
}

#[utoipa::path(
    post,
    path = "/users/verify-email",
    tag = "Users",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 404, description = "Code does not exist")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user_id = verifications::consume(&state.pool, payload.code.trim())
        .await?
        .ok_or_else(|| AppError::not_found(CODE_NOT_EXIST))?;

    tracing::info!(user_id, "email verified");

    Ok(Json(MessageResponse::new("email verified")))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "Access is Denied")
    ),
    security(("jwt" = []))
)]
pub async fn me(CurrentUser(identity): CurrentUser) -> Json<Identity> {
    Json(identity)
}

#[utoipa::path(
    put,
    path = "/users/me/password",
    tag = "Users",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Password too short"),
        (status = 401, description = "Access is Denied")
    ),
    security(("jwt" = []))
)]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    payload.validate()?;

    let password_hash = state.passwords.hash(&payload.password)?;
    users::update_password(&state.pool, identity.subject_id(), &password_hash).await?;

    tracing::info!(user_id = identity.subject_id(), "password updated");

    Ok(Json(MessageResponse::new("password updated")))
}

#[utoipa::path(
    put,
    path = "/users/me/nickname",
    tag = "Users",
    request_body = UpdateNicknameRequest,
    responses(
        (status = 200, description = "Nickname updated", body = MessageResponse),
        (status = 401, description = "Access is Denied"),
        (status = 409, description = "Nickname held by another user")
    ),
    security(("jwt" = []))
)]
pub async fn update_nickname(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(payload): Json<UpdateNicknameRequest>,
) -> AppResult<Json<MessageResponse>> {
    let payload = UpdateNicknameRequest {
        nickname: payload.nickname.trim().to_string(),
    };
    payload.validate()?;
    let nickname = payload.nickname.as_str();

    if users::nickname_taken(&state.pool, nickname, Some(identity.subject_id())).await? {
        return Err(AppError::conflict(NICKNAME_ALREADY));
    }

    users::update_nickname(&state.pool, identity.subject_id(), nickname).await?;

    tracing::info!(user_id = identity.subject_id(), "nickname updated");

    Ok(Json(MessageResponse::new("nickname updated")))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "All users", body = Vec<User>),
        (status = 401, description = "Access is Denied")
    ),
    security(("jwt" = []))
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    let users = users::list(&state.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = User),
        (status = 401, description = "Access is Denied"),
        (status = 404, description = "This user is not found")
    ),
    security(("jwt" = []))
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<User>> {
    Ok(Json(fetch_user(&state.pool, id).await?))
}

async fn fetch_user(pool: &SqlitePool, id: i64) -> AppResult<User> {
    users::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND))?
        .try_into()
}
