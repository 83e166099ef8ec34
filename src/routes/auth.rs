use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::db::users;
use crate::errors::{AppError, AppResult, INVALID_CREDENTIALS};
use crate::models::user::{LoginRequest, LoginResponse, User};
use crate::utils::normalize_email;

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    // Unknown e-mail and wrong password look the same to the caller, in body and in cost.
    let Some(db_user) = users::find_by_email(&state.pool, &normalize_email(&payload.email)).await? else {
        state.passwords.verify(&payload.password, &state.decoy_hash)?;
        tracing::info!("login rejected: unknown email");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    };

    if !state.passwords.verify(&payload.password, &db_user.password_hash)? {
        tracing::info!(user_id = db_user.id, "login rejected: wrong password");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    }

    let token = state.auth.tokens().issue(db_user.id)?;
    let user: User = db_user.try_into()?;

    tracing::info!(user_id = user.id, "login succeeded");

    Ok(Json(LoginResponse { token, user }))
}
