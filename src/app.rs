use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, Method};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use crate::authz::{
    attach_identity, guard, AccessPolicy, Authenticator, IdentityResolver, Operation, Role, RoleRequirement, UserDirectory,
    TOKEN_HEADER,
};
use crate::db::users::SqliteUserDirectory;
use crate::errors::{AppError, AppResult};
use crate::jwt::TokenCodec;
use crate::routes::{auth, health, users};
use crate::utils::{Argon2Scheme, PasswordScheme};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub auth: Authenticator,
    pub policy: Arc<AccessPolicy>,
    pub passwords: Arc<dyn PasswordScheme>,
    /// Checked against when a login names an unknown e-mail, so both failures cost one hash.
    pub decoy_hash: Arc<str>,
}

const DECOY_PASSWORD: &str = "usergate-decoy-password";

impl AppState {
    pub fn new(pool: SqlitePool, tokens: TokenCodec) -> AppResult<Self> {
        let directory = Arc::new(SqliteUserDirectory::new(pool.clone()));
        Self::with_directory(pool, tokens, directory)
    }

    pub fn with_directory(pool: SqlitePool, tokens: TokenCodec, directory: Arc<dyn UserDirectory>) -> AppResult<Self> {
        let auth = Authenticator::new(Arc::new(tokens), IdentityResolver::new(directory));
        let passwords: Arc<dyn PasswordScheme> = Arc::new(Argon2Scheme);
        let decoy_hash = passwords.hash(DECOY_PASSWORD)?;

        Ok(Self {
            pool,
            auth,
            policy: Arc::new(access_policy()?),
            passwords,
            decoy_hash: decoy_hash.into(),
        })
    }
}

/// Role requirements for every protected operation. Anything not listed is public.
pub fn access_policy() -> AppResult<AccessPolicy> {
    AccessPolicy::builder()
        .require(Operation::Me, RoleRequirement::Authenticated)
        .require(Operation::UpdatePassword, RoleRequirement::Authenticated)
        .require(Operation::UpdateNickname, RoleRequirement::Authenticated)
        .require(Operation::GetUsers, RoleRequirement::roles([Role::Master, Role::Manager]))
        .require(Operation::GetUser, RoleRequirement::roles([Role::Master]))
        .build()
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let tokens = TokenCodec::from_env()?;
    let state = AppState::new(pool, tokens)?;

    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    let policy = Arc::clone(&state.policy);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new().route("/login", guard(post(auth::login), &policy, Operation::Login));

    let user_routes = Router::new()
        .route(
            "/",
            guard(get(users::list_users), &policy, Operation::GetUsers)
                .merge(guard(post(users::create_user), &policy, Operation::CreateUser)),
        )
        .route(
            "/check-nickname",
            guard(get(users::check_nickname), &policy, Operation::CheckNickname),
        )
        .route(
            "/verify-email",
            guard(post(users::verify_email), &policy, Operation::VerifyEmail),
        )
        .route("/me", guard(get(users::me), &policy, Operation::Me))
        .route(
            "/me/password",
            guard(put(users::update_password), &policy, Operation::UpdatePassword),
        )
        .route(
            "/me/nickname",
            guard(put(users::update_nickname), &policy, Operation::UpdateNickname),
        )
        .route("/:id", guard(get(users::get_user), &policy, Operation::GetUser));

    let identity = middleware::from_fn_with_state(state.auth.clone(), attach_identity);

    Router::new()
        .route("/api/health", guard(get(health::health), &policy, Operation::Health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .with_state(state)
        .layer(identity)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new([
            HeaderName::from_static(TOKEN_HEADER),
            AUTHORIZATION,
        ]))
}
