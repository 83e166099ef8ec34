#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use usergate::authz::Role;
use usergate::db::users;
use usergate::{build_router, AppState, TokenCodec};

pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub state: AppState,
    _dir: TempDir,
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    let state = AppState::new(pool.clone(), TokenCodec::new(b"test-secret", 1)?)?;
    let router = build_router(state.clone());

    Ok(TestApp {
        router,
        pool,
        state,
        _dir: dir,
    })
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("x-jwt", token);
        }

        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.router.clone().oneshot(req).await?;
        let status = resp.status();
        let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .with_context(|| format!("non-json body: {}", String::from_utf8_lossy(&body_bytes)))?
        };

        Ok((status, value))
    }

    /// Signs a client up through the public endpoint, then sets the role
    /// straight in the database the way an operator bootstraps staff.
    pub async fn create_user(&self, email: &str, nickname: &str, role: &str) -> Result<i64> {
        let body = json!({
            "email": email,
            "password": PASSWORD,
            "nickname": nickname
        });

        let (status, value) = self.request("POST", "/users", None, Some(body)).await?;
        if status != StatusCode::CREATED {
            anyhow::bail!("create user failed: {} - {}", status, value);
        }

        let user_id = value.get("id").and_then(Value::as_i64).context("missing user id")?;
        let role: Role = role.parse()?;
        if role != Role::Client {
            users::update_role(&self.pool, user_id, role).await?;
        }

        Ok(user_id)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let body = json!({ "email": email, "password": password });
        let (status, value) = self.request("POST", "/auth/login", None, Some(body)).await?;
        if status != StatusCode::OK {
            anyhow::bail!("login failed: {} - {}", status, value);
        }

        value
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("missing token")
    }

    pub fn token_for(&self, user_id: i64) -> Result<String> {
        Ok(self.state.auth.tokens().issue(user_id)?)
    }
}
