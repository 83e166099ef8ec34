use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::MethodRouter;

use super::{AccessPolicy, AuthContext, Identity, IdentityResolver, Operation};
use crate::errors::AppError;
use crate::jwt::TokenCodec;

/// Header carrying the bearer token. Header names are matched case-insensitively.
pub const TOKEN_HEADER: &str = "x-jwt";

/// Token verification plus directory resolution, shared by every request.
#[derive(Clone)]
pub struct Authenticator {
    tokens: Arc<TokenCodec>,
    resolver: IdentityResolver,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenCodec>, resolver: IdentityResolver) -> Self {
        Self { tokens, resolver }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Best effort: any missing, unverifiable or unresolvable token is `None`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = bearer_token(headers)?;

        let claims = match self.tokens.verify(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring unverifiable token");
                return None;
            }
        };

        self.resolver.resolve(claims.id).await
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Attaches an [`AuthContext`] to every request and lets it through.
pub async fn attach_identity(State(auth): State<Authenticator>, mut req: Request, next: Next) -> Response {
    let context = match auth.authenticate(req.headers()).await {
        Some(identity) => {
            tracing::debug!(subject_id = identity.subject_id(), role = %identity.role(), "identity attached");
            AuthContext::authenticated(identity)
        }
        None => AuthContext::anonymous(),
    };

    req.extensions_mut().insert(context);
    next.run(req).await
}

/// State for [`enforce`]: the shared policy and the operation a route serves.
#[derive(Clone)]
pub struct OperationGate {
    policy: Arc<AccessPolicy>,
    operation: Operation,
}

impl OperationGate {
    pub fn new(policy: Arc<AccessPolicy>, operation: Operation) -> Self {
        Self { policy, operation }
    }
}

/// Runs the gate before the handler. A request without an [`AuthContext`]
/// is treated as anonymous.
pub async fn enforce(State(gate): State<OperationGate>, req: Request, next: Next) -> Result<Response, AppError> {
    let identity = req.extensions().get::<AuthContext>().and_then(AuthContext::identity);
    gate.policy.check(gate.operation, identity).into_result()?;

    Ok(next.run(req).await)
}

/// Binds a method router to an operation so the gate runs in front of it.
pub fn guard<S>(route: MethodRouter<S>, policy: &Arc<AccessPolicy>, operation: Operation) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(middleware::from_fn_with_state(
        OperationGate::new(Arc::clone(policy), operation),
        enforce,
    ))
}

/// The caller's identity, rejecting with the gate's uniform denial when absent.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .and_then(AuthContext::identity)
            .cloned()
            .map(CurrentUser)
            .ok_or_else(AppError::access_denied)
    }
}

/// The caller's identity, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Identity>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<AuthContext>()
            .and_then(AuthContext::identity)
            .cloned();

        Ok(MaybeUser(identity))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::{self, Body};
    use axum::http::{HeaderValue, Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::authz::{RoleRequirement, Role, UserDirectory};
    use crate::errors::AppResult;
    use crate::models::user::User;
    use crate::utils::utc_now;

    struct MapDirectory(HashMap<i64, Role>);

    #[async_trait]
    impl UserDirectory for MapDirectory {
        async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
            let now = utc_now();
            Ok(self.0.get(&id).map(|role| User {
                id,
                email: format!("user{id}@example.com"),
                nickname: format!("user{id}"),
                role: *role,
                verified: false,
                created_at: now,
                updated_at: now,
            }))
        }
    }

    fn authenticator() -> Authenticator {
        let tokens = Arc::new(TokenCodec::new(b"middleware-secret", 1).unwrap());
        let directory = MapDirectory(HashMap::from([(1, Role::Client), (2, Role::Master)]));
        Authenticator::new(tokens, IdentityResolver::new(Arc::new(directory)))
    }

    async fn whoami(MaybeUser(identity): MaybeUser) -> String {
        identity
            .map(|identity| format!("{}:{}", identity.subject_id(), identity.role()))
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn router(auth: &Authenticator) -> Router {
        let policy = Arc::new(
            AccessPolicy::builder()
                .require(Operation::GetUser, RoleRequirement::roles([Role::Master]))
                .build()
                .unwrap(),
        );

        Router::new()
            .route("/whoami", get(whoami))
            .route("/master", guard(get(whoami), &policy, Operation::GetUser))
            .layer(middleware::from_fn_with_state(auth.clone(), attach_identity))
    }

    async fn call(router: Router, path: &str, token: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("X-JWT", token);
        }
        let resp = router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn call_with_raw_header(router: Router, value: HeaderValue) -> (StatusCode, String) {
        let req = HttpRequest::builder()
            .uri("/whoami")
            .header(TOKEN_HEADER, value)
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn unusable_header_values_pass_through_anonymously() {
        let auth = authenticator();
        let values = [
            HeaderValue::from_static(""),
            HeaderValue::from_static("   "),
            HeaderValue::from_bytes(b"\xff").unwrap(),
            HeaderValue::from_bytes(b"tok\xe9n").unwrap(),
        ];

        for value in values {
            assert_eq!(
                call_with_raw_header(router(&auth), value.clone()).await,
                (StatusCode::OK, "anonymous".to_string()),
                "header value {value:?}"
            );
        }
    }

    #[tokio::test]
    async fn surrounding_whitespace_is_ignored() {
        let auth = authenticator();
        let token = auth.tokens().issue(1).unwrap();
        let padded = HeaderValue::from_str(&format!("  {token}\t")).unwrap();

        assert_eq!(
            call_with_raw_header(router(&auth), padded).await,
            (StatusCode::OK, "1:client".to_string())
        );
    }

    #[tokio::test]
    async fn no_header_passes_through_anonymously() {
        let auth = authenticator();
        assert_eq!(call(router(&auth), "/whoami", None).await, (StatusCode::OK, "anonymous".to_string()));
    }

    #[tokio::test]
    async fn header_name_is_case_insensitive() {
        let auth = authenticator();
        let token = auth.tokens().issue(1).unwrap();

        assert_eq!(
            call(router(&auth), "/whoami", Some(&token)).await,
            (StatusCode::OK, "1:client".to_string())
        );
    }

    #[tokio::test]
    async fn garbage_token_passes_through_anonymously() {
        let auth = authenticator();
        assert_eq!(
            call(router(&auth), "/whoami", Some("not-a-token")).await,
            (StatusCode::OK, "anonymous".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_subject_passes_through_anonymously() {
        let auth = authenticator();
        let token = auth.tokens().issue(404).unwrap();

        assert_eq!(
            call(router(&auth), "/whoami", Some(&token)).await,
            (StatusCode::OK, "anonymous".to_string())
        );
    }

    #[tokio::test]
    async fn gate_denials_are_indistinguishable() {
        let auth = authenticator();
        let client = auth.tokens().issue(1).unwrap();

        let no_token = call(router(&auth), "/master", None).await;
        let bad_token = call(router(&auth), "/master", Some("x.y.z")).await;
        let wrong_role = call(router(&auth), "/master", Some(&client)).await;

        assert_eq!(no_token.0, StatusCode::UNAUTHORIZED);
        assert_eq!(no_token, bad_token);
        assert_eq!(no_token, wrong_role);
    }

    #[tokio::test]
    async fn gate_admits_matching_role() {
        let auth = authenticator();
        let master = auth.tokens().issue(2).unwrap();

        assert_eq!(
            call(router(&auth), "/master", Some(&master)).await,
            (StatusCode::OK, "2:master".to_string())
        );
    }

    #[tokio::test]
    async fn gate_without_identity_layer_fails_closed() {
        let policy = Arc::new(
            AccessPolicy::builder()
                .require(Operation::Me, RoleRequirement::Authenticated)
                .build()
                .unwrap(),
        );
        let router = Router::new().route("/me", guard(get(whoami), &policy, Operation::Me));

        let (status, _) = call(router, "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
