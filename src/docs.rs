use axum::Router;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{Identity, Role, TOKEN_HEADER};
use crate::models::user::{
	CreateUserRequest, LoginRequest, LoginResponse, MessageResponse, NicknameAvailability, UpdateNicknameRequest,
	UpdatePasswordRequest, User, VerifyEmailRequest,
};
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::auth::login,
		routes::users::create_user,
		routes::users::check_nickname,
		routes::users::verify_email,
		routes::users::me,
		routes::users::update_password,
		routes::users::update_nickname,
		routes::users::list_users,
		routes::users::get_user,
		routes::health::health
	),
	components(
		schemas(
			User,
			Role,
			Identity,
			LoginRequest,
			LoginResponse,
			CreateUserRequest,
			NicknameAvailability,
			UpdatePasswordRequest,
			UpdateNicknameRequest,
			VerifyEmailRequest,
			MessageResponse,
			routes::health::HealthResponse
		)
	),
	modifiers(&TokenHeaderScheme),
	tags(
		(name = "Auth", description = "Token issuance"),
		(name = "Users", description = "User accounts"),
		(name = "Health", description = "Liveness")
	)
)]
pub struct ApiDoc;

/// Registers the `x-jwt` header as the `jwt` security scheme referenced by protected paths.
struct TokenHeaderScheme;

impl Modify for TokenHeaderScheme {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		if let Some(components) = openapi.components.as_mut() {
			components.add_security_scheme(
				"jwt",
				SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(TOKEN_HEADER))),
			);
		}
	}
}

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", doc))
}
