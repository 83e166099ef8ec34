use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::Role;
use crate::models::user::User;

/// The authenticated subject of a request, as the directory knows it right now.
///
/// Only [`IdentityResolver`](super::IdentityResolver) builds these, after the
/// token verified and the directory returned a record. It lives for one
/// request and is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Identity {
    subject_id: i64,
    role: Role,
    email: String,
    nickname: String,
    verified: bool,
}

impl Identity {
    pub(crate) fn from_user(user: User) -> Self {
        Self {
            subject_id: user.id,
            role: user.role,
            email: user.email,
            nickname: user.nickname,
            verified: user.verified,
        }
    }

    pub fn subject_id(&self) -> i64 {
        self.subject_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    #[cfg(test)]
    pub(crate) fn for_tests(subject_id: i64, role: Role) -> Self {
        Self {
            subject_id,
            role,
            email: format!("user{subject_id}@example.com"),
            nickname: format!("user{subject_id}"),
            verified: false,
        }
    }
}

/// Request-scoped authentication result, stored in the request extensions.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    identity: Option<Arc<Identity>>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub(crate) fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(Arc::new(identity)),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_deref()
    }
}
