//! Authentication and authorization core
//!
//! Requests flow through two separate stages:
//! - [`attach_identity`] runs on every request. It verifies the `x-jwt` token,
//!   resolves the subject through the [`UserDirectory`] and stores the result
//!   in an [`AuthContext`] request extension. It never rejects a request.
//! - [`enforce`] runs per operation. It looks the operation up in the
//!   [`AccessPolicy`] table and allows or denies with a uniform error.
//!
//! Merging the two stages would break every public operation, so keep them apart.

mod middleware;
mod principal;
mod requirement;
mod resolver;

pub use middleware::{attach_identity, enforce, guard, Authenticator, CurrentUser, MaybeUser, OperationGate, TOKEN_HEADER};
pub use principal::{AuthContext, Identity};
pub use requirement::{authorize, AccessPolicy, AccessPolicyBuilder, Decision, RoleRequirement};
pub use resolver::{IdentityResolver, UserDirectory};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles. There is no ordering between them: `Master` does not imply
/// `Manager`, each requirement lists the roles it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    Master,
    Manager,
    Client,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Master, Role::Manager, Role::Client];

    /// Storage form used in the `users.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Manager => "manager",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| UnknownRole(value.to_string()))
    }
}

/// Every operation the service exposes. The access policy is keyed by these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateUser,
    Login,
    CheckNickname,
    VerifyEmail,
    Me,
    UpdatePassword,
    UpdateNickname,
    GetUsers,
    GetUser,
    Health,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateUser => "createUser",
            Operation::Login => "login",
            Operation::CheckNickname => "checkNickname",
            Operation::VerifyEmail => "verifyEmail",
            Operation::Me => "me",
            Operation::UpdatePassword => "updatePassword",
            Operation::UpdateNickname => "updateNickname",
            Operation::GetUsers => "getUsers",
            Operation::GetUser => "getUser",
            Operation::Health => "health",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
