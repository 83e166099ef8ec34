use std::collections::{HashMap, HashSet};

use super::{Identity, Operation, Role};
use crate::errors::{AppError, AppResult};

/// Access policy attached to an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Anyone, with or without an identity.
    Public,
    /// Any resolved identity, whatever its role.
    Authenticated,
    /// A resolved identity whose role is in the set. An empty set admits nobody.
    Roles(HashSet<Role>),
}

impl RoleRequirement {
    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::Roles(roles.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AppError::access_denied()),
        }
    }
}

/// Pure gate decision for one requirement and the identity attached to a request.
pub fn authorize(requirement: &RoleRequirement, identity: Option<&Identity>) -> Decision {
    let allowed = match (requirement, identity) {
        (RoleRequirement::Public, _) => true,
        (RoleRequirement::Authenticated, identity) => identity.is_some(),
        (RoleRequirement::Roles(roles), Some(identity)) => roles.contains(&identity.role()),
        (RoleRequirement::Roles(_), None) => false,
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

static PUBLIC: RoleRequirement = RoleRequirement::Public;

/// Immutable operation to requirement table, built once at startup.
/// Operations without a declaration are public.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: HashMap<Operation, RoleRequirement>,
}

impl AccessPolicy {
    pub fn builder() -> AccessPolicyBuilder {
        AccessPolicyBuilder::default()
    }

    pub fn requirement(&self, operation: Operation) -> &RoleRequirement {
        self.rules.get(&operation).unwrap_or(&PUBLIC)
    }

    pub fn check(&self, operation: Operation, identity: Option<&Identity>) -> Decision {
        let requirement = self.requirement(operation);
        let decision = authorize(requirement, identity);

        match decision {
            Decision::Allow => tracing::debug!(
                operation = %operation,
                subject_id = identity.map(Identity::subject_id),
                "access granted"
            ),
            Decision::Deny => tracing::info!(
                operation = %operation,
                subject_id = identity.map(Identity::subject_id),
                requirement = ?requirement,
                "access denied"
            ),
        }

        decision
    }
}

#[derive(Debug, Default)]
pub struct AccessPolicyBuilder {
    rules: Vec<(Operation, RoleRequirement)>,
}

impl AccessPolicyBuilder {
    pub fn require(mut self, operation: Operation, requirement: RoleRequirement) -> Self {
        self.rules.push((operation, requirement));
        self
    }

    /// Fails when an operation is declared twice.
    pub fn build(self) -> AppResult<AccessPolicy> {
        let mut rules = HashMap::with_capacity(self.rules.len());
        for (operation, requirement) in self.rules {
            if rules.insert(operation, requirement).is_some() {
                return Err(AppError::configuration(format!(
                    "role requirement for {operation} declared twice"
                )));
            }
        }

        Ok(AccessPolicy { rules })
    }
}
