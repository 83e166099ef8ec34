use std::sync::Arc;

use async_trait::async_trait;

use super::Identity;
use crate::errors::AppResult;
use crate::models::user::User;

/// Lookup-by-id over the user records.
///
/// `Ok(None)` means the subject does not exist; `Err` is reserved for
/// infrastructure failures (connection loss, timeouts, corrupt rows).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>>;
}

/// Turns a verified subject id into an [`Identity`].
#[derive(Clone)]
pub struct IdentityResolver {
    directory: Arc<dyn UserDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// One directory lookup. Misses and failures both come back as `None`;
    /// whether that matters is for the gate to decide.
    pub async fn resolve(&self, subject_id: i64) -> Option<Identity> {
        match self.directory.find_by_id(subject_id).await {
            Ok(Some(user)) => Some(Identity::from_user(user)),
            Ok(None) => {
                tracing::debug!(subject_id, "token subject not found in directory");
                None
            }
            Err(err) => {
                tracing::warn!(subject_id, error = %err, "directory lookup failed, continuing without identity");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::authz::Role;
    use crate::errors::AppError;
    use crate::utils::utc_now;

    struct StaticDirectory {
        users: HashMap<i64, User>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.users.get(&id).cloned())
        }
    }

    struct BrokenDirectory;

    #[async_trait]
    impl UserDirectory for BrokenDirectory {
        async fn find_by_id(&self, _id: i64) -> AppResult<Option<User>> {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn user(id: i64, role: Role) -> User {
        let now = utc_now();
        User {
            id,
            email: format!("user{id}@example.com"),
            nickname: format!("user{id}"),
            role,
            verified: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn resolves_existing_subject_with_live_role() {
        let directory = Arc::new(StaticDirectory {
            users: HashMap::from([(1, user(1, Role::Manager))]),
            lookups: AtomicUsize::new(0),
        });
        let resolver = IdentityResolver::new(directory.clone());

        let identity = resolver.resolve(1).await.expect("identity");

        assert_eq!(identity.subject_id(), 1);
        assert_eq!(identity.role(), Role::Manager);
        assert_eq!(identity.nickname(), "user1");
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_subject_is_absence() {
        let directory = Arc::new(StaticDirectory {
            users: HashMap::new(),
            lookups: AtomicUsize::new(0),
        });
        let resolver = IdentityResolver::new(directory.clone());

        assert!(resolver.resolve(99).await.is_none());
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lookup_failure_is_absence() {
        let resolver = IdentityResolver::new(Arc::new(BrokenDirectory));

        assert!(resolver.resolve(1).await.is_none());
    }
}
