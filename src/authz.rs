//! Role resolution.
//!
//! A verified token only proves an email address. [`resolve`] turns it into a
//! [`Principal`] by joining the user to its role record, which route guards
//! then check against the role they require.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::{Store, StoreError};
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

/// A caller whose identity was matched to a stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Option<Role>,
}

impl Principal {
    pub fn has(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has(Role::Admin)
    }

    /// Fails with 403 unless the principal holds exactly `role`.
    pub fn require(&self, role: Role) -> Result<(), Problem> {
        match self.role {
            Some(it) if it == role => Ok(()),
            Some(it) => {
                tracing::debug!("{} is {} but {} is required", self.email, it, role);
                Err(problems::forbidden(format!("Requires {} role.", role))
                    .insert("role", it)
                    .clone())
            }
            None => {
                tracing::debug!("{} has no role record, {} is required", self.email, role);
                Err(problems::forbidden(format!("Requires {} role.", role)))
            }
        }
    }

    /// Allows the owner of `email` and admins.
    pub fn require_self_or_admin(&self, email: &str) -> Result<(), Problem> {
        if self.email == email || self.is_admin() {
            return Ok(());
        }
        Err(problems::forbidden("Only the owner or an admin can access this resource."))
    }

    /// Allows the user with `user_id` and admins.
    pub fn require_user_or_admin(&self, user_id: Uuid) -> Result<(), Problem> {
        if self.user_id == user_id || self.is_admin() {
            return Ok(());
        }
        Err(problems::forbidden("Only the owner or an admin can access this resource."))
    }
}

/// Joins the user owning `email` to its role record.
///
/// `Ok(None)` means no such user exists.
pub async fn resolve(store: &dyn Store, email: &str) -> Result<Option<Principal>, StoreError> {
    let joined = match store.user_with_role(email).await? {
        Some(it) => it,
        None => return Ok(None),
    };

    Ok(Some(Principal {
        user_id: joined.user.id,
        email: joined.user.email,
        name: joined.user.name,
        role: joined.role,
    }))
}

/// Like [`resolve`], but an unknown user is a 403.
pub async fn resolve_known(store: &dyn Store, email: &str) -> Result<Principal, Problem> {
    resolve(store, email)
        .await?
        .ok_or_else(|| problems::forbidden("No user is registered for this identity."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::data::user::User;
    use rocket::http::Status;

    async fn store_with(email: &str, role: Option<Role>) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let user = User::new(email, "Some One", None);
        store.insert_user(&user).await.unwrap();
        if let Some(role) = role {
            store.set_role(user.id, role).await.unwrap();
        }
        (store, user.id)
    }

    #[rocket::async_test]
    async fn resolves_user_with_role() {
        let (store, id) = store_with("t@example.com", Some(Role::Teacher)).await;

        let principal = resolve(&store, "t@example.com").await.unwrap().unwrap();
        assert_eq!(principal.user_id, id);
        assert_eq!(principal.role, Some(Role::Teacher));
        assert!(principal.require(Role::Teacher).is_ok());

        let err = principal.require(Role::Admin).unwrap_err();
        assert_eq!(err.status, Status::Forbidden);
    }

    #[rocket::async_test]
    async fn missing_role_record_is_forbidden() {
        let (store, _) = store_with("new@example.com", None).await;

        let principal = resolve(&store, "new@example.com").await.unwrap().unwrap();
        assert_eq!(principal.role, None);
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert_eq!(principal.require(role).unwrap_err().status, Status::Forbidden);
        }
    }

    #[rocket::async_test]
    async fn unknown_user_is_forbidden() {
        let store = MemoryStore::new();

        assert!(resolve(&store, "ghost@example.com").await.unwrap().is_none());
        let err = resolve_known(&store, "ghost@example.com").await.unwrap_err();
        assert_eq!(err.status, Status::Forbidden);
    }

    #[rocket::async_test]
    async fn admins_pass_ownership_checks() {
        let (store, _) = store_with("boss@example.com", Some(Role::Admin)).await;
        let admin = resolve(&store, "boss@example.com").await.unwrap().unwrap();
        assert!(admin.require_self_or_admin("someone@example.com").is_ok());
        assert!(admin.require_user_or_admin(Uuid::new_v4()).is_ok());

        let (store, id) = store_with("s@example.com", Some(Role::Student)).await;
        let student = resolve(&store, "s@example.com").await.unwrap().unwrap();
        assert!(student.require_self_or_admin("s@example.com").is_ok());
        assert!(student.require_user_or_admin(id).is_ok());
        assert!(student.require_self_or_admin("other@example.com").is_err());
        assert!(student.require_user_or_admin(Uuid::new_v4()).is_err());
    }
}
