use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::role::Role;

pub mod db;

pub static USER_COLLECTION_NAME: &str = "user";
pub static ROLE_COLLECTION_NAME: &str = "role";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl ToString, name: impl ToString, photo_url: Option<String>) -> User {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new user with UUID: {}", id);

        User {
            id,
            email: email.to_string(),
            name: name.to_string(),
            photo_url,
            created_at: Utc::now(),
        }
    }
}

/// Role assignment, kept apart from the user document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    #[serde(with = "crate::util::uuid_string")]
    pub user_id: Uuid,
    pub role: Role,
    #[serde(default = "Utc::now")]
    pub granted_at: DateTime<Utc>,
}

impl RoleRecord {
    pub fn new(user_id: Uuid, role: Role) -> RoleRecord {
        RoleRecord {
            user_id,
            role,
            granted_at: Utc::now(),
        }
    }
}

/// A user joined with its role record, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserWithRole {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub role: Option<Role>,
}
