use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

pub static TEACHER_REQUEST_COLLECTION_NAME: &str = "teacherRequest";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRequest {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub user_id: Uuid,
    pub title: String,
    pub category: String,
    pub experience: String,
    pub status: RequestStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TeacherRequestCreateData {
    pub title: String,
    pub category: String,
    pub experience: String,
}

impl TeacherRequestCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.title.trim().is_empty() || self.category.trim().is_empty() {
            return Err(problems::bad_request("Title and category are required."));
        }
        Ok(())
    }

    pub fn into_request(self, user_id: Uuid) -> TeacherRequest {
        TeacherRequest {
            id: Uuid::new_v4(),
            user_id,
            title: self.title.trim().to_string(),
            category: self.category.trim().to_string(),
            experience: self.experience,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RequestStatusData {
    pub status: RequestStatus,
}

/// Row of `GET /teacher`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub experience: String,
    pub name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Role currently held by `user_id`, if the user exists and has one.
async fn current_role(store: &dyn Store, user_id: Uuid) -> Result<Option<Role>, StoreError> {
    Ok(match store.get_user(user_id).await? {
        Some(user) => store.user_with_role(&user.email).await?.and_then(|it| it.role),
        None => None,
    })
}

/// Moves a request to `status`; acceptance grants the teacher role unless
/// the applicant is an admin, who keeps the admin role.
pub async fn review(
    store: &dyn Store,
    id: Uuid,
    status: RequestStatus,
) -> Result<Option<TeacherRequest>, StoreError> {
    let request = match store.set_teacher_request_status(id, status).await? {
        Some(it) => it,
        None => return Ok(None),
    };

    if status == RequestStatus::Accepted {
        if current_role(store, request.user_id).await? == Some(Role::Admin) {
            tracing::info!("User {} is an admin, keeping the admin role", request.user_id);
        } else {
            store.set_role(request.user_id, Role::Teacher).await?;
            tracing::info!("Granted teacher role to user {}", request.user_id);
        }
    }

    Ok(Some(request))
}
