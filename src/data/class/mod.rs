use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

pub static CLASS_COLLECTION_NAME: &str = "class";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClassStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ClassStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassStatus::Pending => "pending",
            ClassStatus::Accepted => "accepted",
            ClassStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub teacher_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price: f64,
    pub status: ClassStatus,
    /// Number of enrollments, kept in step with the enrollment collection.
    #[serde(default)]
    pub total_enrollment: i64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Row of `GET /allClasses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassListing {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    pub title: String,
    pub teacher_name: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub total_enrollment: i64,
    pub status: ClassStatus,
}

/// Body of `GET /class/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetail {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    pub title: String,
    pub teacher_name: String,
    #[serde(default)]
    pub teacher_photo: Option<String>,
    /// Counted from enrollment records, independent of `total_enrollment`.
    pub total_student: i64,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub total_enrollment: i64,
}
