use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub static ENROLLMENT_COLLECTION_NAME: &str = "enrollClass";

/// Link between a student and a class, created once per confirmed payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub class_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub teacher_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub student_id: Uuid,
    #[serde(default = "Utc::now")]
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn new(student_id: Uuid, class_id: Uuid, teacher_id: Uuid) -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            class_id,
            teacher_id,
            student_id,
            enrolled_at: Utc::now(),
        }
    }
}

/// Row of `GET /enrollClasses/<student_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledClass {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub class_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub teacher_name: String,
}
