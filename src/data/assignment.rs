use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::problem::{problems, Problem};

pub static ASSIGNMENT_COLLECTION_NAME: &str = "assignment";
pub static SUBMISSION_COLLECTION_NAME: &str = "submission";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub class_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub teacher_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub marks: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentCreateData {
    pub class_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub marks: i32,
}

impl AssignmentCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.title.trim().is_empty() {
            return Err(problems::bad_request("Title can't be empty."));
        }
        if self.marks <= 0 {
            return Err(problems::bad_request("Marks must be positive."));
        }
        Ok(())
    }

    pub fn into_assignment(self, teacher_id: Uuid) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            class_id: self.class_id,
            teacher_id,
            title: self.title.trim().to_string(),
            description: self.description,
            deadline: self.deadline,
            marks: self.marks,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub assignment_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub class_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub student_id: Uuid,
    pub link: String,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionCreateData {
    pub assignment_id: Uuid,
    pub link: String,
}

impl SubmissionCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if self.link.trim().is_empty() {
            return Err(problems::bad_request("Submission link can't be empty."));
        }
        Ok(())
    }

    pub fn into_submission(self, class_id: Uuid, student_id: Uuid) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            assignment_id: self.assignment_id,
            class_id,
            student_id,
            link: self.link.trim().to_string(),
            submitted_at: Utc::now(),
        }
    }
}
