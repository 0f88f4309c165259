use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::resp::problem::{problems, Problem};

pub static FEEDBACK_COLLECTION_NAME: &str = "feedback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub class_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub student_id: Uuid,
    pub feedback_text: String,
    pub rating: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackCreateData {
    pub class_id: Uuid,
    pub feedback_text: String,
    pub rating: i32,
}

impl FeedbackCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if !(1..=5).contains(&self.rating) {
            return Err(problems::bad_request("Rating must be between 1 and 5.")
                .insert("rating", self.rating)
                .clone());
        }
        if self.feedback_text.trim().is_empty() {
            return Err(problems::bad_request("Feedback can't be empty."));
        }
        Ok(())
    }

    pub fn into_feedback(self, student_id: Uuid) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            class_id: self.class_id,
            student_id,
            feedback_text: self.feedback_text.trim().to_string(),
            rating: self.rating,
            created_at: Utc::now(),
        }
    }
}

/// Feedback joined with the student's and class's names, as shown publicly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub feedback_text: String,
    pub rating: i32,
    pub title: String,
}
