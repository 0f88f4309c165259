use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::enrollment::Enrollment;

pub static PAYMENT_COLLECTION_NAME: &str = "payment";

/// Append-only payment log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "_id", with = "crate::util::uuid_string")]
    pub id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub user_id: Uuid,
    pub email: String,
    #[serde(with = "crate::util::uuid_string")]
    pub class_id: Uuid,
    pub transaction_id: String,
    pub price: f64,
    pub date: DateTime<Utc>,
}

/// Result of the payment -> role -> enrollment -> counter transition.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentOutcome {
    Enrolled {
        enrollment: Enrollment,
        role_granted: bool,
    },
    AlreadyEnrolled,
    DuplicateTransaction,
}
