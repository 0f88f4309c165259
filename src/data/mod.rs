//! Data access.
//!
//! Handlers never touch a database driver directly; they go through the
//! [`Store`] trait, which Rocket manages as [`Db`]. `MongoStore` backs
//! production, `MemoryStore` backs tests and `storage: memory` runs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::paging::PageState;
use crate::role::Role;

pub mod assignment;
pub mod class;
pub mod enrollment;
pub mod feedback;
pub mod filter;
pub mod memory;
pub mod mongo;
pub mod payment;
pub mod teacher_request;
pub mod user;

use assignment::{Assignment, Submission};
use class::db::ClassUpdateData;
use class::{Class, ClassDetail, ClassListing, ClassStatus};
use enrollment::EnrolledClass;
use feedback::{Feedback, FeedbackView};
use payment::{EnrollmentOutcome, Payment};
use teacher_request::{RequestStatus, TeacherProfile, TeacherRequest};
use user::{User, UserWithRole};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    BsonDe(#[from] bson::de::Error),
    #[error(transparent)]
    BsonSer(#[from] bson::ser::Error),
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("class {0} doesn't exist")]
    MissingClass(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_user: u64,
    pub total_class: u64,
    pub total_enrollment: u64,
}

pub type Db = Arc<dyn Store>;

#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Releases connections. Called once from the shutdown fairing.
    async fn disconnect(&self);

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn list_users(&self, page: PageState) -> Result<Vec<UserWithRole>, StoreError>;

    /// Joins the user owning `email` to its role record.
    async fn user_with_role(&self, email: &str) -> Result<Option<UserWithRole>, StoreError>;
    /// Creates or replaces the user's single role record.
    async fn set_role(&self, user_id: Uuid, role: Role) -> Result<(), StoreError>;

    async fn insert_class(&self, class: &Class) -> Result<(), StoreError>;
    async fn get_class(&self, id: Uuid) -> Result<Option<Class>, StoreError>;
    async fn update_class(&self, id: Uuid, update: &ClassUpdateData) -> Result<bool, StoreError>;
    async fn delete_class(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn set_class_status(&self, id: Uuid, status: ClassStatus) -> Result<bool, StoreError>;
    /// Accepted classes ordered by enrollment count, most popular first.
    async fn popular_classes(&self, limit: i64) -> Result<Vec<Class>, StoreError>;
    async fn accepted_classes(&self) -> Result<Vec<ClassListing>, StoreError>;
    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError>;
    async fn all_classes(&self, page: PageState) -> Result<Vec<Class>, StoreError>;
    async fn class_detail(&self, id: Uuid) -> Result<Option<ClassDetail>, StoreError>;

    /// Records `payment`, grants the student role when the payer has none,
    /// enrolls the payer and bumps the class counter, all or nothing.
    ///
    /// Nothing is written when the transaction id was seen before or the
    /// payer is already enrolled in the class.
    async fn enroll_after_payment(
        &self,
        payment: &Payment,
        teacher_id: Uuid,
    ) -> Result<EnrollmentOutcome, StoreError>;
    async fn is_enrolled(&self, student_id: Uuid, class_id: Uuid) -> Result<bool, StoreError>;
    async fn enrolled_classes(&self, student_id: Uuid) -> Result<Vec<EnrolledClass>, StoreError>;
    async fn payments_by_email(&self, email: &str) -> Result<Vec<Payment>, StoreError>;

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), StoreError>;
    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError>;
    async fn assignments_for_class(&self, class_id: Uuid) -> Result<Vec<Assignment>, StoreError>;
    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError>;

    async fn insert_teacher_request(&self, request: &TeacherRequest) -> Result<(), StoreError>;
    async fn pending_teacher_requests(&self) -> Result<Vec<TeacherRequest>, StoreError>;
    async fn set_teacher_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<Option<TeacherRequest>, StoreError>;
    async fn accepted_teachers(&self) -> Result<Vec<TeacherProfile>, StoreError>;

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError>;
    async fn feedback(&self) -> Result<Vec<FeedbackView>, StoreError>;

    async fn totals(&self) -> Result<Totals, StoreError>;
}
