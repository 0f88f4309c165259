use tokio::sync::RwLock;
use uuid::Uuid;

use super::assignment::{Assignment, Submission};
use super::class::db::ClassUpdateData;
use super::class::{Class, ClassDetail, ClassListing, ClassStatus};
use super::enrollment::{EnrolledClass, Enrollment};
use super::feedback::{Feedback, FeedbackView};
use super::payment::{EnrollmentOutcome, Payment};
use super::teacher_request::{RequestStatus, TeacherProfile, TeacherRequest};
use super::user::{RoleRecord, User, UserWithRole};
use super::{Store, StoreError, Totals};
use crate::middleware::paging::PageState;
use crate::role::Role;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    roles: Vec<RoleRecord>,
    classes: Vec<Class>,
    enrollments: Vec<Enrollment>,
    payments: Vec<Payment>,
    assignments: Vec<Assignment>,
    submissions: Vec<Submission>,
    teacher_requests: Vec<TeacherRequest>,
    feedback: Vec<Feedback>,
}

impl Tables {
    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|it| it.id == id)
    }

    fn role_of(&self, user_id: Uuid) -> Option<Role> {
        self.roles
            .iter()
            .find(|it| it.user_id == user_id)
            .map(|it| it.role)
    }

    fn with_role(&self, user: &User) -> UserWithRole {
        UserWithRole {
            user: user.clone(),
            role: self.role_of(user.id),
        }
    }

    fn class_mut(&mut self, id: Uuid) -> Option<&mut Class> {
        self.classes.iter_mut().find(|it| it.id == id)
    }
}

/// Process-local store. Every operation holds the table lock for its whole
/// duration, so multi-step writes are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        tracing::info!("Using in-memory storage. Data won't survive restarts.");
        MemoryStore::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    pub async fn role_record_count(&self, user_id: Uuid) -> usize {
        let tables = self.tables.read().await;
        tables.roles.iter().filter(|it| it.user_id == user_id).count()
    }

    pub async fn enrollment_count(&self, student_id: Uuid, class_id: Uuid) -> usize {
        let tables = self.tables.read().await;
        tables
            .enrollments
            .iter()
            .filter(|it| it.student_id == student_id && it.class_id == class_id)
            .count()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

fn page_of<T: Clone>(items: impl Iterator<Item = T>, page: PageState) -> Vec<T> {
    items
        .skip(page.skip() as usize)
        .take(page.limit() as usize)
        .collect()
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn disconnect(&self) {
        tracing::info!("Dropping in-memory storage.");
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|it| it.email == email).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.user(id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|it| it.email == user.email) {
            return Err(StoreError::Duplicate("User"));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn list_users(&self, page: PageState) -> Result<Vec<UserWithRole>, StoreError> {
        let tables = self.tables.read().await;
        Ok(page_of(
            tables.users.iter().map(|it| tables.with_role(it)),
            page,
        ))
    }

    async fn user_with_role(&self, email: &str) -> Result<Option<UserWithRole>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|it| it.email == email)
            .map(|it| tables.with_role(it)))
    }

    async fn set_role(&self, user_id: Uuid, role: Role) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.roles.retain(|it| it.user_id != user_id);
        tables.roles.push(RoleRecord::new(user_id, role));
        Ok(())
    }

    async fn insert_class(&self, class: &Class) -> Result<(), StoreError> {
        self.tables.write().await.classes.push(class.clone());
        Ok(())
    }

    async fn get_class(&self, id: Uuid) -> Result<Option<Class>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.classes.iter().find(|it| it.id == id).cloned())
    }

    async fn update_class(&self, id: Uuid, update: &ClassUpdateData) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.class_mut(id) {
            Some(class) => {
                update.apply(class);
                true
            }
            None => false,
        })
    }

    async fn delete_class(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.classes.len();
        tables.classes.retain(|it| it.id != id);
        Ok(tables.classes.len() != before)
    }

    async fn set_class_status(&self, id: Uuid, status: ClassStatus) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.class_mut(id) {
            Some(class) => {
                class.status = status;
                true
            }
            None => false,
        })
    }

    async fn popular_classes(&self, limit: i64) -> Result<Vec<Class>, StoreError> {
        let tables = self.tables.read().await;
        let mut classes: Vec<Class> = tables
            .classes
            .iter()
            .filter(|it| it.status == ClassStatus::Accepted)
            .cloned()
            .collect();
        classes.sort_by(|a, b| b.total_enrollment.cmp(&a.total_enrollment));
        classes.truncate(limit.max(0) as usize);
        Ok(classes)
    }

    async fn accepted_classes(&self) -> Result<Vec<ClassListing>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .classes
            .iter()
            .filter(|it| it.status == ClassStatus::Accepted)
            .filter_map(|class| {
                let teacher = tables.user(class.teacher_id)?;
                Some(ClassListing {
                    id: class.id,
                    title: class.title.clone(),
                    teacher_name: teacher.name.clone(),
                    price: class.price,
                    description: class.description.clone(),
                    image_url: class.image_url.clone(),
                    total_enrollment: class.total_enrollment,
                    status: class.status,
                })
            })
            .collect())
    }

    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .classes
            .iter()
            .filter(|it| it.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    async fn all_classes(&self, page: PageState) -> Result<Vec<Class>, StoreError> {
        let tables = self.tables.read().await;
        Ok(page_of(tables.classes.iter().cloned(), page))
    }

    async fn class_detail(&self, id: Uuid) -> Result<Option<ClassDetail>, StoreError> {
        let tables = self.tables.read().await;
        let class = match tables.classes.iter().find(|it| it.id == id) {
            Some(it) => it,
            None => return Ok(None),
        };
        let teacher = match tables.user(class.teacher_id) {
            Some(it) => it,
            None => return Ok(None),
        };
        let total_student = tables
            .enrollments
            .iter()
            .filter(|it| it.class_id == id)
            .count() as i64;

        Ok(Some(ClassDetail {
            id: class.id,
            title: class.title.clone(),
            teacher_name: teacher.name.clone(),
            teacher_photo: teacher.photo_url.clone(),
            total_student,
            price: class.price,
            description: class.description.clone(),
            image_url: class.image_url.clone(),
            total_enrollment: class.total_enrollment,
        }))
    }

    async fn enroll_after_payment(
        &self,
        payment: &Payment,
        teacher_id: Uuid,
    ) -> Result<EnrollmentOutcome, StoreError> {
        let mut tables = self.tables.write().await;

        if tables
            .payments
            .iter()
            .any(|it| it.transaction_id == payment.transaction_id)
        {
            return Ok(EnrollmentOutcome::DuplicateTransaction);
        }
        if tables
            .enrollments
            .iter()
            .any(|it| it.student_id == payment.user_id && it.class_id == payment.class_id)
        {
            return Ok(EnrollmentOutcome::AlreadyEnrolled);
        }
        if tables.class_mut(payment.class_id).is_none() {
            return Err(StoreError::MissingClass(payment.class_id));
        }

        tables.payments.push(payment.clone());

        let role_granted = tables.role_of(payment.user_id).is_none();
        if role_granted {
            tables
                .roles
                .push(RoleRecord::new(payment.user_id, Role::Student));
        }

        let enrollment = Enrollment::new(payment.user_id, payment.class_id, teacher_id);
        tables.enrollments.push(enrollment.clone());

        if let Some(class) = tables.class_mut(payment.class_id) {
            class.total_enrollment += 1;
        }

        Ok(EnrollmentOutcome::Enrolled {
            enrollment,
            role_granted,
        })
    }

    async fn is_enrolled(&self, student_id: Uuid, class_id: Uuid) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .iter()
            .any(|it| it.student_id == student_id && it.class_id == class_id))
    }

    async fn enrolled_classes(&self, student_id: Uuid) -> Result<Vec<EnrolledClass>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .iter()
            .filter(|it| it.student_id == student_id)
            .filter_map(|enrollment| {
                let class = tables
                    .classes
                    .iter()
                    .find(|it| it.id == enrollment.class_id)?;
                let teacher = tables.user(enrollment.teacher_id)?;
                Some(EnrolledClass {
                    id: enrollment.id,
                    class_id: class.id,
                    title: class.title.clone(),
                    image_url: class.image_url.clone(),
                    teacher_name: teacher.name.clone(),
                })
            })
            .collect())
    }

    async fn payments_by_email(&self, email: &str) -> Result<Vec<Payment>, StoreError> {
        let tables = self.tables.read().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .iter()
            .filter(|it| it.email == email)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(payments)
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), StoreError> {
        self.tables.write().await.assignments.push(assignment.clone());
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.assignments.iter().find(|it| it.id == id).cloned())
    }

    async fn assignments_for_class(&self, class_id: Uuid) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignments
            .iter()
            .filter(|it| it.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        self.tables.write().await.submissions.push(submission.clone());
        Ok(())
    }

    async fn insert_teacher_request(&self, request: &TeacherRequest) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .teacher_requests
            .push(request.clone());
        Ok(())
    }

    async fn pending_teacher_requests(&self) -> Result<Vec<TeacherRequest>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .teacher_requests
            .iter()
            .filter(|it| it.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn set_teacher_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<Option<TeacherRequest>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .teacher_requests
            .iter_mut()
            .find(|it| it.id == id)
            .map(|request| {
                request.status = status;
                request.clone()
            }))
    }

    async fn accepted_teachers(&self) -> Result<Vec<TeacherProfile>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .teacher_requests
            .iter()
            .filter(|it| it.status == RequestStatus::Accepted)
            .filter_map(|request| {
                let user = tables.user(request.user_id)?;
                Some(TeacherProfile {
                    id: request.id,
                    title: request.title.clone(),
                    category: request.category.clone(),
                    experience: request.experience.clone(),
                    name: user.name.clone(),
                    photo_url: user.photo_url.clone(),
                })
            })
            .collect())
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError> {
        self.tables.write().await.feedback.push(feedback.clone());
        Ok(())
    }

    async fn feedback(&self) -> Result<Vec<FeedbackView>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .feedback
            .iter()
            .filter_map(|feedback| {
                let student = tables.user(feedback.student_id)?;
                let class = tables
                    .classes
                    .iter()
                    .find(|it| it.id == feedback.class_id)?;
                Some(FeedbackView {
                    id: feedback.id,
                    name: student.name.clone(),
                    photo_url: student.photo_url.clone(),
                    feedback_text: feedback.feedback_text.clone(),
                    rating: feedback.rating,
                    title: class.title.clone(),
                })
            })
            .collect())
    }

    async fn totals(&self) -> Result<Totals, StoreError> {
        let tables = self.tables.read().await;
        Ok(Totals {
            total_user: tables.users.len() as u64,
            total_class: tables.classes.len() as u64,
            total_enrollment: tables.enrollments.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn class_of(teacher: &User, status: ClassStatus, total_enrollment: i64) -> Class {
        Class {
            id: Uuid::new_v4(),
            teacher_id: teacher.id,
            title: format!("class with {}", total_enrollment),
            description: String::new(),
            image_url: None,
            price: 10.0,
            status,
            total_enrollment,
            created_at: Utc::now(),
        }
    }

    #[rocket::async_test]
    async fn duplicate_emails_are_rejected() {
        let store = MemoryStore::new();
        let user = User::new("a@example.com", "A", None);
        store.insert_user(&user).await.expect("first insert");

        let again = User::new("a@example.com", "Other A", None);
        assert!(matches!(
            store.insert_user(&again).await,
            Err(StoreError::Duplicate("User"))
        ));
        assert_eq!(store.user_count().await, 1);
    }

    #[rocket::async_test]
    async fn set_role_keeps_a_single_record() {
        let store = MemoryStore::new();
        let user = User::new("t@example.com", "T", None);
        store.insert_user(&user).await.unwrap();

        store.set_role(user.id, Role::Student).await.unwrap();
        store.set_role(user.id, Role::Teacher).await.unwrap();

        assert_eq!(store.role_record_count(user.id).await, 1);
        let joined = store.user_with_role("t@example.com").await.unwrap().unwrap();
        assert_eq!(joined.role, Some(Role::Teacher));
    }

    #[rocket::async_test]
    async fn popular_classes_are_accepted_and_sorted() {
        let store = MemoryStore::new();
        let teacher = User::new("teach@example.com", "Teach", None);
        store.insert_user(&teacher).await.unwrap();

        for (status, count) in [
            (ClassStatus::Accepted, 3),
            (ClassStatus::Pending, 50),
            (ClassStatus::Accepted, 9),
            (ClassStatus::Accepted, 1),
        ] {
            store
                .insert_class(&class_of(&teacher, status, count))
                .await
                .unwrap();
        }

        let popular = store.popular_classes(2).await.unwrap();
        let counts: Vec<i64> = popular.iter().map(|it| it.total_enrollment).collect();
        assert_eq!(counts, vec![9, 3]);
    }
}
