use bson::{doc, Document};
use mongodb::error::{
    ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT,
};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, UpdateOptions,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::assignment::{
    Assignment, Submission, ASSIGNMENT_COLLECTION_NAME, SUBMISSION_COLLECTION_NAME,
};
use super::class::db::ClassUpdateData;
use super::class::{Class, ClassDetail, ClassListing, ClassStatus, CLASS_COLLECTION_NAME};
use super::enrollment::{EnrolledClass, Enrollment, ENROLLMENT_COLLECTION_NAME};
use super::feedback::{Feedback, FeedbackView, FEEDBACK_COLLECTION_NAME};
use super::filter;
use super::payment::{EnrollmentOutcome, Payment, PAYMENT_COLLECTION_NAME};
use super::teacher_request::{
    RequestStatus, TeacherProfile, TeacherRequest, TEACHER_REQUEST_COLLECTION_NAME,
};
use super::user::{RoleRecord, User, UserWithRole, ROLE_COLLECTION_NAME, USER_COLLECTION_NAME};
use super::{Store, StoreError, Totals};
use crate::middleware::paging::PageState;
use crate::role::Role;

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

fn duplicate_as(what: &'static str) -> impl FnOnce(mongodb::error::Error) -> StoreError {
    move |e| {
        if is_duplicate_key(&e) {
            StoreError::Duplicate(what)
        } else {
            StoreError::Database(e)
        }
    }
}

/// Concurrent enrollments in one class conflict on its counter; the losers
/// are rerun this many times in total before giving up.
const MAX_TRANSACTION_ATTEMPTS: usize = 5;

fn is_transient(e: &StoreError) -> bool {
    matches!(e, StoreError::Database(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

/// Commits, retrying while the server can't tell whether the commit landed.
async fn commit_with_retry(session: &mut ClientSession) -> Result<(), StoreError> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Ok(()) => return Ok(()),
            Err(e)
                if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && attempt < MAX_TRANSACTION_ATTEMPTS =>
            {
                tracing::debug!("Commit result unknown (attempt {}), retrying", attempt);
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// User document as produced by a `$lookup` of its role records.
#[derive(Debug, Deserialize)]
struct UserRoles {
    #[serde(flatten)]
    user: User,
    #[serde(default)]
    roles: Vec<RoleRecord>,
}

impl From<UserRoles> for UserWithRole {
    fn from(joined: UserRoles) -> Self {
        UserWithRole {
            user: joined.user,
            role: joined.roles.first().map(|it| it.role),
        }
    }
}

fn lookup_roles() -> Document {
    doc! {
        "$lookup": {
            "from": ROLE_COLLECTION_NAME,
            "localField": "_id",
            "foreignField": "userId",
            "as": "roles",
        }
    }
}

pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> Result<MongoStore, StoreError> {
        tracing::info!("Connecting to MongoDB: {}", uri);
        let client = Client::with_uri_str(uri).await?;

        tracing::info!("Using MongoDB database: {}", db_name);
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }, None).await?;

        let store = MongoStore { client, db };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.users()
            .create_index(unique(doc! { "email": 1 }), None)
            .await?;
        self.roles()
            .create_index(unique(doc! { "userId": 1 }), None)
            .await?;
        self.enrollments()
            .create_index(unique(doc! { "studentId": 1, "classId": 1 }), None)
            .await?;
        self.payments()
            .create_index(unique(doc! { "transactionId": 1 }), None)
            .await?;

        tracing::debug!("MongoDB unique indexes in place");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USER_COLLECTION_NAME)
    }
    fn roles(&self) -> Collection<RoleRecord> {
        self.db.collection(ROLE_COLLECTION_NAME)
    }
    fn classes(&self) -> Collection<Class> {
        self.db.collection(CLASS_COLLECTION_NAME)
    }
    fn enrollments(&self) -> Collection<Enrollment> {
        self.db.collection(ENROLLMENT_COLLECTION_NAME)
    }
    fn payments(&self) -> Collection<Payment> {
        self.db.collection(PAYMENT_COLLECTION_NAME)
    }
    fn assignments(&self) -> Collection<Assignment> {
        self.db.collection(ASSIGNMENT_COLLECTION_NAME)
    }
    fn submissions(&self) -> Collection<Submission> {
        self.db.collection(SUBMISSION_COLLECTION_NAME)
    }
    fn teacher_requests(&self) -> Collection<TeacherRequest> {
        self.db.collection(TEACHER_REQUEST_COLLECTION_NAME)
    }
    fn feedback_entries(&self) -> Collection<Feedback> {
        self.db.collection(FEEDBACK_COLLECTION_NAME)
    }

    async fn aggregate<T: DeserializeOwned>(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<T>, StoreError> {
        let documents: Vec<Document> = self
            .db
            .collection::<Document>(collection)
            .aggregate(pipeline, None)
            .await?
            .try_collect()
            .await?;

        documents
            .into_iter()
            .map(|it| bson::from_document(it).map_err(StoreError::from))
            .collect()
    }

    async fn find_all<T>(
        collection: Collection<T>,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        Ok(collection
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn enroll_in_session(
        &self,
        session: &mut ClientSession,
        payment: &Payment,
        teacher_id: Uuid,
    ) -> Result<EnrollmentOutcome, StoreError> {
        let seen = self
            .payments()
            .find_one_with_session(
                doc! { "transactionId": payment.transaction_id.as_str() },
                None,
                session,
            )
            .await?;
        if seen.is_some() {
            return Ok(EnrollmentOutcome::DuplicateTransaction);
        }

        let enrolled = self
            .enrollments()
            .find_one_with_session(
                filter::enrollment_of(payment.user_id, payment.class_id),
                None,
                session,
            )
            .await?;
        if enrolled.is_some() {
            return Ok(EnrollmentOutcome::AlreadyEnrolled);
        }

        self.payments()
            .insert_one_with_session(payment, None, session)
            .await?;

        let role_granted = self
            .roles()
            .find_one_with_session(filter::by_user(payment.user_id), None, session)
            .await?
            .is_none();
        if role_granted {
            self.roles()
                .insert_one_with_session(
                    RoleRecord::new(payment.user_id, Role::Student),
                    None,
                    session,
                )
                .await?;
        }

        let enrollment = Enrollment::new(payment.user_id, payment.class_id, teacher_id);
        self.enrollments()
            .insert_one_with_session(&enrollment, None, session)
            .await?;

        let counted = self
            .classes()
            .update_one_with_session(
                filter::by_id(payment.class_id),
                doc! { "$inc": { "totalEnrollment": 1_i64 } },
                None,
                session,
            )
            .await?;
        if counted.matched_count == 0 {
            return Err(StoreError::MissingClass(payment.class_id));
        }

        Ok(EnrollmentOutcome::Enrolled {
            enrollment,
            role_granted,
        })
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn disconnect(&self) {
        tracing::info!("Disconnecting from MongoDB...");
        self.client.clone().shutdown().await;
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(filter::by_email(email), None).await?)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(filter::by_id(id), None).await?)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users()
            .insert_one(user, None)
            .await
            .map_err(duplicate_as("User"))?;
        Ok(())
    }

    async fn list_users(&self, page: PageState) -> Result<Vec<UserWithRole>, StoreError> {
        let joined: Vec<UserRoles> = self
            .aggregate(
                USER_COLLECTION_NAME,
                vec![
                    doc! { "$sort": { "createdAt": 1 } },
                    doc! { "$skip": page.skip() as i64 },
                    doc! { "$limit": page.limit() },
                    lookup_roles(),
                ],
            )
            .await?;
        Ok(joined.into_iter().map(UserWithRole::from).collect())
    }

    async fn user_with_role(&self, email: &str) -> Result<Option<UserWithRole>, StoreError> {
        let joined: Vec<UserRoles> = self
            .aggregate(
                USER_COLLECTION_NAME,
                vec![
                    doc! { "$match": filter::by_email(email) },
                    doc! { "$limit": 1 },
                    lookup_roles(),
                ],
            )
            .await?;
        Ok(joined.into_iter().next().map(UserWithRole::from))
    }

    async fn set_role(&self, user_id: Uuid, role: Role) -> Result<(), StoreError> {
        let record = bson::to_document(&RoleRecord::new(user_id, role))?;
        self.roles()
            .update_one(
                filter::by_user(user_id),
                doc! { "$set": record },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    async fn insert_class(&self, class: &Class) -> Result<(), StoreError> {
        self.classes().insert_one(class, None).await?;
        Ok(())
    }

    async fn get_class(&self, id: Uuid) -> Result<Option<Class>, StoreError> {
        Ok(self.classes().find_one(filter::by_id(id), None).await?)
    }

    async fn update_class(&self, id: Uuid, update: &ClassUpdateData) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(self.get_class(id).await?.is_some());
        }
        let changes = bson::to_document(update)?;
        let result = self
            .classes()
            .update_one(filter::by_id(id), doc! { "$set": changes }, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_class(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = self.classes().delete_one(filter::by_id(id), None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn set_class_status(&self, id: Uuid, status: ClassStatus) -> Result<bool, StoreError> {
        let result = self
            .classes()
            .update_one(
                filter::by_id(id),
                doc! { "$set": { "status": status.as_str() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn popular_classes(&self, limit: i64) -> Result<Vec<Class>, StoreError> {
        Self::find_all(
            self.classes(),
            doc! { "status": ClassStatus::Accepted.as_str() },
            FindOptions::builder()
                .sort(doc! { "totalEnrollment": -1 })
                .limit(limit)
                .build(),
        )
        .await
    }

    async fn accepted_classes(&self) -> Result<Vec<ClassListing>, StoreError> {
        let mut pipeline = vec![doc! { "$match": { "status": ClassStatus::Accepted.as_str() } }];
        pipeline.extend(filter::join_one(USER_COLLECTION_NAME, "teacherId", "teacher"));
        pipeline.push(doc! {
            "$project": {
                "_id": 1,
                "title": 1,
                "teacherName": "$teacher.name",
                "price": 1,
                "description": 1,
                "imageUrl": 1,
                "totalEnrollment": 1,
                "status": 1,
            }
        });
        self.aggregate(CLASS_COLLECTION_NAME, pipeline).await
    }

    async fn classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>, StoreError> {
        Self::find_all(
            self.classes(),
            doc! { "teacherId": teacher_id.to_string() },
            FindOptions::builder().sort(doc! { "createdAt": -1 }).build(),
        )
        .await
    }

    async fn all_classes(&self, page: PageState) -> Result<Vec<Class>, StoreError> {
        Self::find_all(
            self.classes(),
            doc! {},
            FindOptions::builder()
                .sort(doc! { "createdAt": -1 })
                .skip(page.skip())
                .limit(page.limit())
                .build(),
        )
        .await
    }

    async fn class_detail(&self, id: Uuid) -> Result<Option<ClassDetail>, StoreError> {
        let mut pipeline = vec![doc! { "$match": filter::by_id(id) }];
        pipeline.extend(filter::join_one(USER_COLLECTION_NAME, "teacherId", "teacher"));
        pipeline.push(doc! {
            "$lookup": {
                "from": ENROLLMENT_COLLECTION_NAME,
                "localField": "_id",
                "foreignField": "classId",
                "as": "classEnrollment",
            }
        });
        pipeline.push(doc! {
            "$project": {
                "_id": 1,
                "title": 1,
                "teacherName": "$teacher.name",
                "teacherPhoto": "$teacher.photoUrl",
                "totalStudent": { "$size": "$classEnrollment" },
                "price": 1,
                "description": 1,
                "imageUrl": 1,
                "totalEnrollment": 1,
            }
        });

        let details: Vec<ClassDetail> = self.aggregate(CLASS_COLLECTION_NAME, pipeline).await?;
        Ok(details.into_iter().next())
    }

    async fn enroll_after_payment(
        &self,
        payment: &Payment,
        teacher_id: Uuid,
    ) -> Result<EnrollmentOutcome, StoreError> {
        let mut session = self.client.start_session(None).await?;
        let mut attempt = 1;

        loop {
            session.start_transaction(None).await?;

            let result = match self.enroll_in_session(&mut session, payment, teacher_id).await {
                Ok(outcome @ EnrollmentOutcome::Enrolled { .. }) => {
                    commit_with_retry(&mut session).await.map(|()| outcome)
                }
                Ok(outcome) => {
                    session.abort_transaction().await?;
                    return Ok(outcome);
                }
                Err(e) => {
                    if let Err(abort) = session.abort_transaction().await {
                        tracing::debug!("Unable to abort enrollment transaction: {}", abort);
                    }
                    Err(e)
                }
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(e) if is_transient(&e) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(
                        "Enrollment transaction for {} conflicted (attempt {}), retrying",
                        payment.transaction_id,
                        attempt
                    );
                    attempt += 1;
                }
                Err(StoreError::Database(e)) => return Err(duplicate_as("Enrollment")(e)),
                Err(other) => return Err(other),
            }
        }
    }

    async fn is_enrolled(&self, student_id: Uuid, class_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .enrollments()
            .find_one(filter::enrollment_of(student_id, class_id), None)
            .await?
            .is_some())
    }

    async fn enrolled_classes(&self, student_id: Uuid) -> Result<Vec<EnrolledClass>, StoreError> {
        let mut pipeline = vec![doc! { "$match": { "studentId": student_id.to_string() } }];
        pipeline.extend(filter::join_one(CLASS_COLLECTION_NAME, "classId", "enrolledClass"));
        pipeline.extend(filter::join_one(USER_COLLECTION_NAME, "teacherId", "teacher"));
        pipeline.push(doc! {
            "$project": {
                "_id": 1,
                "classId": 1,
                "title": "$enrolledClass.title",
                "imageUrl": "$enrolledClass.imageUrl",
                "teacherName": "$teacher.name",
            }
        });
        self.aggregate(ENROLLMENT_COLLECTION_NAME, pipeline).await
    }

    async fn payments_by_email(&self, email: &str) -> Result<Vec<Payment>, StoreError> {
        Self::find_all(
            self.payments(),
            filter::by_email(email),
            FindOptions::builder().sort(doc! { "date": -1 }).build(),
        )
        .await
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<(), StoreError> {
        self.assignments().insert_one(assignment, None).await?;
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        Ok(self.assignments().find_one(filter::by_id(id), None).await?)
    }

    async fn assignments_for_class(&self, class_id: Uuid) -> Result<Vec<Assignment>, StoreError> {
        Self::find_all(
            self.assignments(),
            doc! { "classId": class_id.to_string() },
            FindOptions::builder().sort(doc! { "deadline": 1 }).build(),
        )
        .await
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        self.submissions().insert_one(submission, None).await?;
        Ok(())
    }

    async fn insert_teacher_request(&self, request: &TeacherRequest) -> Result<(), StoreError> {
        self.teacher_requests().insert_one(request, None).await?;
        Ok(())
    }

    async fn pending_teacher_requests(&self) -> Result<Vec<TeacherRequest>, StoreError> {
        Self::find_all(
            self.teacher_requests(),
            doc! { "status": RequestStatus::Pending.as_str() },
            None,
        )
        .await
    }

    async fn set_teacher_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<Option<TeacherRequest>, StoreError> {
        Ok(self
            .teacher_requests()
            .find_one_and_update(
                filter::by_id(id),
                doc! { "$set": { "status": status.as_str() } },
                FindOneAndUpdateOptions::builder()
                    .return_document(ReturnDocument::After)
                    .build(),
            )
            .await?)
    }

    async fn accepted_teachers(&self) -> Result<Vec<TeacherProfile>, StoreError> {
        let mut pipeline =
            vec![doc! { "$match": { "status": RequestStatus::Accepted.as_str() } }];
        pipeline.extend(filter::join_one(USER_COLLECTION_NAME, "userId", "teacherInfo"));
        pipeline.push(doc! {
            "$project": {
                "_id": 1,
                "title": 1,
                "category": 1,
                "experience": 1,
                "name": "$teacherInfo.name",
                "photoUrl": "$teacherInfo.photoUrl",
            }
        });
        self.aggregate(TEACHER_REQUEST_COLLECTION_NAME, pipeline)
            .await
    }

    async fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError> {
        self.feedback_entries().insert_one(feedback, None).await?;
        Ok(())
    }

    async fn feedback(&self) -> Result<Vec<FeedbackView>, StoreError> {
        let mut pipeline = Vec::new();
        pipeline.extend(filter::join_one(USER_COLLECTION_NAME, "studentId", "studentInfo"));
        pipeline.extend(filter::join_one(CLASS_COLLECTION_NAME, "classId", "classInfo"));
        pipeline.push(doc! {
            "$project": {
                "_id": 1,
                "name": "$studentInfo.name",
                "photoUrl": "$studentInfo.photoUrl",
                "feedbackText": 1,
                "rating": 1,
                "title": "$classInfo.title",
            }
        });
        self.aggregate(FEEDBACK_COLLECTION_NAME, pipeline).await
    }

    async fn totals(&self) -> Result<Totals, StoreError> {
        Ok(Totals {
            total_user: self.users().estimated_document_count(None).await?,
            total_class: self.classes().estimated_document_count(None).await?,
            total_enrollment: self.enrollments().estimated_document_count(None).await?,
        })
    }
}
