//! Turning a confirmed payment into an enrollment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::http::Status;
use serde::{Deserialize, Serialize};
use tracing_futures::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::class::ClassStatus;
use crate::data::payment::{EnrollmentOutcome, Payment};
use crate::data::Store;
use crate::mail::{Mailer, PaymentReceipt};
use crate::resp::problem::{problems, Problem};

/// A payment the gateway reported as settled.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub email: String,
    pub class_id: Uuid,
    pub transaction_id: String,
    pub price: f64,
    pub date: DateTime<Utc>,
}

impl PaymentConfirmation {
    fn validate(&self) -> Result<(), Problem> {
        if self.transaction_id.trim().is_empty() {
            return Err(problems::bad_request("Transaction id is required."));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(problems::bad_request("Price must be a positive amount.")
                .insert("price", self.price)
                .clone());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReceipt {
    #[serde(with = "crate::util::uuid_string")]
    pub enrollment_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub class_id: Uuid,
    #[serde(with = "crate::util::uuid_string")]
    pub student_id: Uuid,
    pub transaction_id: String,
    /// Whether this payment gave the payer their student role.
    pub role_granted: bool,
}

/// Records the payment and enrolls the payer.
///
/// The store applies payment, role, enrollment and counter as one unit. A
/// transaction id seen before, or a payer already enrolled in the class,
/// yields 409 and changes nothing. The confirmation mail goes out in the
/// background once the enrollment is committed.
pub async fn complete_payment(
    store: &dyn Store,
    mailer: Arc<dyn Mailer>,
    confirmation: PaymentConfirmation,
) -> Result<EnrollmentReceipt, Problem> {
    confirmation.validate()?;

    let user = store
        .find_user_by_email(&confirmation.email)
        .await?
        .ok_or_else(|| problems::not_found("User", &confirmation.email))?;

    let class = store
        .get_class(confirmation.class_id)
        .await?
        .ok_or_else(|| problems::not_found("Class", confirmation.class_id))?;

    if class.status != ClassStatus::Accepted {
        return Err(Problem::new_untyped(
            Status::BadRequest,
            "Class isn't open for enrollment.",
        )
        .insert("status", class.status)
        .clone());
    }

    let payment = Payment {
        id: Uuid::new_v4(),
        user_id: user.id,
        email: user.email.clone(),
        class_id: class.id,
        transaction_id: confirmation.transaction_id.clone(),
        price: confirmation.price,
        date: confirmation.date,
    };

    let (enrollment, role_granted) = match store.enroll_after_payment(&payment, class.teacher_id).await? {
        EnrollmentOutcome::Enrolled {
            enrollment,
            role_granted,
        } => (enrollment, role_granted),
        EnrollmentOutcome::AlreadyEnrolled => {
            tracing::info!("{} is already enrolled in {}", user.email, class.id);
            return Err(problems::conflict("Already enrolled in this class.")
                .insert_str("classId", class.id)
                .clone());
        }
        EnrollmentOutcome::DuplicateTransaction => {
            tracing::info!("transaction {} was already processed", payment.transaction_id);
            return Err(problems::conflict("Transaction was already processed.")
                .insert_str("transactionId", &payment.transaction_id)
                .clone());
        }
    };

    tracing::info!(
        "Enrolled {} in class {} (transaction {})",
        user.email,
        class.id,
        payment.transaction_id
    );

    let mail = PaymentReceipt {
        recipient: user.email,
        transaction_id: payment.transaction_id.clone(),
        course_title: class.title,
        price: payment.price,
    };
    let span = tracing::info_span!("payment_confirmation", transaction_id = %mail.transaction_id);
    tokio::spawn(
        async move {
            if let Err(e) = mailer.send_payment_confirmation(&mail).await {
                tracing::warn!("Unable to send payment confirmation to {}: {}", mail.recipient, e);
            }
        }
        .instrument(span),
    );

    Ok(EnrollmentReceipt {
        enrollment_id: enrollment.id,
        class_id: enrollment.class_id,
        student_id: enrollment.student_id,
        transaction_id: payment.transaction_id,
        role_granted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryStore;
    use crate::role::Role;
    use crate::test_util::{seed_class, seed_user, FailingMailer, RecordingMailer};

    fn confirmation(email: &str, class_id: Uuid, tx: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            email: email.to_string(),
            class_id,
            transaction_id: tx.to_string(),
            price: 25.0,
            date: Utc::now(),
        }
    }

    #[rocket::async_test]
    async fn payment_enrolls_once_and_counts() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let teacher = seed_user(&store, "t@example.com", Some(Role::Teacher)).await;
        let student = seed_user(&store, "s@example.com", None).await;
        let class = seed_class(&store, teacher.id, ClassStatus::Accepted).await;

        let receipt = complete_payment(&store, mailer.clone(), confirmation("s@example.com", class.id, "tx-1"))
            .await
            .expect("first payment enrolls");

        assert_eq!(receipt.student_id, student.id);
        assert!(receipt.role_granted);
        assert_eq!(store.enrollment_count(student.id, class.id).await, 1);
        assert_eq!(store.get_class(class.id).await.unwrap().unwrap().total_enrollment, 1);
        assert!(store.is_enrolled(student.id, class.id).await.unwrap());

        let sent = mailer.wait_for(1).await;
        assert_eq!(sent[0].transaction_id, "tx-1");
        assert_eq!(sent[0].course_title, class.title);
    }

    #[rocket::async_test]
    async fn repeats_are_conflicts_without_side_effects() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let teacher = seed_user(&store, "t@example.com", Some(Role::Teacher)).await;
        let student = seed_user(&store, "s@example.com", None).await;
        let class = seed_class(&store, teacher.id, ClassStatus::Accepted).await;
        let other = seed_class(&store, teacher.id, ClassStatus::Accepted).await;

        complete_payment(&store, mailer.clone(), confirmation("s@example.com", class.id, "tx-1"))
            .await
            .unwrap();

        let same_tx = complete_payment(&store, mailer.clone(), confirmation("s@example.com", other.id, "tx-1"))
            .await
            .unwrap_err();
        assert_eq!(same_tx.status, Status::Conflict);

        let same_pair = complete_payment(&store, mailer.clone(), confirmation("s@example.com", class.id, "tx-2"))
            .await
            .unwrap_err();
        assert_eq!(same_pair.status, Status::Conflict);

        assert_eq!(store.payment_count().await, 1);
        assert_eq!(store.enrollment_count(student.id, class.id).await, 1);
        assert_eq!(store.enrollment_count(student.id, other.id).await, 0);
        assert_eq!(store.get_class(class.id).await.unwrap().unwrap().total_enrollment, 1);
        assert_eq!(store.get_class(other.id).await.unwrap().unwrap().total_enrollment, 0);
    }

    #[rocket::async_test]
    async fn student_role_is_granted_only_once() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let teacher = seed_user(&store, "t@example.com", Some(Role::Teacher)).await;
        let student = seed_user(&store, "s@example.com", None).await;
        let first = seed_class(&store, teacher.id, ClassStatus::Accepted).await;
        let second = seed_class(&store, teacher.id, ClassStatus::Accepted).await;

        let a = complete_payment(&store, mailer.clone(), confirmation("s@example.com", first.id, "tx-a"))
            .await
            .unwrap();
        let b = complete_payment(&store, mailer.clone(), confirmation("s@example.com", second.id, "tx-b"))
            .await
            .unwrap();

        assert!(a.role_granted);
        assert!(!b.role_granted);
        assert_eq!(store.role_record_count(student.id).await, 1);
    }

    #[rocket::async_test]
    async fn existing_role_is_left_alone() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let teacher = seed_user(&store, "t@example.com", Some(Role::Teacher)).await;
        let admin = seed_user(&store, "a@example.com", Some(Role::Admin)).await;
        let class = seed_class(&store, teacher.id, ClassStatus::Accepted).await;

        let receipt = complete_payment(&store, mailer, confirmation("a@example.com", class.id, "tx-a"))
            .await
            .unwrap();

        assert!(!receipt.role_granted);
        let joined = store.user_with_role("a@example.com").await.unwrap().unwrap();
        assert_eq!(joined.role, Some(Role::Admin));
        assert_eq!(store.role_record_count(admin.id).await, 1);
    }

    #[rocket::async_test]
    async fn unknown_payer_or_class_is_not_found() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let teacher = seed_user(&store, "t@example.com", Some(Role::Teacher)).await;
        seed_user(&store, "s@example.com", None).await;
        let class = seed_class(&store, teacher.id, ClassStatus::Accepted).await;

        let no_user = complete_payment(&store, mailer.clone(), confirmation("ghost@example.com", class.id, "tx-1"))
            .await
            .unwrap_err();
        assert_eq!(no_user.status, Status::NotFound);

        let no_class = complete_payment(&store, mailer, confirmation("s@example.com", Uuid::new_v4(), "tx-2"))
            .await
            .unwrap_err();
        assert_eq!(no_class.status, Status::NotFound);
        assert_eq!(store.payment_count().await, 0);
    }

    #[rocket::async_test]
    async fn pending_class_rejects_payment() {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let teacher = seed_user(&store, "t@example.com", Some(Role::Teacher)).await;
        seed_user(&store, "s@example.com", None).await;
        let class = seed_class(&store, teacher.id, ClassStatus::Pending).await;

        let err = complete_payment(&store, mailer, confirmation("s@example.com", class.id, "tx-1"))
            .await
            .unwrap_err();
        assert_eq!(err.status, Status::BadRequest);
        assert_eq!(store.payment_count().await, 0);
    }

    #[rocket::async_test]
    async fn mail_failure_keeps_enrollment() {
        let store = MemoryStore::new();
        let teacher = seed_user(&store, "t@example.com", Some(Role::Teacher)).await;
        let student = seed_user(&store, "s@example.com", None).await;
        let class = seed_class(&store, teacher.id, ClassStatus::Accepted).await;

        complete_payment(&store, Arc::new(FailingMailer), confirmation("s@example.com", class.id, "tx-1"))
            .await
            .expect("mail errors don't fail the payment");

        tokio::task::yield_now().await;
        assert!(store.is_enrolled(student.id, class.id).await.unwrap());
    }

    #[rocket::async_test]
    async fn concurrent_payments_count_every_enrollment() {
        let store = Arc::new(MemoryStore::new());
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
        let teacher = seed_user(store.as_ref(), "t@example.com", Some(Role::Teacher)).await;
        let class = seed_class(store.as_ref(), teacher.id, ClassStatus::Accepted).await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let email = format!("s{}@example.com", i);
            seed_user(store.as_ref(), &email, None).await;
            let store = store.clone();
            let mailer = mailer.clone();
            let confirmation = confirmation(&email, class.id, &format!("tx-{}", i));
            tasks.push(tokio::spawn(async move {
                complete_payment(store.as_ref(), mailer, confirmation).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get_class(class.id).await.unwrap().unwrap().total_enrollment, 8);
    }
}
