use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use rocket::http::Header;
use rocket::local::asynchronous::Client;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{Config, StorageBackend};
use crate::data::class::{Class, ClassStatus};
use crate::data::memory::MemoryStore;
use crate::data::user::User;
use crate::data::Store;
use crate::mail::{MailError, Mailer, PaymentReceipt};
use crate::payment::{
    CardGateway, CheckoutGateway, CheckoutRequest, CheckoutSession, GatewayError, PaymentIntent,
    ValidatedPayment,
};
use crate::resp::jwt::{IdentityToken, AUTH_HEADER_NAME};
use crate::role::Role;
use crate::security::Security;
use crate::Services;

pub static TEST_SECRET: &str = "test-secret";
pub static ROOT_EMAIL: &str = "root@example.com";
pub static CLIENT_URL: &str = "http://client.test";

pub fn security() -> Security {
    Security::new(TEST_SECRET, Duration::hours(2))
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.jwt_secret = TEST_SECRET.to_string();
    config.storage = StorageBackend::Memory;
    config.admin_emails = vec![ROOT_EMAIL.to_string()];
    config.client_url = CLIENT_URL.to_string();
    config.server_url = "http://server.test".to_string();
    config
}

pub fn bearer(email: &str) -> Header<'static> {
    let value = IdentityToken::new(email, None, Duration::hours(1))
        .bearer(&security())
        .expect("test token should encode");
    Header::new(AUTH_HEADER_NAME, value)
}

pub async fn seed_user(store: &dyn Store, email: &str, role: Option<Role>) -> User {
    let user = User::new(email, email.split('@').next().unwrap_or(email), None);
    store.insert_user(&user).await.expect("fresh email");
    if let Some(role) = role {
        store.set_role(user.id, role).await.unwrap();
    }
    user
}

pub async fn seed_class(store: &dyn Store, teacher_id: Uuid, status: ClassStatus) -> Class {
    let id = Uuid::new_v4();
    let class = Class {
        id,
        teacher_id,
        title: format!("Class {}", &id.to_string()[..8]),
        description: "Learn things.".to_string(),
        image_url: None,
        price: 25.0,
        status,
        total_enrollment: 0,
        created_at: chrono::Utc::now(),
    };
    store.insert_class(&class).await.unwrap();
    class
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<PaymentReceipt>>,
}

impl RecordingMailer {
    /// Waits for the background sender to deliver `count` mails.
    pub async fn wait_for(&self, count: usize) -> Vec<PaymentReceipt> {
        for _ in 0..200 {
            {
                let sent = self.sent.lock().await;
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("expected {} mails", count);
    }
}

#[rocket::async_trait]
impl Mailer for RecordingMailer {
    async fn send_payment_confirmation(&self, receipt: &PaymentReceipt) -> Result<(), MailError> {
        self.sent.lock().await.push(receipt.clone());
        Ok(())
    }
}

pub struct FailingMailer;

#[rocket::async_trait]
impl Mailer for FailingMailer {
    async fn send_payment_confirmation(&self, _: &PaymentReceipt) -> Result<(), MailError> {
        let err = "not an address"
            .parse::<lettre::message::Mailbox>()
            .unwrap_err();
        Err(MailError::Address(err))
    }
}

pub struct FakeCard;

#[rocket::async_trait]
impl CardGateway for FakeCard {
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<PaymentIntent, GatewayError> {
        Ok(PaymentIntent {
            id: format!("pi_{}", amount),
            client_secret: format!("pi_{}_secret_{}", amount, currency),
        })
    }
}

#[derive(Default)]
pub struct FakeCheckout {
    pub requests: Mutex<Vec<CheckoutRequest>>,
    validations: Mutex<HashMap<String, ValidatedPayment>>,
}

impl FakeCheckout {
    /// Makes the gateway report `amount` as paid for `transaction_id`.
    pub async fn confirm(&self, validation_id: &str, transaction_id: &str, amount: f64) {
        self.validations.lock().await.insert(
            validation_id.to_string(),
            ValidatedPayment {
                transaction_id: transaction_id.to_string(),
                amount,
                status: "VALID".to_string(),
            },
        );
    }
}

#[rocket::async_trait]
impl CheckoutGateway for FakeCheckout {
    async fn begin_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        self.requests.lock().await.push(request.clone());
        Ok(CheckoutSession {
            redirect_url: format!("https://gateway.test/session/{}", request.transaction_id),
        })
    }

    async fn validate(&self, validation_id: &str) -> Result<ValidatedPayment, GatewayError> {
        self.validations
            .lock()
            .await
            .get(validation_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected("INVALID_TRANSACTION".to_string()))
    }
}

pub struct TestApp {
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub checkout: Arc<FakeCheckout>,
}

impl TestApp {
    pub async fn new() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let checkout = Arc::new(FakeCheckout::default());

        let services = Services {
            store: store.clone(),
            mailer: mailer.clone(),
            card: Arc::new(FakeCard),
            checkout: checkout.clone(),
        };
        let rocket = crate::assemble(config(), security(), services).expect("valid rocket");
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");

        TestApp {
            client,
            store,
            mailer,
            checkout,
        }
    }

    pub async fn user(&self, email: &str, role: Option<Role>) -> User {
        seed_user(self.store.as_ref(), email, role).await
    }

    pub async fn class(&self, teacher_id: Uuid, status: ClassStatus) -> Class {
        seed_class(self.store.as_ref(), teacher_id, status).await
    }
}
