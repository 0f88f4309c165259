//! Payment gateways.
//!
//! Two providers are supported: a card gateway that hands the client a
//! secret to confirm the payment with, and a hosted checkout that redirects
//! the browser and calls back on completion. Both are traits so tests can
//! swap in fakes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::PaymentConfig;

pub mod sslcommerz;
pub mod stripe;

pub use sslcommerz::SslCommerzGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} gateway isn't configured")]
    NotConfigured(&'static str),
    #[error("gateway unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[rocket::async_trait]
pub trait CardGateway: Send + Sync {
    /// `amount` is in the currency's minor unit.
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<PaymentIntent, GatewayError>;
}

/// Everything the hosted checkout needs to open a session.
///
/// The payer's email and the class id round-trip through the gateway and
/// come back with the success callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub product_name: String,
    pub class_id: Uuid,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub redirect_url: String,
}

/// Statuses the hosted checkout reports for a completed payment.
pub fn is_paid_status(status: &str) -> bool {
    matches!(status.to_ascii_uppercase().as_str(), "VALID" | "VALIDATED")
}

/// The gateway's own record of a checkout payment, looked up by the
/// validation id it hands out with the success callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayment {
    pub transaction_id: String,
    pub amount: f64,
    pub status: String,
}

impl ValidatedPayment {
    pub fn is_paid(&self) -> bool {
        is_paid_status(&self.status)
    }
}

#[rocket::async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn begin_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    /// Asks the gateway what was actually paid for `validation_id`.
    async fn validate(&self, validation_id: &str) -> Result<ValidatedPayment, GatewayError>;
}

/// Hours a checkout session waits for its callback before it's dropped.
pub const CHECKOUT_TTL_HOURS: i64 = 24;

/// What a hosted checkout session was opened for.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCheckout {
    pub email: String,
    pub class_id: Uuid,
    pub amount: f64,
    pub opened_at: DateTime<Utc>,
}

impl PendingCheckout {
    pub fn new(email: impl ToString, class_id: Uuid, amount: f64) -> PendingCheckout {
        PendingCheckout {
            email: email.to_string(),
            class_id,
            amount,
            opened_at: Utc::now(),
        }
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.opened_at > Duration::hours(CHECKOUT_TTL_HOURS)
    }
}

/// Checkout sessions opened by this process, keyed by transaction id.
///
/// Success callbacks are only honoured for transactions found here. A session
/// stays open until it settles, so a rejected callback can be retried.
/// Sessions don't survive a restart.
#[derive(Debug, Default)]
pub struct PendingCheckouts(Mutex<HashMap<String, PendingCheckout>>);

impl PendingCheckouts {
    /// Records a new session and drops the ones past their lifetime.
    pub async fn open(&self, transaction_id: String, checkout: PendingCheckout) {
        let mut sessions = self.0.lock().await;
        let now = Utc::now();
        sessions.retain(|_, it| !it.is_stale(now));
        sessions.insert(transaction_id, checkout);
    }

    pub async fn get(&self, transaction_id: &str) -> Option<PendingCheckout> {
        self.0
            .lock()
            .await
            .get(transaction_id)
            .filter(|it| !it.is_stale(Utc::now()))
            .cloned()
    }

    pub async fn close(&self, transaction_id: &str) {
        self.0.lock().await.remove(transaction_id);
    }
}

/// Stand-in for a provider with no credentials; every call fails.
pub struct Unconfigured(pub &'static str);

#[rocket::async_trait]
impl CardGateway for Unconfigured {
    async fn create_intent(&self, _: i64, _: &str) -> Result<PaymentIntent, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}

#[rocket::async_trait]
impl CheckoutGateway for Unconfigured {
    async fn begin_checkout(&self, _: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }

    async fn validate(&self, _: &str) -> Result<ValidatedPayment, GatewayError> {
        Err(GatewayError::NotConfigured(self.0))
    }
}

pub fn card_from_config(config: &PaymentConfig) -> Result<Arc<dyn CardGateway>, GatewayError> {
    match &config.stripe_secret_key {
        Some(key) => Ok(Arc::new(StripeGateway::new(key.clone())?)),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, card payments are disabled.");
            Ok(Arc::new(Unconfigured("card")))
        }
    }
}

pub fn checkout_from_config(
    config: &PaymentConfig,
) -> Result<Arc<dyn CheckoutGateway>, GatewayError> {
    match (&config.store_id, &config.store_password) {
        (Some(id), Some(password)) => Ok(Arc::new(SslCommerzGateway::new(
            &config.checkout_url,
            id.clone(),
            password.clone(),
        )?)),
        _ => {
            tracing::warn!("STORE_ID/STORE_PASSWORD not set, hosted checkout is disabled.");
            Ok(Arc::new(Unconfigured("checkout")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn pending_checkout_stays_until_closed() {
        let pending = PendingCheckouts::default();
        let checkout = PendingCheckout::new("s@example.com", Uuid::new_v4(), 10.0);
        pending.open("tx".to_string(), checkout.clone()).await;

        assert_eq!(pending.get("tx").await, Some(checkout.clone()));
        assert_eq!(pending.get("tx").await, Some(checkout));

        pending.close("tx").await;
        assert_eq!(pending.get("tx").await, None);
    }

    #[rocket::async_test]
    async fn stale_checkouts_expire_and_are_pruned() {
        let pending = PendingCheckouts::default();
        let mut stale = PendingCheckout::new("s@example.com", Uuid::new_v4(), 10.0);
        stale.opened_at = Utc::now() - Duration::hours(CHECKOUT_TTL_HOURS + 1);
        pending.open("old".to_string(), stale).await;
        assert_eq!(pending.get("old").await, None);

        let fresh = PendingCheckout::new("s@example.com", Uuid::new_v4(), 10.0);
        pending.open("new".to_string(), fresh).await;
        assert_eq!(pending.0.lock().await.len(), 1);
        assert!(pending.get("new").await.is_some());
    }

    #[test]
    fn only_validated_statuses_count_as_paid() {
        for status in ["VALID", "validated", "Valid"] {
            assert!(is_paid_status(status), "{}", status);
        }
        for status in ["", "FAILED", "INVALID_TRANSACTION", "PENDING"] {
            assert!(!is_paid_status(status), "{}", status);
        }
    }

    #[rocket::async_test]
    async fn missing_credentials_disable_gateways() {
        let config = PaymentConfig {
            stripe_secret_key: None,
            card_currency: "usd".to_string(),
            store_id: Some("store".to_string()),
            store_password: None,
            checkout_url: "https://sandbox.example.com".to_string(),
            checkout_currency: "BDT".to_string(),
        };

        let card = card_from_config(&config).unwrap();
        assert!(matches!(
            card.create_intent(100, "usd").await,
            Err(GatewayError::NotConfigured("card"))
        ));

        let checkout = checkout_from_config(&config).unwrap();
        let request = CheckoutRequest {
            transaction_id: "tx".to_string(),
            amount: 10.0,
            currency: "BDT".to_string(),
            customer_name: "S".to_string(),
            customer_email: "s@example.com".to_string(),
            product_name: "Rust".to_string(),
            class_id: Uuid::new_v4(),
            success_url: String::new(),
            fail_url: String::new(),
            cancel_url: String::new(),
        };
        assert!(matches!(
            checkout.begin_checkout(&request).await,
            Err(GatewayError::NotConfigured("checkout"))
        ));
    }
}
