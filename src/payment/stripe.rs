use reqwest::Client;
use serde::Deserialize;

use super::{CardGateway, GatewayError, PaymentIntent};

static STRIPE_API: &str = "https://api.stripe.com/v1";

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

pub struct StripeGateway {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl StripeGateway {
    pub fn new(secret_key: String) -> Result<StripeGateway, GatewayError> {
        Self::with_base_url(secret_key, STRIPE_API)
    }

    pub fn with_base_url(
        secret_key: String,
        base_url: impl ToString,
    ) -> Result<StripeGateway, GatewayError> {
        Ok(StripeGateway {
            client: Client::builder().build()?,
            secret_key,
            base_url: base_url.to_string(),
        })
    }
}

#[rocket::async_trait]
impl CardGateway for StripeGateway {
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<PaymentIntent, GatewayError> {
        let amount = amount.to_string();
        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|it| it.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(GatewayError::Rejected(reason));
        }

        let intent: IntentResponse = response.json().await?;
        tracing::debug!("created payment intent {}", intent.id);

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}
