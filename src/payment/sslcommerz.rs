use reqwest::Client;
use serde::Deserialize;

use super::{CheckoutGateway, CheckoutRequest, CheckoutSession, GatewayError, ValidatedPayment};

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: String,
    #[serde(rename = "GatewayPageURL", default)]
    gateway_page_url: Option<String>,
    #[serde(default)]
    failedreason: Option<String>,
}

impl SessionResponse {
    fn into_session(self) -> Result<CheckoutSession, GatewayError> {
        match self.gateway_page_url {
            Some(url) if self.status.eq_ignore_ascii_case("success") && !url.is_empty() => {
                Ok(CheckoutSession { redirect_url: url })
            }
            _ => Err(GatewayError::Rejected(
                self.failedreason.unwrap_or(self.status),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    status: String,
    #[serde(default)]
    tran_id: Option<String>,
    #[serde(default)]
    amount: Option<String>,
}

impl ValidationResponse {
    fn into_validated(self) -> Result<ValidatedPayment, GatewayError> {
        let amount = self.amount.as_deref().and_then(|it| it.trim().parse::<f64>().ok());
        match (self.tran_id, amount) {
            (Some(transaction_id), Some(amount)) => Ok(ValidatedPayment {
                transaction_id,
                amount,
                status: self.status,
            }),
            _ => Err(GatewayError::Rejected(self.status)),
        }
    }
}

/// Hosted checkout. The payer's email travels in `value_a`, the class id in
/// `value_b`.
pub struct SslCommerzGateway {
    client: Client,
    session_url: String,
    validation_url: String,
    store_id: String,
    store_password: String,
}

impl SslCommerzGateway {
    pub fn new(
        base_url: &str,
        store_id: String,
        store_password: String,
    ) -> Result<SslCommerzGateway, GatewayError> {
        let base_url = base_url.trim_end_matches('/');
        Ok(SslCommerzGateway {
            client: Client::builder().build()?,
            session_url: format!("{}/gwprocess/v4/api.php", base_url),
            validation_url: format!("{}/validator/api/validationserverAPI.php", base_url),
            store_id,
            store_password,
        })
    }
}

#[rocket::async_trait]
impl CheckoutGateway for SslCommerzGateway {
    async fn begin_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let amount = format!("{:.2}", request.amount);
        let class_id = request.class_id.to_string();
        let form = [
            ("store_id", self.store_id.as_str()),
            ("store_passwd", self.store_password.as_str()),
            ("total_amount", amount.as_str()),
            ("currency", request.currency.as_str()),
            ("tran_id", request.transaction_id.as_str()),
            ("success_url", request.success_url.as_str()),
            ("fail_url", request.fail_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("cus_name", request.customer_name.as_str()),
            ("cus_email", request.customer_email.as_str()),
            ("cus_add1", "N/A"),
            ("cus_city", "N/A"),
            ("cus_country", "Bangladesh"),
            ("cus_phone", "N/A"),
            ("shipping_method", "NO"),
            ("product_name", request.product_name.as_str()),
            ("product_category", "Course"),
            ("product_profile", "non-physical-goods"),
            ("value_a", request.customer_email.as_str()),
            ("value_b", class_id.as_str()),
        ];

        let response: SessionResponse = self
            .client
            .post(&self.session_url)
            .form(&form)
            .send()
            .await?
            .json()
            .await?;

        let session = response.into_session()?;
        tracing::debug!("opened checkout session for {}", request.transaction_id);
        Ok(session)
    }

    async fn validate(&self, validation_id: &str) -> Result<ValidatedPayment, GatewayError> {
        let query = [
            ("val_id", validation_id),
            ("store_id", self.store_id.as_str()),
            ("store_passwd", self.store_password.as_str()),
            ("format", "json"),
        ];

        let response: ValidationResponse = self
            .client
            .get(&self.validation_url)
            .query(&query)
            .send()
            .await?
            .json()
            .await?;

        response.into_validated()
    }
}
