use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use rocket::form::Form;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::class::ClassStatus;
use crate::data::payment::Payment;
use crate::data::Db;
use crate::enrollment::{complete_payment, EnrollmentReceipt, PaymentConfirmation};
use crate::mail::Mailer;
use crate::middleware::role::Caller;
use crate::payment::{
    is_paid_status, CardGateway, CheckoutGateway, CheckoutRequest, PendingCheckout,
    PendingCheckouts,
};
use crate::resp::jwt::IdentityToken;
use crate::resp::problem::{problems, Problem};
use crate::util::minor_units;

/// `tran_date` format used by the hosted checkout.
const GATEWAY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PriceData {
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecretResponse {
    pub client_secret: String,
}

/// Card payment confirmed by the client.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardPaymentData {
    #[schema(format = "email")]
    pub email: String,
    pub class_id: Uuid,
    pub transaction_id: String,
    pub price: f64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutData {
    pub class_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub transaction_id: String,
}

/// Form posted by the hosted checkout when the browser returns.
#[derive(Debug, FromForm)]
pub struct GatewayCallback {
    pub tran_id: Option<String>,
    pub amount: Option<String>,
    pub tran_date: Option<String>,
    pub status: Option<String>,
    /// Handle for looking the payment up with the gateway.
    pub val_id: Option<String>,
    /// Payer email, passed through the gateway.
    pub value_a: Option<String>,
    /// Class id, passed through the gateway.
    pub value_b: Option<String>,
}

fn fail_redirect(config: &Config) -> Redirect {
    Redirect::to(format!("{}/payment/fail", config.client_url))
}

fn gateway_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|it| NaiveDateTime::parse_from_str(it, GATEWAY_DATE_FORMAT).ok())
        .map(|it| it.and_utc())
        .unwrap_or_else(Utc::now)
}

/// Rejects `paid` unless it covers `expected` to the cent.
fn check_amount(paid: f64, expected: f64) -> Result<(), Problem> {
    if minor_units(paid) != minor_units(expected) {
        return Err(problems::bad_request("Paid amount doesn't match the class price.")
            .insert("paid", paid)
            .insert("expected", expected)
            .clone());
    }
    Ok(())
}

/// Matches a success callback to the session it claims to settle and
/// confirms the payment with the gateway before enrolling.
///
/// The session is closed once the payment is recorded or found to be a
/// repeat; any other failure leaves it open for the gateway to retry.
async fn settle_checkout(
    callback: GatewayCallback,
    db: &Db,
    mailer: Arc<dyn Mailer>,
    checkout: &dyn CheckoutGateway,
    pending: &PendingCheckouts,
) -> Result<EnrollmentReceipt, Problem> {
    let transaction_id = callback
        .tran_id
        .ok_or_else(|| problems::bad_request("Callback has no transaction id."))?;

    let status = callback.status.unwrap_or_default();
    if !is_paid_status(&status) {
        return Err(problems::bad_request("Payment wasn't validated.")
            .insert_str("status", status)
            .clone());
    }
    let validation_id = callback
        .val_id
        .ok_or_else(|| problems::bad_request("Callback has no validation id."))?;

    let opened = pending
        .get(&transaction_id)
        .await
        .ok_or_else(|| problems::not_found("Checkout session", &transaction_id))?;

    let email_matches = callback
        .value_a
        .as_deref()
        .map_or(true, |it| it.eq_ignore_ascii_case(&opened.email));
    let class_matches = callback
        .value_b
        .as_deref()
        .map_or(true, |it| it == opened.class_id.to_string());
    if !email_matches || !class_matches {
        return Err(problems::bad_request("Callback doesn't match the checkout session."));
    }
    if let Some(amount) = callback.amount.as_deref() {
        let amount = amount
            .trim()
            .parse::<f64>()
            .map_err(|_| problems::bad_request("Callback amount isn't a number."))?;
        check_amount(amount, opened.amount)?;
    }

    let validated = checkout.validate(&validation_id).await?;
    if !validated.is_paid() || validated.transaction_id != transaction_id {
        return Err(problems::bad_request("Gateway didn't confirm the payment.")
            .insert_str("status", &validated.status)
            .clone());
    }
    check_amount(validated.amount, opened.amount)?;

    let result = complete_payment(
        db.as_ref(),
        mailer,
        PaymentConfirmation {
            email: opened.email,
            class_id: opened.class_id,
            transaction_id: transaction_id.clone(),
            price: opened.amount,
            date: gateway_date(callback.tran_date.as_deref()),
        },
    )
    .await;

    match &result {
        Ok(_) => pending.close(&transaction_id).await,
        Err(problem) if problem.status == Status::Conflict => pending.close(&transaction_id).await,
        Err(_) => {}
    }
    result
}

/// Start a card payment
#[utoipa::path(
    request_body = PriceData,
    responses(
        (status = 200, description = "Client secret of the payment intent", body = ClientSecretResponse),
        (status = 400, description = "Price isn't a positive amount", body = Problem),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 502, description = "Card gateway failed", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/create-payment-intent", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(card, config))]
pub async fn payment_intent_create(
    data: Json<PriceData>,
    _auth: IdentityToken,
    card: &State<Arc<dyn CardGateway>>,
    config: &State<Config>,
) -> Result<Json<ClientSecretResponse>, Problem> {
    if !data.price.is_finite() || data.price <= 0.0 {
        return Err(problems::bad_request("Price must be a positive amount.")
            .insert("price", data.price)
            .clone());
    }

    let intent = card
        .create_intent(minor_units(data.price), &config.payment.card_currency)
        .await?;

    Ok(Json(ClientSecretResponse {
        client_secret: intent.client_secret,
    }))
}

/// Record a card payment and enroll the payer
#[utoipa::path(
    request_body = CardPaymentData,
    responses(
        (status = 200, description = "Enrollment receipt", body = EnrollmentReceipt),
        (status = 403, description = "Payment email isn't the caller's", body = Problem),
        (status = 404, description = "Unknown user or class", body = Problem),
        (status = 409, description = "Transaction or enrollment already recorded", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/payments", format = "application/json", data = "<payment>")]
#[tracing::instrument(skip(db, mailer))]
pub async fn payment_create(
    payment: Json<CardPaymentData>,
    auth: IdentityToken,
    db: &State<Db>,
    mailer: &State<Arc<dyn Mailer>>,
) -> Result<Json<EnrollmentReceipt>, Problem> {
    if !payment.email.eq_ignore_ascii_case(&auth.email) {
        return Err(problems::forbidden("Payment email doesn't match the token."));
    }

    let payment = payment.into_inner();
    let receipt = complete_payment(
        db.inner().as_ref(),
        mailer.inner().clone(),
        PaymentConfirmation {
            email: payment.email,
            class_id: payment.class_id,
            transaction_id: payment.transaction_id,
            price: payment.price,
            date: payment.date.unwrap_or_else(Utc::now),
        },
    )
    .await?;

    Ok(Json(receipt))
}

/// Payment history of a user
#[utoipa::path(
    params(
        ("email", description = "payer email")
    ),
    responses(
        (status = 200, description = "Payments, newest first", body = Vec<Payment>),
        (status = 403, description = "Neither the payer nor an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/payments/<email>")]
#[tracing::instrument(skip(db))]
pub async fn payment_history(
    email: &str,
    caller: Caller,
    db: &State<Db>,
) -> Result<Json<Vec<Payment>>, Problem> {
    caller.require_self_or_admin(email)?;
    Ok(Json(db.payments_by_email(email).await?))
}

/// Open a hosted checkout session
#[utoipa::path(
    request_body = CheckoutData,
    responses(
        (status = 200, description = "Gateway page to redirect the browser to", body = CheckoutResponse),
        (status = 400, description = "Class isn't open for enrollment", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
        (status = 409, description = "Caller is already enrolled", body = Problem),
        (status = 502, description = "Checkout gateway failed", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/payments/checkout", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(db, checkout, pending, config))]
pub async fn checkout_create(
    data: Json<CheckoutData>,
    caller: Caller,
    db: &State<Db>,
    checkout: &State<Arc<dyn CheckoutGateway>>,
    pending: &State<PendingCheckouts>,
    config: &State<Config>,
) -> Result<Json<CheckoutResponse>, Problem> {
    let class = db
        .get_class(data.class_id)
        .await?
        .ok_or_else(|| problems::not_found("Class", data.class_id))?;
    if class.status != ClassStatus::Accepted {
        return Err(problems::bad_request("Class isn't open for enrollment."));
    }
    if db.is_enrolled(caller.user_id, class.id).await? {
        return Err(problems::conflict("Already enrolled in this class."));
    }

    let transaction_id = Uuid::new_v4().simple().to_string();
    let request = CheckoutRequest {
        transaction_id: transaction_id.clone(),
        amount: class.price,
        currency: config.payment.checkout_currency.clone(),
        customer_name: caller.name.clone(),
        customer_email: caller.email.clone(),
        product_name: class.title.clone(),
        class_id: class.id,
        success_url: format!("{}/payments/success", config.server_url),
        fail_url: format!("{}/payments/fail", config.server_url),
        cancel_url: format!("{}/payments/cancel", config.server_url),
    };
    let session = checkout.begin_checkout(&request).await?;

    pending
        .open(
            transaction_id.clone(),
            PendingCheckout::new(&caller.email, class.id, class.price),
        )
        .await;
    tracing::info!("Opened checkout {} for {}", transaction_id, caller.email);

    Ok(Json(CheckoutResponse {
        url: session.redirect_url,
        transaction_id,
    }))
}

/// Hosted checkout success callback
///
/// Enrolls the payer and sends the browser back to the client app.
#[utoipa::path(
    responses(
        (status = 303, description = "Redirect to the client's success or failure page"),
    )
)]
#[post("/payments/success", data = "<callback>")]
#[tracing::instrument(skip(db, mailer, checkout, pending, config))]
pub async fn checkout_success(
    callback: Form<GatewayCallback>,
    db: &State<Db>,
    mailer: &State<Arc<dyn Mailer>>,
    checkout: &State<Arc<dyn CheckoutGateway>>,
    pending: &State<PendingCheckouts>,
    config: &State<Config>,
) -> Redirect {
    let settled = settle_checkout(
        callback.into_inner(),
        db,
        mailer.inner().clone(),
        checkout.inner().as_ref(),
        pending,
    )
    .await;
    match settled {
        Ok(receipt) => Redirect::to(format!(
            "{}/payment/success/{}",
            config.client_url, receipt.transaction_id
        )),
        Err(problem) => {
            tracing::warn!("Checkout callback rejected: {}", problem);
            fail_redirect(config)
        }
    }
}

/// Hosted checkout failure callback
#[utoipa::path(
    responses(
        (status = 303, description = "Redirect to the client's failure page"),
    )
)]
#[post("/payments/fail", data = "<callback>")]
#[tracing::instrument(skip(pending, config))]
pub async fn checkout_fail(
    callback: Form<GatewayCallback>,
    pending: &State<PendingCheckouts>,
    config: &State<Config>,
) -> Redirect {
    if let Some(id) = &callback.tran_id {
        pending.close(id).await;
        tracing::info!("Checkout {} failed", id);
    }
    fail_redirect(config)
}

/// Hosted checkout cancel callback
#[utoipa::path(
    responses(
        (status = 303, description = "Redirect to the client's failure page"),
    )
)]
#[post("/payments/cancel", data = "<callback>")]
#[tracing::instrument(skip(pending, config))]
pub async fn checkout_cancel(
    callback: Form<GatewayCallback>,
    pending: &State<PendingCheckouts>,
    config: &State<Config>,
) -> Redirect {
    if let Some(id) = &callback.tran_id {
        pending.close(id).await;
        tracing::info!("Checkout {} cancelled", id);
    }
    fail_redirect(config)
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod payment_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use super::{CheckoutResponse, ClientSecretResponse};
    use crate::data::class::ClassStatus;
    use crate::data::payment::Payment;
    use crate::data::Store;
    use crate::enrollment::EnrollmentReceipt;
    use crate::role::Role;
    use crate::test_util::{bearer, TestApp, CLIENT_URL};

    #[rocket::async_test]
    async fn intent_needs_token_and_positive_price() {
        let app = TestApp::new().await;

        let response = app
            .client
            .post("/create-payment-intent")
            .json(&json!({ "price": 25.5 }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = app
            .client
            .post("/create-payment-intent")
            .header(bearer("s@example.com"))
            .json(&json!({ "price": 0 }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let secret: ClientSecretResponse = app
            .client
            .post("/create-payment-intent")
            .header(bearer("s@example.com"))
            .json(&json!({ "price": 25.5 }))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(secret.client_secret, "pi_2550_secret_usd");
    }

    #[rocket::async_test]
    async fn card_payment_enrolls_and_rejects_repeats() {
        let app = TestApp::new().await;
        let teacher = app.user("t@example.com", Some(Role::Teacher)).await;
        let student = app.user("s@example.com", None).await;
        let class = app.class(teacher.id, ClassStatus::Accepted).await;

        let body = json!({
            "email": "s@example.com",
            "classId": class.id,
            "transactionId": "pi_1",
            "price": 25.0,
        });

        let response = app
            .client
            .post("/payments")
            .header(bearer("mallory@example.com"))
            .json(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let receipt: EnrollmentReceipt = app
            .client
            .post("/payments")
            .header(bearer("s@example.com"))
            .json(&body)
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(receipt.student_id, student.id);
        assert!(receipt.role_granted);

        let response = app
            .client
            .post("/payments")
            .header(bearer("s@example.com"))
            .json(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);

        assert_eq!(app.store.enrollment_count(student.id, class.id).await, 1);
        assert_eq!(
            app.store.get_class(class.id).await.unwrap().unwrap().total_enrollment,
            1
        );

        let sent = app.mailer.wait_for(1).await;
        assert_eq!(sent[0].recipient, "s@example.com");
        assert_eq!(sent[0].transaction_id, "pi_1");
    }

    #[rocket::async_test]
    async fn history_is_self_or_admin() {
        let app = TestApp::new().await;
        let teacher = app.user("t@example.com", Some(Role::Teacher)).await;
        app.user("s@example.com", None).await;
        app.user("other@example.com", Some(Role::Student)).await;
        let class = app.class(teacher.id, ClassStatus::Accepted).await;

        app.client
            .post("/payments")
            .header(bearer("s@example.com"))
            .json(&json!({
                "email": "s@example.com",
                "classId": class.id,
                "transactionId": "pi_1",
                "price": 25.0,
            }))
            .dispatch()
            .await;

        let response = app
            .client
            .get("/payments/s@example.com")
            .header(bearer("other@example.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let payments: Vec<Payment> = app
            .client
            .get("/payments/s@example.com")
            .header(bearer("s@example.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].transaction_id, "pi_1");
    }

    #[rocket::async_test]
    async fn checkout_callback_enrolls_once() {
        let app = TestApp::new().await;
        let teacher = app.user("t@example.com", Some(Role::Teacher)).await;
        let student = app.user("s@example.com", None).await;
        let class = app.class(teacher.id, ClassStatus::Accepted).await;

        let checkout: CheckoutResponse = app
            .client
            .post("/payments/checkout")
            .header(bearer("s@example.com"))
            .json(&json!({ "classId": class.id }))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(checkout.url.ends_with(&checkout.transaction_id));
        {
            let requests = app.checkout.requests.lock().await;
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].customer_email, "s@example.com");
            assert_eq!(requests[0].class_id, class.id);
        }

        app.checkout
            .confirm("val-1", &checkout.transaction_id, class.price)
            .await;
        let form = callback_form(&checkout.transaction_id, class.id, "VALID", "25.00");

        let response = app
            .client
            .post("/payments/success")
            .header(ContentType::Form)
            .body(form.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(
            response.headers().get_one("Location"),
            Some(format!("{}/payment/success/{}", CLIENT_URL, checkout.transaction_id).as_str())
        );
        assert!(app.store.is_enrolled(student.id, class.id).await.unwrap());

        let replay = app
            .client
            .post("/payments/success")
            .header(ContentType::Form)
            .body(form)
            .dispatch()
            .await;
        assert_eq!(
            replay.headers().get_one("Location"),
            Some(format!("{}/payment/fail", CLIENT_URL).as_str())
        );
        assert_eq!(app.store.enrollment_count(student.id, class.id).await, 1);
    }

    fn callback_form(transaction_id: &str, class_id: uuid::Uuid, status: &str, amount: &str) -> String {
        format!(
            "tran_id={}&val_id=val-1&amount={}&tran_date=2024-05-01%2010:30:00&status={}&value_a=s%40example.com&value_b={}",
            transaction_id, amount, status, class_id
        )
    }

    async fn open_checkout(app: &TestApp, class_id: uuid::Uuid) -> CheckoutResponse {
        app.client
            .post("/payments/checkout")
            .header(bearer("s@example.com"))
            .json(&json!({ "classId": class_id }))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap()
    }

    async fn post_callback(app: &TestApp, form: String) -> Option<String> {
        let response = app
            .client
            .post("/payments/success")
            .header(ContentType::Form)
            .body(form)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        response.headers().get_one("Location").map(String::from)
    }

    #[rocket::async_test]
    async fn unpaid_or_underpaid_callback_is_rejected() {
        let app = TestApp::new().await;
        let teacher = app.user("t@example.com", Some(Role::Teacher)).await;
        let student = app.user("s@example.com", None).await;
        let class = app.class(teacher.id, ClassStatus::Accepted).await;
        let checkout = open_checkout(&app, class.id).await;
        let tran = checkout.transaction_id.as_str();
        let fail_page = Some(format!("{}/payment/fail", CLIENT_URL));

        let no_status = format!("tran_id={}&val_id=val-1&amount=0.01", tran);
        assert_eq!(post_callback(&app, no_status).await, fail_page);

        let underpaid = callback_form(tran, class.id, "VALID", "0.01");
        assert_eq!(post_callback(&app, underpaid).await, fail_page);

        let unconfirmed = callback_form(tran, class.id, "VALID", "25.00");
        assert_eq!(post_callback(&app, unconfirmed.clone()).await, fail_page);

        app.checkout.confirm("val-1", tran, 0.01).await;
        assert_eq!(post_callback(&app, unconfirmed.clone()).await, fail_page);
        assert!(!app.store.is_enrolled(student.id, class.id).await.unwrap());
        assert_eq!(app.store.payment_count().await, 0);

        app.checkout.confirm("val-1", tran, class.price).await;
        assert_eq!(
            post_callback(&app, unconfirmed).await,
            Some(format!("{}/payment/success/{}", CLIENT_URL, tran))
        );

        let payments = app.store.payments_by_email("s@example.com").await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].price, class.price);
    }

    #[rocket::async_test]
    async fn failed_settlement_keeps_session_for_retry() {
        let app = TestApp::new().await;
        let teacher = app.user("t@example.com", Some(Role::Teacher)).await;
        let student = app.user("s@example.com", None).await;
        let class = app.class(teacher.id, ClassStatus::Accepted).await;
        let checkout = open_checkout(&app, class.id).await;
        let tran = checkout.transaction_id.as_str();
        app.checkout.confirm("val-1", tran, class.price).await;

        let mismatched = format!(
            "tran_id={}&val_id=val-1&amount=25.00&status=VALID&value_a=mallory%40example.com&value_b={}",
            tran, class.id
        );
        post_callback(&app, mismatched).await;

        app.store
            .set_class_status(class.id, ClassStatus::Rejected)
            .await
            .unwrap();
        let form = callback_form(tran, class.id, "VALID", "25.00");
        assert_eq!(
            post_callback(&app, form.clone()).await,
            Some(format!("{}/payment/fail", CLIENT_URL))
        );
        assert!(!app.store.is_enrolled(student.id, class.id).await.unwrap());

        app.store
            .set_class_status(class.id, ClassStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(
            post_callback(&app, form).await,
            Some(format!("{}/payment/success/{}", CLIENT_URL, tran))
        );
        assert!(app.store.is_enrolled(student.id, class.id).await.unwrap());
    }

    #[rocket::async_test]
    async fn forged_callback_is_ignored() {
        let app = TestApp::new().await;
        let teacher = app.user("t@example.com", Some(Role::Teacher)).await;
        let student = app.user("s@example.com", None).await;
        let class = app.class(teacher.id, ClassStatus::Accepted).await;

        let response = app
            .client
            .post("/payments/success")
            .header(ContentType::Form)
            .body(format!(
                "tran_id=made-up&val_id=val-1&status=VALID&value_a=s%40example.com&value_b={}",
                class.id
            ))
            .dispatch()
            .await;
        assert_eq!(
            response.headers().get_one("Location"),
            Some(format!("{}/payment/fail", CLIENT_URL).as_str())
        );
        assert!(!app.store.is_enrolled(student.id, class.id).await.unwrap());
    }

    #[rocket::async_test]
    async fn failed_and_cancelled_checkouts_redirect_to_fail_page() {
        let app = TestApp::new().await;

        for uri in ["/payments/fail", "/payments/cancel"] {
            let response = app
                .client
                .post(uri)
                .header(ContentType::Form)
                .body("tran_id=abc&status=FAILED")
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::SeeOther, "{}", uri);
            assert_eq!(
                response.headers().get_one("Location"),
                Some(format!("{}/payment/fail", CLIENT_URL).as_str())
            );
        }
    }
}
