use rocket::{Build, Rocket, Route};

pub mod assignments;
pub mod auth;
pub mod catchers;
pub mod classes;
pub mod feedback;
pub mod payments;
pub mod teachers;
pub mod users;

use assignments::*;
use auth::*;
use classes::*;
use feedback::*;
use payments::*;
use teachers::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    authz::Principal,
    data::{
        assignment::{Assignment, AssignmentCreateData, Submission, SubmissionCreateData},
        class::{
            db::{ClassCreateData, ClassStatusData, ClassUpdateData},
            Class, ClassDetail, ClassListing, ClassStatus,
        },
        enrollment::EnrolledClass,
        feedback::{Feedback, FeedbackCreateData, FeedbackView},
        payment::Payment,
        teacher_request::{
            RequestStatus, RequestStatusData, TeacherProfile, TeacherRequest,
            TeacherRequestCreateData,
        },
        user::db::{UserCreatedResponse, UserSignupData},
        user::{User, UserWithRole},
        Totals,
    },
    enrollment::EnrollmentReceipt,
    resp::{jwt::doc::JWTAuth, problem::Problem},
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        token_issue,
        user_get,
        user_create,
        user_role,
        user_list,
        make_admin,
        class_popular,
        class_list,
        class_info,
        class_create,
        class_mine,
        class_update,
        class_delete,
        class_review_list,
        class_review,
        assignment_list,
        assignment_create,
        submission_create,
        enrolled_class_list,
        teacher_request_list,
        teacher_request_create,
        teacher_request_review,
        teacher_list,
        feedback_list,
        feedback_create,
        total_count,
        payment_intent_create,
        payment_create,
        payment_history,
        checkout_create,
        checkout_success,
        checkout_fail,
        checkout_cancel
    ),
    components(schemas(
        Role,
        Principal,
        User,
        UserWithRole,
        UserSignupData,
        UserCreatedResponse,
        RoleResponse,
        TokenRequest,
        TokenResponse,
        Class,
        ClassStatus,
        ClassListing,
        ClassDetail,
        ClassCreateData,
        ClassUpdateData,
        ClassStatusData,
        Assignment,
        AssignmentCreateData,
        Submission,
        SubmissionCreateData,
        EnrolledClass,
        TeacherRequest,
        TeacherRequestCreateData,
        RequestStatus,
        RequestStatusData,
        TeacherProfile,
        Feedback,
        FeedbackCreateData,
        FeedbackView,
        Totals,
        Payment,
        PriceData,
        ClientSecretResponse,
        CardPaymentData,
        CheckoutData,
        CheckoutResponse,
        EnrollmentReceipt,
        Problem
    )),
    modifiers(&JWTAuth)
)]
pub struct ApiDoc;

/// Liveness check
#[utoipa::path(
    responses(
        (status = 200, description = "Server is up", body = String),
    )
)]
#[get("/")]
pub fn index() -> &'static str {
    "server is running"
}

pub fn api() -> Vec<Route> {
    routes![
        index,
        token_issue,
        user_get,
        user_create,
        user_role,
        user_list,
        make_admin,
        class_popular,
        class_list,
        class_info,
        class_create,
        class_mine,
        class_update,
        class_delete,
        class_review_list,
        class_review,
        assignment_list,
        assignment_create,
        submission_create,
        enrolled_class_list,
        teacher_request_list,
        teacher_request_create,
        teacher_request_review,
        teacher_list,
        feedback_list,
        feedback_create,
        total_count,
        payment_intent_create,
        payment_create,
        payment_history,
        checkout_create,
        checkout_success,
        checkout_fail,
        checkout_cancel
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api())
        .mount(
            "/",
            SwaggerUi::new("/swagger-ui/<_..>").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .register("/", catchers::catchers())
}

#[cfg(test)]
mod api_docs {
    use rocket::http::Status;
    use utoipa::OpenApi;

    use super::ApiDoc;
    use crate::test_util::TestApp;

    #[test]
    fn document_registers_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("jwt"));
        assert!(doc.paths.paths.contains_key("/payments/checkout"));
    }

    #[rocket::async_test]
    async fn liveness_and_docs_are_served() {
        let app = TestApp::new().await;

        let response = app.client.get("/").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(
            response.into_string().await.as_deref(),
            Some("server is running")
        );

        let response = app.client.get("/api-docs/openapi.json").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn unknown_routes_answer_with_problem_json() {
        let app = TestApp::new().await;

        let response = app.client.get("/no/such/route").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(
            response.content_type().map(|it| it.to_string()),
            Some("application/problem+json".to_string())
        );
    }
}
