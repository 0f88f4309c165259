use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::teacher_request::{
    self, RequestStatusData, TeacherProfile, TeacherRequest, TeacherRequestCreateData,
};
use crate::data::Db;
use crate::middleware::role::{AdminOnly, Caller};
use crate::resp::problem::{problems, Problem};

/// Pending teacher requests
#[utoipa::path(
    responses(
        (status = 200, description = "Requests waiting for review", body = Vec<TeacherRequest>),
        (status = 403, description = "Not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/teacherRequest")]
#[tracing::instrument(skip(db))]
pub async fn teacher_request_list(
    _admin: AdminOnly,
    db: &State<Db>,
) -> Result<Json<Vec<TeacherRequest>>, Problem> {
    Ok(Json(db.pending_teacher_requests().await?))
}

/// Apply to become a teacher
#[utoipa::path(
    request_body = TeacherRequestCreateData,
    responses(
        (status = 200, description = "Stored request", body = TeacherRequest),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/teacherRequest", format = "application/json", data = "<request>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_request_create(
    request: Json<TeacherRequestCreateData>,
    caller: Caller,
    db: &State<Db>,
) -> Result<Json<TeacherRequest>, Problem> {
    request.validate()?;

    let request = request.into_inner().into_request(caller.user_id);
    db.insert_teacher_request(&request).await?;
    tracing::info!("{} applied to teach {}", caller.email, request.category);

    Ok(Json(request))
}

/// Review a teacher request
///
/// Accepting grants the applicant the teacher role.
#[utoipa::path(
    params(
        ("id", description = "teacher request ID")
    ),
    request_body = RequestStatusData,
    responses(
        (status = 200, description = "Reviewed request", body = TeacherRequest),
        (status = 403, description = "Not an admin", body = Problem),
        (status = 404, description = "Request doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/teacherRequest/<id>", format = "application/json", data = "<review>")]
#[tracing::instrument(skip(db))]
pub async fn teacher_request_review(
    id: Uuid,
    review: Json<RequestStatusData>,
    _admin: AdminOnly,
    db: &State<Db>,
) -> Result<Json<TeacherRequest>, Problem> {
    teacher_request::review(db.inner().as_ref(), id, review.status)
        .await?
        .map(Json)
        .ok_or_else(|| problems::not_found("Teacher request", id))
}

/// Accepted teachers
#[utoipa::path(
    responses(
        (status = 200, description = "Teachers with their public profile", body = Vec<TeacherProfile>),
    )
)]
#[get("/teacher")]
#[tracing::instrument(skip(db))]
pub async fn teacher_list(db: &State<Db>) -> Result<Json<Vec<TeacherProfile>>, Problem> {
    Ok(Json(db.accepted_teachers().await?))
}

///////////////////////
//       TESTS
///////////////////////
