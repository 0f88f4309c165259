use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::assignment::{Assignment, AssignmentCreateData, Submission, SubmissionCreateData};
use crate::data::enrollment::EnrolledClass;
use crate::data::Db;
use crate::middleware::role::{not_owner, Caller, StudentOnly, TeacherOnly};
use crate::resp::jwt::IdentityToken;
use crate::resp::problem::{problems, Problem};

/// Assignments of a class
#[utoipa::path(
    params(
        ("id", description = "class ID")
    ),
    responses(
        (status = 200, description = "Assignments ordered by deadline", body = Vec<Assignment>),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/classDetails/<id>")]
#[tracing::instrument(skip(db))]
pub async fn assignment_list(
    id: Uuid,
    _auth: IdentityToken,
    db: &State<Db>,
) -> Result<Json<Vec<Assignment>>, Problem> {
    if db.get_class(id).await?.is_none() {
        return Err(problems::not_found("Class", id));
    }
    Ok(Json(db.assignments_for_class(id).await?))
}

/// Add an assignment to an owned class
#[utoipa::path(
    request_body = AssignmentCreateData,
    responses(
        (status = 200, description = "Created assignment", body = Assignment),
        (status = 403, description = "Not the owning teacher", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/addAssignment", format = "application/json", data = "<assignment>")]
#[tracing::instrument(skip(db))]
pub async fn assignment_create(
    assignment: Json<AssignmentCreateData>,
    teacher: TeacherOnly,
    db: &State<Db>,
) -> Result<Json<Assignment>, Problem> {
    assignment.validate()?;

    let class = db
        .get_class(assignment.class_id)
        .await?
        .ok_or_else(|| problems::not_found("Class", assignment.class_id))?;
    if class.teacher_id != teacher.user_id {
        return Err(not_owner("Class"));
    }

    let assignment = assignment.into_inner().into_assignment(teacher.user_id);
    db.insert_assignment(&assignment).await?;

    Ok(Json(assignment))
}

/// Submit an assignment
#[utoipa::path(
    request_body = SubmissionCreateData,
    responses(
        (status = 200, description = "Stored submission", body = Submission),
        (status = 403, description = "Not a student enrolled in the class", body = Problem),
        (status = 404, description = "Assignment doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/submission", format = "application/json", data = "<submission>")]
#[tracing::instrument(skip(db))]
pub async fn submission_create(
    submission: Json<SubmissionCreateData>,
    student: StudentOnly,
    db: &State<Db>,
) -> Result<Json<Submission>, Problem> {
    submission.validate()?;

    let assignment = db
        .get_assignment(submission.assignment_id)
        .await?
        .ok_or_else(|| problems::not_found("Assignment", submission.assignment_id))?;
    if !db.is_enrolled(student.user_id, assignment.class_id).await? {
        return Err(problems::forbidden("Only enrolled students can submit."));
    }

    let submission = submission
        .into_inner()
        .into_submission(assignment.class_id, student.user_id);
    db.insert_submission(&submission).await?;

    Ok(Json(submission))
}

/// Classes a student is enrolled in
#[utoipa::path(
    params(
        ("student_id", description = "student user ID")
    ),
    responses(
        (status = 200, description = "Enrolled classes", body = Vec<EnrolledClass>),
        (status = 403, description = "Neither the student nor an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/enrollClasses/<student_id>")]
#[tracing::instrument(skip(db))]
pub async fn enrolled_class_list(
    student_id: Uuid,
    caller: Caller,
    db: &State<Db>,
) -> Result<Json<Vec<EnrolledClass>>, Problem> {
    caller.require_user_or_admin(student_id)?;
    Ok(Json(db.enrolled_classes(student_id).await?))
}

///////////////////////
//       TESTS
///////////////////////
