use rocket::serde::json::Json;
use rocket::State;

use crate::data::feedback::{Feedback, FeedbackCreateData, FeedbackView};
use crate::data::{Db, Totals};
use crate::middleware::role::StudentOnly;
use crate::resp::problem::{problems, Problem};

/// Public feedback
#[utoipa::path(
    responses(
        (status = 200, description = "Feedback with student and class names", body = Vec<FeedbackView>),
    )
)]
#[get("/feedback")]
#[tracing::instrument(skip(db))]
pub async fn feedback_list(db: &State<Db>) -> Result<Json<Vec<FeedbackView>>, Problem> {
    Ok(Json(db.feedback().await?))
}

/// Leave feedback on an enrolled class
#[utoipa::path(
    request_body = FeedbackCreateData,
    responses(
        (status = 200, description = "Stored feedback", body = Feedback),
        (status = 400, description = "Rating out of range or empty text", body = Problem),
        (status = 403, description = "Not a student enrolled in the class", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/feedback", format = "application/json", data = "<feedback>")]
#[tracing::instrument(skip(db))]
pub async fn feedback_create(
    feedback: Json<FeedbackCreateData>,
    student: StudentOnly,
    db: &State<Db>,
) -> Result<Json<Feedback>, Problem> {
    feedback.validate()?;

    if db.get_class(feedback.class_id).await?.is_none() {
        return Err(problems::not_found("Class", feedback.class_id));
    }
    if !db.is_enrolled(student.user_id, feedback.class_id).await? {
        return Err(problems::forbidden("Only enrolled students can leave feedback."));
    }

    let feedback = feedback.into_inner().into_feedback(student.user_id);
    db.insert_feedback(&feedback).await?;

    Ok(Json(feedback))
}

/// Site totals
#[utoipa::path(
    responses(
        (status = 200, description = "User, class and enrollment counts", body = Totals),
    )
)]
#[get("/totalCount")]
#[tracing::instrument(skip(db))]
pub async fn total_count(db: &State<Db>) -> Result<Json<Totals>, Problem> {
    Ok(Json(db.totals().await?))
}

///////////////////////
//       TESTS
///////////////////////
