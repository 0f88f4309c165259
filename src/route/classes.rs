use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::class::db::{ClassCreateData, ClassStatusData, ClassUpdateData};
use crate::data::class::{Class, ClassDetail, ClassListing};
use crate::data::Db;
use crate::middleware::paging::PageState;
use crate::middleware::role::{not_owner, AdminOnly, TeacherOnly};
use crate::resp::problem::{problems, Problem};

pub const POPULAR_CLASS_COUNT: i64 = 6;

/// Fetches class `id` and checks the teacher owns it.
async fn owned_class(db: &Db, id: Uuid, teacher: &TeacherOnly) -> Result<Class, Problem> {
    let class = db
        .get_class(id)
        .await?
        .ok_or_else(|| problems::not_found("Class", id))?;

    if class.teacher_id != teacher.user_id {
        return Err(not_owner("Class"));
    }
    Ok(class)
}

/// Most enrolled accepted classes
#[utoipa::path(
    responses(
        (status = 200, description = "Up to six classes, most enrolled first", body = Vec<Class>),
    )
)]
#[get("/classes")]
#[tracing::instrument(skip(db))]
pub async fn class_popular(db: &State<Db>) -> Result<Json<Vec<Class>>, Problem> {
    Ok(Json(db.popular_classes(POPULAR_CLASS_COUNT).await?))
}

/// Accepted classes with their teacher's name
#[utoipa::path(
    responses(
        (status = 200, description = "Accepted classes", body = Vec<ClassListing>),
    )
)]
#[get("/allClasses")]
#[tracing::instrument(skip(db))]
pub async fn class_list(db: &State<Db>) -> Result<Json<Vec<ClassListing>>, Problem> {
    Ok(Json(db.accepted_classes().await?))
}

/// Class detail
#[utoipa::path(
    params(
        ("id", description = "class ID")
    ),
    responses(
        (status = 200, description = "Class with teacher and student count", body = ClassDetail),
        (status = 404, description = "Class doesn't exist", body = Problem),
    )
)]
#[get("/class/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_info(id: Uuid, db: &State<Db>) -> Result<Json<ClassDetail>, Problem> {
    db.class_detail(id)
        .await?
        .map(Json)
        .ok_or_else(|| problems::not_found("Class", id))
}

/// Create a class
///
/// New classes wait for admin review before they're listed.
#[utoipa::path(
    request_body = ClassCreateData,
    responses(
        (status = 200, description = "Created class", body = Class),
        (status = 400, description = "Invalid class data", body = Problem),
        (status = 403, description = "Not a teacher", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/addClass", format = "application/json", data = "<class>")]
#[tracing::instrument(skip(db))]
pub async fn class_create(
    class: Json<ClassCreateData>,
    teacher: TeacherOnly,
    db: &State<Db>,
) -> Result<Json<Class>, Problem> {
    class.validate()?;

    let class = class.into_inner().into_class(teacher.user_id);
    db.insert_class(&class).await?;
    tracing::info!("{} created class {}", teacher.email, class.id);

    Ok(Json(class))
}

/// Classes of the calling teacher
#[utoipa::path(
    responses(
        (status = 200, description = "Classes owned by the caller", body = Vec<Class>),
        (status = 403, description = "Not a teacher", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/myClasses")]
#[tracing::instrument(skip(db))]
pub async fn class_mine(teacher: TeacherOnly, db: &State<Db>) -> Result<Json<Vec<Class>>, Problem> {
    Ok(Json(db.classes_by_teacher(teacher.user_id).await?))
}

/// Update a class
#[utoipa::path(
    params(
        ("id", description = "class ID")
    ),
    request_body = ClassUpdateData,
    responses(
        (status = 200, description = "Updated class", body = Class),
        (status = 403, description = "Not the owning teacher", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/class/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(db))]
pub async fn class_update(
    id: Uuid,
    update: Json<ClassUpdateData>,
    teacher: TeacherOnly,
    db: &State<Db>,
) -> Result<Json<Class>, Problem> {
    let mut class = owned_class(db, id, &teacher).await?;
    let update = update.into_inner().normalized();
    update.validate()?;

    if !db.update_class(id, &update).await? {
        return Err(problems::not_found("Class", id));
    }
    update.apply(&mut class);

    Ok(Json(class))
}

/// Delete a class
#[utoipa::path(
    params(
        ("id", description = "class ID")
    ),
    responses(
        (status = 200, description = "Removed class", body = Class),
        (status = 403, description = "Not the owning teacher", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/class/<id>")]
#[tracing::instrument(skip(db))]
pub async fn class_delete(
    id: Uuid,
    teacher: TeacherOnly,
    db: &State<Db>,
) -> Result<Json<Class>, Problem> {
    let class = owned_class(db, id, &teacher).await?;

    if !db.delete_class(id).await? {
        return Err(problems::not_found("Class", id));
    }
    tracing::info!("{} deleted class {}", teacher.email, id);

    Ok(Json(class))
}

/// All classes, for review
#[utoipa::path(
    params(
        ("page" = Option<u32>, Query, description = "zero based page"),
        ("len" = Option<u32>, Query, description = "page length"),
    ),
    responses(
        (status = 200, description = "Page of classes, newest first", body = Vec<Class>),
        (status = 403, description = "Not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/adminClasses")]
#[tracing::instrument(skip(db))]
pub async fn class_review_list(
    _admin: AdminOnly,
    page: PageState,
    db: &State<Db>,
) -> Result<Json<Vec<Class>>, Problem> {
    Ok(Json(db.all_classes(page).await?))
}

/// Accept or reject a class
#[utoipa::path(
    params(
        ("id", description = "class ID")
    ),
    request_body = ClassStatusData,
    responses(
        (status = 200, description = "Reviewed class", body = Class),
        (status = 403, description = "Not an admin", body = Problem),
        (status = 404, description = "Class doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/class/<id>/status", format = "application/json", data = "<review>")]
#[tracing::instrument(skip(db))]
pub async fn class_review(
    id: Uuid,
    review: Json<ClassStatusData>,
    admin: AdminOnly,
    db: &State<Db>,
) -> Result<Json<Class>, Problem> {
    if !db.set_class_status(id, review.status).await? {
        return Err(problems::not_found("Class", id));
    }
    tracing::info!("{} marked class {} as {}", admin.email, id, review.status.as_str());

    db.get_class(id)
        .await?
        .map(Json)
        .ok_or_else(|| problems::not_found("Class", id))
}

///////////////////////
//       TESTS
///////////////////////
