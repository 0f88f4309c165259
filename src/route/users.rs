use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::user::db::problem as user_problem;
use crate::data::user::db::{UserCreatedResponse, UserSignupData};
use crate::data::user::{User, UserWithRole};
use crate::data::{Db, StoreError};
use crate::middleware::paging::PageState;
use crate::middleware::role::{AdminOnly, Caller};
use crate::resp::jwt::IdentityToken;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub email: String,
    pub role: Option<Role>,
}

/// Get user by email
#[utoipa::path(
    params(
        ("email", description = "user email")
    ),
    responses(
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 200, description = "Stored user", body = User),
        (status = 404, description = "No user with that email", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user/<email>")]
#[tracing::instrument(skip(db))]
pub async fn user_get(
    email: &str,
    _auth: IdentityToken,
    db: &State<Db>,
) -> Result<Json<User>, Problem> {
    db.find_user_by_email(email)
        .await?
        .map(Json)
        .ok_or_else(|| user_problem::unknown_email(email))
}

/// Register a user
///
/// Registering an email twice stores nothing and answers with a message
/// instead of an id.
#[utoipa::path(
    request_body = UserSignupData,
    responses(
        (status = 200, description = "Creation result", body = UserCreatedResponse),
        (status = 400, description = "Invalid signup data", body = Problem),
    )
)]
#[post("/user", format = "application/json", data = "<signup>")]
#[tracing::instrument(skip(db, config))]
pub async fn user_create(
    signup: Json<UserSignupData>,
    db: &State<Db>,
    config: &State<Config>,
) -> Result<Json<UserCreatedResponse>, Problem> {
    signup.validate()?;

    if db.find_user_by_email(signup.email.trim()).await?.is_some() {
        return Ok(Json(UserCreatedResponse::already_exists()));
    }

    let user = User::from(signup.into_inner());
    match db.insert_user(&user).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => {
            return Ok(Json(UserCreatedResponse::already_exists()));
        }
        Err(other) => return Err(other.into()),
    }

    if config.is_admin_email(&user.email) {
        db.set_role(user.id, Role::Admin).await?;
        tracing::info!("Granted bootstrap admin role to {}", user.email);
    }

    Ok(Json(UserCreatedResponse::created(&user)))
}

/// Get role of a user
#[utoipa::path(
    params(
        ("email", description = "user email")
    ),
    responses(
        (status = 200, description = "Role of the user, null when none was granted", body = RoleResponse),
        (status = 401, description = "Missing/expired token", body = Problem),
        (status = 403, description = "Neither the owner nor an admin", body = Problem),
        (status = 404, description = "No user with that email", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user/role/<email>")]
#[tracing::instrument(skip(db))]
pub async fn user_role(
    email: &str,
    caller: Caller,
    db: &State<Db>,
) -> Result<Json<RoleResponse>, Problem> {
    caller.require_self_or_admin(email)?;

    let joined = db
        .user_with_role(email)
        .await?
        .ok_or_else(|| user_problem::unknown_email(email))?;

    Ok(Json(RoleResponse {
        email: joined.user.email,
        role: joined.role,
    }))
}

/// List users with their roles
#[utoipa::path(
    params(
        ("page" = Option<u32>, Query, description = "zero based page"),
        ("len" = Option<u32>, Query, description = "page length"),
    ),
    responses(
        (status = 200, description = "Page of users", body = Vec<UserWithRole>),
        (status = 403, description = "Not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users")]
#[tracing::instrument(skip(db))]
pub async fn user_list(
    _admin: AdminOnly,
    page: PageState,
    db: &State<Db>,
) -> Result<Json<Vec<UserWithRole>>, Problem> {
    Ok(Json(db.list_users(page).await?))
}

/// Make a user an admin
#[utoipa::path(
    params(
        ("id", description = "user ID")
    ),
    responses(
        (status = 200, description = "New role of the user", body = RoleResponse),
        (status = 403, description = "Not an admin", body = Problem),
        (status = 404, description = "No such user", body = Problem),
    ),
    security(("jwt" = []))
)]
#[patch("/makeAdmin/<id>")]
#[tracing::instrument(skip(db))]
pub async fn make_admin(
    id: Uuid,
    admin: AdminOnly,
    db: &State<Db>,
) -> Result<Json<RoleResponse>, Problem> {
    let user = db
        .get_user(id)
        .await?
        .ok_or_else(|| problems::not_found("User", id))?;

    db.set_role(user.id, Role::Admin).await?;
    tracing::info!("{} made {} an admin", admin.email, user.email);

    Ok(Json(RoleResponse {
        email: user.email,
        role: Some(Role::Admin),
    }))
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod user_endpoints {
    use rocket::http::Status;
    use serde_json::json;

    use super::RoleResponse;
    use crate::data::user::db::UserCreatedResponse;
    use crate::data::user::UserWithRole;
    use crate::data::Store;
    use crate::role::Role;
    use crate::test_util::{bearer, TestApp, ROOT_EMAIL};

    #[rocket::async_test]
    async fn user_create_is_idempotent_per_email() {
        let app = TestApp::new().await;
        let body = json!({ "email": "s@example.com", "name": "Student" });

        let first: UserCreatedResponse = app
            .client
            .post("/user")
            .json(&body)
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(first.inserted_id.is_some());
        assert!(first.message.is_none());

        let second: UserCreatedResponse = app
            .client
            .post("/user")
            .json(&body)
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(second.message.as_deref(), Some("user already exists"));
        assert!(second.inserted_id.is_none());
        assert_eq!(app.store.user_count().await, 1);
    }

    #[rocket::async_test]
    async fn bootstrap_admin_gets_admin_role() {
        let app = TestApp::new().await;

        app.client
            .post("/user")
            .json(&json!({ "email": ROOT_EMAIL, "name": "Root" }))
            .dispatch()
            .await;

        let joined = app.store.user_with_role(ROOT_EMAIL).await.unwrap().unwrap();
        assert_eq!(joined.role, Some(Role::Admin));
    }

    #[rocket::async_test]
    async fn protected_routes_need_a_token() {
        let app = TestApp::new().await;
        app.user("s@example.com", Some(Role::Student)).await;

        for uri in ["/user/s@example.com", "/user/role/s@example.com", "/users"] {
            let response = app.client.get(uri).dispatch().await;
            assert_eq!(response.status(), Status::Unauthorized, "{}", uri);
        }
    }

    #[rocket::async_test]
    async fn unknown_user_is_not_found() {
        let app = TestApp::new().await;

        let response = app
            .client
            .get("/user/ghost@example.com")
            .header(bearer("ghost@example.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn role_lookup_is_self_or_admin() {
        let app = TestApp::new().await;
        app.user("s@example.com", None).await;
        app.user("other@example.com", Some(Role::Student)).await;
        app.user("a@example.com", Some(Role::Admin)).await;

        let own: RoleResponse = app
            .client
            .get("/user/role/s@example.com")
            .header(bearer("s@example.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(own.role, None);

        let response = app
            .client
            .get("/user/role/s@example.com")
            .header(bearer("other@example.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app
            .client
            .get("/user/role/other@example.com")
            .header(bearer("a@example.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn user_list_is_admin_only() {
        let app = TestApp::new().await;
        app.user("s@example.com", Some(Role::Student)).await;
        app.user("roleless@example.com", None).await;
        app.user("a@example.com", Some(Role::Admin)).await;

        for email in ["s@example.com", "roleless@example.com"] {
            let response = app.client.get("/users").header(bearer(email)).dispatch().await;
            assert_eq!(response.status(), Status::Forbidden, "{}", email);
        }

        let users: Vec<UserWithRole> = app
            .client
            .get("/users?len=2")
            .header(bearer("a@example.com"))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
    }

    #[rocket::async_test]
    async fn make_admin_replaces_role() {
        let app = TestApp::new().await;
        let student = app.user("s@example.com", Some(Role::Student)).await;
        app.user("a@example.com", Some(Role::Admin)).await;

        let response = app
            .client
            .patch(format!("/makeAdmin/{}", student.id))
            .header(bearer("s@example.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app
            .client
            .patch(format!("/makeAdmin/{}", student.id))
            .header(bearer("a@example.com"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let joined = app.store.user_with_role("s@example.com").await.unwrap().unwrap();
        assert_eq!(joined.role, Some(Role::Admin));
        assert_eq!(app.store.role_record_count(student.id).await, 1);
    }
}
