use utoipa::ToSchema;
use uuid::Uuid;

use super::User;
use crate::resp::problem::Problem;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_name(name: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad name.")
            .insert_str("name", name)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn unknown_email(email: impl ToString) -> Problem {
        Problem::new_untyped(Status::NotFound, "User doesn't exist.")
            .insert_str("email", email)
            .to_owned()
    }
}

pub fn validate_email(email: &str) -> Result<(), Problem> {
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty())
        .unwrap_or(false);

    if !valid || email.len() > 254 {
        return Err(problem::bad_email(email, "Not a valid e-mail address."));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSignupData {
    #[schema(format = "email")]
    pub email: String,
    pub name: String,
    #[serde(default, alias = "photo")]
    pub photo_url: Option<String>,
}

impl UserSignupData {
    pub fn validate(&self) -> Result<(), Problem> {
        validate_email(&self.email)?;

        let name = self.name.trim();
        if name.is_empty() {
            return Err(problem::bad_name(&self.name, "Name can't be empty."));
        }
        if name.len() > 128 {
            return Err(problem::bad_name(
                &self.name,
                "Name can't be longer than 128 (bytes) characters.",
            ));
        }

        Ok(())
    }
}

impl From<UserSignupData> for User {
    fn from(data: UserSignupData) -> Self {
        User::new(data.email.trim(), data.name.trim(), data.photo_url)
    }
}

/// Answer of `POST /user`; `inserted_id` is null when the email is taken.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCreatedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub inserted_id: Option<Uuid>,
}

impl UserCreatedResponse {
    pub fn created(user: &User) -> Self {
        UserCreatedResponse {
            message: None,
            inserted_id: Some(user.id),
        }
    }

    pub fn already_exists() -> Self {
        UserCreatedResponse {
            message: Some("user already exists".to_string()),
            inserted_id: None,
        }
    }
}
