use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;

use crate::data::user::db::validate_email;
use crate::resp::jwt::IdentityToken;
use crate::resp::problem::Problem;
use crate::security::Security;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[schema(format = "email")]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// Issue an identity token
///
/// The token is valid for the configured lifetime and can't be refreshed.
///
/// No credential is checked here: the caller is trusted to have proven the
/// email with the client's identity provider first. Every role check runs
/// against the email in the token, so whoever can reach this route can act
/// as any registered user.
#[utoipa::path(
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Signed bearer token", body = TokenResponse),
        (status = 400, description = "Malformed email", body = Problem),
    )
)]
#[post("/jwt", format = "application/json", data = "<request>")]
#[tracing::instrument(skip(security))]
pub fn token_issue(
    request: Json<TokenRequest>,
    security: &State<Security>,
) -> Result<Json<TokenResponse>, Problem> {
    let request = request.into_inner();
    validate_email(&request.email)?;

    let token = IdentityToken::new(request.email.trim(), request.name, security.token_ttl);
    Ok(Json(TokenResponse {
        token: token.encode_jwt(security)?,
    }))
}
