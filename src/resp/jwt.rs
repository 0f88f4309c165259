use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Header};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};

use super::util::date_time_as_unix_seconds;
use crate::resp::problem::{problems, GuardProblem, Problem};
use crate::security::Security;

pub static AUTH_HEADER_NAME: &str = "Authorization";

/// Signed identity assertion handed out by `POST /jwt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityToken {
    #[serde(with = "date_time_as_unix_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "date_time_as_unix_seconds")]
    exp: DateTime<Utc>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IdentityToken {
    pub fn new(email: impl ToString, name: Option<String>, ttl: Duration) -> IdentityToken {
        let now = Utc::now();
        IdentityToken {
            iat: now,
            exp: now + ttl,
            email: email.to_string(),
            name,
        }
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.iat
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.exp
    }

    pub fn encode_jwt(&self, security: &Security) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::new(Security::ALGORITHM),
            &self,
            security.encoding_key(),
        )
    }

    pub fn bearer(&self, security: &Security) -> Result<String, jsonwebtoken::errors::Error> {
        Ok(format!("Bearer {}", self.encode_jwt(security)?))
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    problems::unauthorized(detail)
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, Problem> {
    let value = header.ok_or_else(|| auth_problem("No Authorization header."))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() {
                Err(auth_problem("Empty bearer token."))
            } else {
                Ok(token)
            }
        }
        _ => Err(auth_problem("Authorization header must use the Bearer scheme.")),
    }
}

pub fn extract_claims(
    header: Option<&str>,
    security: &Security,
) -> Result<IdentityToken, Problem> {
    let token = bearer_token(header)?;
    tracing::trace!("extracted bearer token from header");

    let claims = decode::<IdentityToken>(token, security.decoding_key(), &security.validation())
        .map(|data| data.claims)
        .map_err(Problem::from)?;

    tracing::debug!("decoded identity token for: {}", claims.email);
    Ok(claims)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for IdentityToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security = match req.rocket().state::<Security>() {
            Some(it) => it,
            None => {
                tracing::error!("token signing keys aren't managed by rocket");
                let problem =
                    Problem::new_untyped(Status::InternalServerError, "Authentication offline.");
                GuardProblem::stash(req, &problem);
                return Outcome::Error((Status::InternalServerError, problem));
            }
        };

        match extract_claims(req.headers().get_one(AUTH_HEADER_NAME), security) {
            Ok(claims) => Outcome::Success(claims),
            Err(problem) => {
                tracing::debug!("rejected request without a valid identity token");
                GuardProblem::stash(req, &problem);
                Outcome::Error((Status::Unauthorized, problem))
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> Self {
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            )
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(components) = openapi.components.as_mut() {
                components.add_security_scheme("jwt", *self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;

    fn security() -> Security {
        Security::new("test-secret", Duration::hours(2))
    }

    #[test]
    fn jwt_configured_properly() {
        let security = security();
        let mut token = IdentityToken::new("student@example.com", None, security.token_ttl);
        token.iat = token.iat.round_subsecs(0);
        token.exp = token.exp.round_subsecs(0);

        let header = token.bearer(&security).expect("encoding should work");
        let decoded = extract_claims(Some(header.as_str()), &security).expect("valid token");

        assert_eq!(decoded.email, "student@example.com");
        assert_eq!(decoded.iat, token.iat);
        assert_eq!(decoded.exp, token.iat + Duration::hours(2));
    }

    #[test]
    fn missing_or_malformed_header_is_unauthorized() {
        let security = security();

        for header in [None, Some("Basic abc"), Some("Bearer "), Some("token")] {
            let err = extract_claims(header, &security).expect_err("must be rejected");
            assert_eq!(err.status, Status::Unauthorized, "header: {:?}", header);
        }
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let security = security();
        let token = IdentityToken::new("late@example.com", None, Duration::minutes(-5));
        let header = token.bearer(&security).unwrap();

        let err = extract_claims(Some(header.as_str()), &security).expect_err("expired");
        assert_eq!(err.status, Status::Unauthorized);
        assert_eq!(err.detail.as_deref(), Some("Expired JWT signature."));
    }

    #[test]
    fn foreign_signature_is_unauthorized() {
        let other = Security::new("someone-else", Duration::hours(2));
        let header = IdentityToken::new("mallory@example.com", None, other.token_ttl)
            .bearer(&other)
            .unwrap();

        let err = extract_claims(Some(header.as_str()), &security()).expect_err("bad signature");
        assert_eq!(err.status, Status::Unauthorized);
    }
}
