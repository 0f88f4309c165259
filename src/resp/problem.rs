use std::io::Cursor;

use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use utoipa::ToSchema;

use crate::data::StoreError;
use crate::payment::GatewayError;

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, type_uri: impl ToString, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: type_uri.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn instance_uri(&mut self, value: String) -> &mut Problem {
        self.instance_uri = Some(value);
        self
    }

    pub fn insert<V: Serialize>(&mut self, key: impl ToString, value: V) -> &mut Problem {
        self.body.insert(
            key.to_string(),
            serde_json::to_value(value).expect("data must be JSON serializable"),
        );
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Renders the RFC7807 document: body entries plus the standard members.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut body = self.body.clone();

        body.insert("type".to_string(), Value::from(self.type_uri.clone()));
        body.insert("title".to_string(), Value::from(self.title.clone()));
        body.insert("status".to_string(), Value::from(self.status.code));
        if let Some(detail) = &self.detail {
            body.insert("detail".to_string(), Value::from(detail.clone()));
        }
        if let Some(instance) = &self.instance_uri {
            body.insert("instance".to_string(), Value::from(instance.clone()));
        }

        body
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body_string =
            serde_json::to_string(&self.to_json()).map_err(|_| Status::InternalServerError)?;

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header("Content-Language", "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

/// Problem raised by a failing request guard.
///
/// Rocket discards guard errors and forwards to the catcher for the status,
/// so guards park their problem here and the catchers pick it up.
#[derive(Debug, Clone, Default)]
pub struct GuardProblem(pub Option<Problem>);

impl GuardProblem {
    pub fn stash(req: &rocket::Request<'_>, problem: &Problem) {
        req.local_cache(|| GuardProblem(Some(problem.clone())));
    }

    pub fn take(req: &rocket::Request<'_>) -> Option<Problem> {
        req.local_cache(GuardProblem::default).0.clone()
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn parse_problem() -> Problem {
        Problem::new_untyped(
            Status::BadRequest,
            "There was a problem parsing part of the request.",
        )
    }

    #[inline]
    pub fn unauthorized(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Unauthorized access.")
            .detail(detail)
            .clone()
    }

    #[inline]
    pub fn forbidden(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::Forbidden, "Forbidden access.")
            .detail(detail)
            .clone()
    }

    #[inline]
    pub fn not_found(what: &str, id: impl ToString) -> Problem {
        Problem::new_untyped(Status::NotFound, format!("{} doesn't exist.", what))
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn conflict(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, title)
    }

    #[inline]
    pub fn bad_request(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, title)
    }
}

impl From<mongodb::error::Error> for Problem {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        tracing::error!("MongoDB error: {}", e);

        let problem = |title: &str| Problem::new_untyped(Status::InternalServerError, title);

        match e.kind.as_ref() {
            ErrorKind::Authentication { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::InvalidTlsConfig { .. }
            | ErrorKind::IncompatibleServer { .. } => {
                problem("Server was unable to access MongoDB.")
            }
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                problem("There was a problem with handling MongoDB bson.")
            }
            ErrorKind::InvalidArgument { .. } | ErrorKind::Command(_) => {
                problem("MongoDB was unable to process bad server request.")
            }
            ErrorKind::Write(_) | ErrorKind::BulkWrite(_) => {
                problem("MongoDB failed while processing request.")
                    .detail("A write error occurred. Submitted data might not be properly stored.")
                    .clone()
            }
            ErrorKind::Transaction { .. } => problem("MongoDB transaction failed.")
                .detail("No changes were stored.")
                .clone(),
            _ => problem("MongoDB failed while processing request."),
        }
    }
}

impl From<StoreError> for Problem {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => Problem::from(e),
            StoreError::Duplicate(what) => {
                problems::conflict(format!("{} already exists.", what))
            }
            StoreError::MissingClass(id) => problems::not_found("Class", id),
            StoreError::BsonDe(_) | StoreError::BsonSer(_) => Problem::new_untyped(
                Status::InternalServerError,
                "An error occurred while processing BSON data.",
            ),
        }
    }
}

impl From<GatewayError> for Problem {
    fn from(e: GatewayError) -> Self {
        tracing::warn!("Payment gateway error: {}", e);
        Problem::new_untyped(Status::BadGateway, "Payment gateway failed.")
            .detail(e)
            .clone()
    }
}

impl From<serde_json::Error> for Problem {
    fn from(_: serde_json::Error) -> Self {
        Problem::new_untyped(
            Status::InternalServerError,
            "An error occurred while processing JSON data.",
        )
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => problems::unauthorized("Expired JWT signature."),
            _ => problems::unauthorized("Error while handling JWT."),
        }
    }
}
