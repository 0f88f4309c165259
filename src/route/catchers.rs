use rocket::http::Status;
use rocket::{Catcher, Request};

use crate::resp::problem::{problems, GuardProblem, Problem};

/// Problem parked by a failing guard, or a generic one for `status`.
fn problem_for(status: Status, req: &Request<'_>) -> Problem {
    if let Some(problem) = GuardProblem::take(req) {
        if problem.status == status {
            return problem;
        }
    }

    match status.code {
        401 => problems::unauthorized("Missing or invalid bearer token."),
        403 => problems::forbidden("Insufficient privileges."),
        404 => Problem::new_untyped(status, "Resource doesn't exist.")
            .instance_uri(req.uri().to_string())
            .clone(),
        400 | 422 => problems::parse_problem(),
        _ => Problem::new_untyped(status, status.reason_lossy()),
    }
}

#[catch(400)]
fn bad_request(req: &Request<'_>) -> Problem {
    problem_for(Status::BadRequest, req)
}

#[catch(401)]
fn unauthorized(req: &Request<'_>) -> Problem {
    problem_for(Status::Unauthorized, req)
}

#[catch(403)]
fn forbidden(req: &Request<'_>) -> Problem {
    problem_for(Status::Forbidden, req)
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Problem {
    problem_for(Status::NotFound, req)
}

#[catch(409)]
fn conflict(req: &Request<'_>) -> Problem {
    problem_for(Status::Conflict, req)
}

#[catch(422)]
fn unprocessable(req: &Request<'_>) -> Problem {
    problem_for(Status::UnprocessableEntity, req)
}

#[catch(500)]
fn internal(req: &Request<'_>) -> Problem {
    tracing::error!("internal error while handling {}", req.uri());
    problem_for(Status::InternalServerError, req)
}

#[catch(default)]
fn fallback(status: Status, req: &Request<'_>) -> Problem {
    problem_for(status, req)
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        conflict,
        unprocessable,
        internal,
        fallback
    ]
}
