use std::marker::PhantomData;
use std::ops::Deref;

use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};

use crate::authz::{self, Principal};
use crate::data::Db;
use crate::resp::jwt::IdentityToken;
use crate::resp::problem::{problems, GuardProblem, Problem};
use crate::role::Role;

pub trait RequiredRole: 'static {
    const ROLE: Role;
}

#[derive(Debug, Clone, Copy)]
pub struct Student;
#[derive(Debug, Clone, Copy)]
pub struct Teacher;
#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl RequiredRole for Student {
    const ROLE: Role = Role::Student;
}
impl RequiredRole for Teacher {
    const ROLE: Role = Role::Teacher;
}
impl RequiredRole for Admin {
    const ROLE: Role = Role::Admin;
}

fn fail<T>(req: &Request<'_>, problem: Problem) -> request::Outcome<T, Problem> {
    GuardProblem::stash(req, &problem);
    Outcome::Error((problem.status, problem))
}

/// Verified token matched to a stored user, whatever its role.
async fn principal_from<T>(req: &Request<'_>) -> Result<Principal, request::Outcome<T, Problem>> {
    let token = match req.guard::<IdentityToken>().await {
        Outcome::Success(it) => it,
        Outcome::Error(e) => return Err(Outcome::Error(e)),
        Outcome::Forward(status) => return Err(Outcome::Forward(status)),
    };

    let store = match req.rocket().state::<Db>() {
        Some(it) => it,
        None => {
            tracing::error!("store isn't managed by rocket");
            let problem = Problem::new_untyped(Status::InternalServerError, "Storage offline.");
            return Err(fail(req, problem));
        }
    };

    match authz::resolve_known(store.as_ref(), &token.email).await {
        Ok(it) => Ok(it),
        Err(problem) => Err(fail(req, problem)),
    }
}

/// Caller holding a verified token who is a registered user.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

impl Deref for Caller {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match principal_from(req).await {
            Ok(principal) => Outcome::Success(Caller(principal)),
            Err(outcome) => outcome,
        }
    }
}

/// Caller holding exactly the role `R`.
#[derive(Debug, Clone)]
pub struct Authorized<R: RequiredRole> {
    pub principal: Principal,
    role: PhantomData<fn() -> R>,
}

impl<R: RequiredRole> Deref for Authorized<R> {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.principal
    }
}

#[rocket::async_trait]
impl<'r, R: RequiredRole> FromRequest<'r> for Authorized<R> {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let principal = match principal_from(req).await {
            Ok(it) => it,
            Err(outcome) => return outcome,
        };

        match principal.require(R::ROLE) {
            Ok(()) => Outcome::Success(Authorized {
                principal,
                role: PhantomData,
            }),
            Err(problem) => fail(req, problem),
        }
    }
}

pub type StudentOnly = Authorized<Student>;
pub type TeacherOnly = Authorized<Teacher>;
pub type AdminOnly = Authorized<Admin>;

/// 403 used when a caller isn't the owner of the addressed resource.
pub fn not_owner(what: &str) -> Problem {
    problems::forbidden(format!("{} belongs to someone else.", what))
}
